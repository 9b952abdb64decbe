//! Cat resource controller: reads with the owner expanded, multipart create,
//! owner- and admin-scoped mutations, and the bounding-box area search.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    AdminUpdateCatRequest, Cat, CatResponse, CatWithOwner, CreateCatFields, UpdateCatRequest,
};
use crate::geo::{BoundingBox, Coord};
use crate::AppState;

use super::auth::{authorize, Action, Principal};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_address, validate_birthdate, validate_cat_name, validate_uuid, validate_weight,
};
use super::Envelope;

/// Base query for the owner-expanded read view.
const CAT_WITH_OWNER: &str = r#"
    SELECT c.id, c.name, c.weight, c.birthdate, c.filename,
           c.location_type, c.lat, c.lng, c.created_at, c.updated_at,
           u.id AS owner_id, u.user_name AS owner_user_name, u.email AS owner_email
    FROM cats c
    JOIN users u ON u.id = c.owner_id
"#;

async fn fetch_expanded(state: &AppState, id: &str) -> Result<CatResponse, ApiError> {
    let row = sqlx::query_as::<_, CatWithOwner>(&format!("{} WHERE c.id = ?", CAT_WITH_OWNER))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("No cat found"))?;

    Ok(row.to_response())
}

async fn fetch_cat(state: &AppState, id: &str) -> Result<Cat, ApiError> {
    sqlx::query_as::<_, Cat>("SELECT * FROM cats WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("No cat found"))
}

fn validate_cat_id(id: &str) -> Result<(), ApiError> {
    validate_uuid(id, "cat_id").map_err(|e| ApiError::validation_field("cat_id", e))
}

fn validate_update_request(req: &UpdateCatRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref name) = req.name {
        if let Err(e) = validate_cat_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(weight) = req.weight {
        if let Err(e) = validate_weight(weight) {
            errors.add("weight", e);
        }
    }
    if let Some(ref birthdate) = req.birthdate {
        if let Err(e) = validate_birthdate(birthdate) {
            errors.add("birthdate", e);
        }
    }
    if let Some(ref address) = req.address {
        if let Err(e) = validate_address(address) {
            errors.add("address", e);
        }
    }

    errors.finish()
}

/// List all cats with their owners expanded.
pub async fn list_cats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CatResponse>>, ApiError> {
    let rows =
        sqlx::query_as::<_, CatWithOwner>(&format!("{} ORDER BY c.created_at DESC", CAT_WITH_OWNER))
            .fetch_all(&state.db)
            .await?;

    Ok(Json(rows.into_iter().map(CatWithOwner::to_response).collect()))
}

/// Get a single cat by id.
pub async fn get_cat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CatResponse>, ApiError> {
    validate_cat_id(&id)?;
    Ok(Json(fetch_expanded(&state, &id).await?))
}

/// List the authenticated principal's own cats.
pub async fn my_cats(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<CatResponse>>, ApiError> {
    let rows = sqlx::query_as::<_, CatWithOwner>(&format!(
        "{} WHERE c.owner_id = ? ORDER BY c.created_at DESC",
        CAT_WITH_OWNER
    ))
    .bind(&principal.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows.into_iter().map(CatWithOwner::to_response).collect()))
}

#[derive(Debug, Deserialize)]
pub struct InAreaQuery {
    pub corner1: String,
    pub corner2: String,
}

/// List cats inside the rectangle spanned by two `"lat,lng"` corners. The
/// box is normalized per axis, so either diagonal order works.
pub async fn cats_in_area(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InAreaQuery>,
) -> Result<Json<Vec<CatResponse>>, ApiError> {
    let corner1: Coord = query
        .corner1
        .parse()
        .map_err(|e: crate::geo::GeoError| ApiError::validation_field("corner1", e.to_string()))?;
    let corner2: Coord = query
        .corner2
        .parse()
        .map_err(|e: crate::geo::GeoError| ApiError::validation_field("corner2", e.to_string()))?;

    let bbox = BoundingBox::from_corners(corner1, corner2);

    let rows = sqlx::query_as::<_, CatWithOwner>(&format!(
        "{} WHERE c.lat BETWEEN ? AND ? AND c.lng BETWEEN ? AND ? ORDER BY c.created_at DESC",
        CAT_WITH_OWNER
    ))
    .bind(bbox.min_lat)
    .bind(bbox.max_lat)
    .bind(bbox.min_lng)
    .bind(bbox.max_lng)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows.into_iter().map(CatWithOwner::to_response).collect()))
}

/// Register a cat from a multipart form: text fields `name`, `weight`,
/// `birthdate`, `address` plus the `photo` image part. The owner is always
/// the authenticated principal.
pub async fn create_cat(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<CatResponse>>), ApiError> {
    let mut fields = CreateCatFields::default();
    let mut photo: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_field("body", e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "name" => fields.name = Some(read_text(field).await?),
            "weight" => fields.weight = Some(read_text(field).await?),
            "birthdate" => fields.birthdate = Some(read_text(field).await?),
            "address" => fields.address = Some(read_text(field).await?),
            "photo" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation_field("photo", e.to_string()))?;
                photo = Some((content_type, data));
            }
            // Unknown parts are ignored.
            _ => {}
        }
    }

    let (name, weight, birthdate, address) = validate_create_fields(&fields, photo.is_some())?;

    // Collaborators: resolve the address, then store the photo.
    let location = state.geocoder.resolve(&address).await?;
    let (content_type, data) = photo.expect("photo presence was validated");
    let filename = state.uploads.store(&content_type, &data).await?;

    let id = insert_cat_record(&state, &principal, &name, weight, birthdate, &filename, location)
        .await?;

    tracing::info!(cat_id = %id, owner_id = %principal.id, "Registered cat");

    let cat = fetch_expanded(&state, &id).await?;
    Ok((StatusCode::CREATED, Json(Envelope::new("cat created", cat))))
}

/// Persist a new cat row. The owner is always taken from the principal;
/// nothing client-supplied reaches that column.
async fn insert_cat_record(
    state: &AppState,
    principal: &Principal,
    name: &str,
    weight: f64,
    birthdate: chrono::NaiveDate,
    filename: &str,
    location: Coord,
) -> Result<String, ApiError> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO cats (id, name, weight, birthdate, filename, location_type, lat, lng,
                          owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 'Point', ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(name)
    .bind(weight)
    .bind(birthdate.to_string())
    .bind(filename)
    .bind(location.lat)
    .bind(location.lng)
    .bind(&principal.id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    Ok(id)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    let name = field.name().unwrap_or_default().to_string();
    field
        .text()
        .await
        .map_err(|e| ApiError::validation_field(&name, e.to_string()))
}

fn validate_create_fields(
    fields: &CreateCatFields,
    has_photo: bool,
) -> Result<(String, f64, chrono::NaiveDate, String), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let name = fields.name.clone().unwrap_or_default();
    if let Err(e) = validate_cat_name(&name) {
        errors.add("name", e);
    }

    let weight = match fields.weight.as_deref() {
        Some(raw) => match raw.parse::<f64>() {
            Ok(w) => {
                if let Err(e) = validate_weight(w) {
                    errors.add("weight", e);
                }
                w
            }
            Err(_) => {
                errors.add("weight", "weight must be a number");
                0.0
            }
        },
        None => {
            errors.add("weight", "weight is required");
            0.0
        }
    };

    let birthdate = match fields.birthdate.as_deref() {
        Some(raw) => match validate_birthdate(raw) {
            Ok(date) => Some(date),
            Err(e) => {
                errors.add("birthdate", e);
                None
            }
        },
        None => {
            errors.add("birthdate", "birthdate is required");
            None
        }
    };

    let address = fields.address.clone().unwrap_or_default();
    if let Err(e) = validate_address(&address) {
        errors.add("address", e);
    }

    if !has_photo {
        errors.add("photo", "photo is required");
    }

    errors.finish()?;

    Ok((
        name,
        weight,
        birthdate.expect("validated above"),
        address,
    ))
}

/// Owner-scoped update. The principal must own the record; the owner field
/// itself is not reachable from here.
pub async fn update_cat(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<UpdateCatRequest>,
) -> Result<Json<Envelope<CatResponse>>, ApiError> {
    validate_cat_id(&id)?;
    validate_update_request(&req)?;

    let cat = fetch_cat(&state, &id).await?;
    authorize(&principal, Action::UpdateOwn, &cat.owner_id)?;

    apply_update(&state, &id, &req, None).await?;

    let cat = fetch_expanded(&state, &id).await?;
    Ok(Json(Envelope::new("cat updated", cat)))
}

/// Admin-scoped update: any record, with optional owner reassignment.
pub async fn admin_update_cat(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<AdminUpdateCatRequest>,
) -> Result<Json<Envelope<CatResponse>>, ApiError> {
    validate_cat_id(&id)?;
    validate_update_request(&req.fields)?;
    if let Some(ref owner_id) = req.owner_id {
        if let Err(e) = validate_uuid(owner_id, "owner_id") {
            return Err(ApiError::validation_field("owner_id", e));
        }
    }

    let cat = fetch_cat(&state, &id).await?;
    authorize(&principal, Action::UpdateAny, &cat.owner_id)?;

    apply_update(&state, &id, &req.fields, req.owner_id.as_deref()).await?;

    let cat = fetch_expanded(&state, &id).await?;
    Ok(Json(Envelope::new("cat updated", cat)))
}

async fn apply_update(
    state: &AppState,
    id: &str,
    req: &UpdateCatRequest,
    new_owner_id: Option<&str>,
) -> Result<(), ApiError> {
    // A supplied address replaces the location through the geocoder.
    let location = match req.address.as_deref() {
        Some(address) => Some(state.geocoder.resolve(address).await?),
        None => None,
    };

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        UPDATE cats SET
            name = COALESCE(?, name),
            weight = COALESCE(?, weight),
            birthdate = COALESCE(?, birthdate),
            lat = COALESCE(?, lat),
            lng = COALESCE(?, lng),
            owner_id = COALESCE(?, owner_id),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.name)
    .bind(req.weight)
    .bind(&req.birthdate)
    .bind(location.map(|c| c.lat))
    .bind(location.map(|c| c.lng))
    .bind(new_owner_id)
    .bind(&now)
    .bind(id)
    .execute(&state.db)
    .await
    .map_err(|e| {
        if e.to_string().contains("FOREIGN KEY constraint failed") {
            ApiError::validation_field("owner_id", "no such user")
        } else {
            ApiError::from(e)
        }
    })?;

    Ok(())
}

/// Owner-scoped delete.
pub async fn delete_cat(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Envelope<CatResponse>>, ApiError> {
    validate_cat_id(&id)?;

    let cat = fetch_cat(&state, &id).await?;
    authorize(&principal, Action::DeleteOwn, &cat.owner_id)?;

    let deleted = fetch_expanded(&state, &id).await?;
    sqlx::query("DELETE FROM cats WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    tracing::info!(cat_id = %id, "Deleted cat");
    Ok(Json(Envelope::new("cat deleted", deleted)))
}

/// Admin-scoped delete: any record, admin role required.
pub async fn admin_delete_cat(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Envelope<CatResponse>>, ApiError> {
    validate_cat_id(&id)?;

    let cat = fetch_cat(&state, &id).await?;
    authorize(&principal, Action::DeleteAny, &cat.owner_id)?;

    let deleted = fetch_expanded(&state, &id).await?;
    sqlx::query("DELETE FROM cats WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    tracing::info!(cat_id = %id, admin_id = %principal.id, "Deleted cat (admin)");
    Ok(Json(Envelope::new("cat deleted", deleted)))
}
