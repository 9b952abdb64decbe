//! User resource controller: registration, self-service update/delete, and
//! the reduced read projections.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    CreateUserRequest, RegisteredUser, UpdateUserRequest, UserResponse,
};
use crate::AppState;

use super::auth::{self, MaybePrincipal, Principal};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_password, validate_user_name, validate_uuid};
use super::Envelope;

fn validate_create_request(req: &CreateUserRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_user_name(&req.user_name) {
        errors.add("user_name", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }

    errors.finish()
}

fn validate_update_request(req: &UpdateUserRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref user_name) = req.user_name {
        if let Err(e) = validate_user_name(user_name) {
            errors.add("user_name", e);
        }
    }
    if let Some(ref email) = req.email {
        if let Err(e) = validate_email(email) {
            errors.add("email", e);
        }
    }
    if let Some(ref password) = req.password {
        if let Err(e) = validate_password(password) {
            errors.add("password", e);
        }
    }

    errors.finish()
}

/// Echo the attached principal without touching the database. The reduced
/// projection doubles as a token check for clients.
pub async fn check_token(
    MaybePrincipal(principal): MaybePrincipal,
) -> Result<Json<UserResponse>, ApiError> {
    let principal = principal.ok_or_else(|| ApiError::forbidden("token not valid"))?;

    Ok(Json(UserResponse {
        id: principal.id,
        user_name: principal.user_name,
        email: principal.email,
    }))
}

/// List all users. The projection never carries password hashes or roles.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = sqlx::query_as::<_, UserResponse>(
        "SELECT id, user_name, email FROM users ORDER BY created_at DESC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(users))
}

/// Get a single user by id.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Err(e) = validate_uuid(&id, "user_id") {
        return Err(ApiError::validation_field("user_id", e));
    }

    let user = sqlx::query_as::<_, UserResponse>(
        "SELECT id, user_name, email FROM users WHERE id = ?",
    )
    .bind(&id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("No user found"))?;

    Ok(Json(user))
}

/// Register a new user. The role is always `user`, whatever the client
/// sends; the stored password is a salted argon2 hash.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Envelope<RegisteredUser>>), ApiError> {
    validate_create_request(&req)?;

    let id = Uuid::new_v4().to_string();
    let password_hash = auth::hash_password(&req.password)
        .map_err(|e| ApiError::internal("Failed to hash password").with_stack(e.to_string()))?;
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO users (id, user_name, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'user', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.user_name)
    .bind(&req.email)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            ApiError::conflict("A user with this name or email already exists")
        } else {
            ApiError::from(e)
        }
    })?;

    tracing::info!(user_name = %req.user_name, "Registered user");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::new(
            "user created",
            RegisteredUser {
                user_name: req.user_name,
                email: req.email,
            },
        )),
    ))
}

/// Update the authenticated principal's own record. The role is not
/// reachable from here; a supplied password is re-hashed.
pub async fn update_current(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<Envelope<UserResponse>>, ApiError> {
    validate_update_request(&req)?;

    let password_hash = match &req.password {
        Some(password) => Some(auth::hash_password(password).map_err(|e| {
            ApiError::internal("Failed to hash password").with_stack(e.to_string())
        })?),
        None => None,
    };

    let now = chrono::Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE users SET
            user_name = COALESCE(?, user_name),
            email = COALESCE(?, email),
            password_hash = COALESCE(?, password_hash),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.user_name)
    .bind(&req.email)
    .bind(&password_hash)
    .bind(&now)
    .bind(&principal.id)
    .execute(&state.db)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            ApiError::conflict("A user with this name or email already exists")
        } else {
            ApiError::from(e)
        }
    })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("No user found"));
    }

    let user = sqlx::query_as::<_, UserResponse>(
        "SELECT id, user_name, email FROM users WHERE id = ?",
    )
    .bind(&principal.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(Envelope::new("user updated", user)))
}

/// Delete the authenticated principal's own record. The cats FK cascade
/// removes that user's cat records with it.
pub async fn delete_current(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Envelope<UserResponse>>, ApiError> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&principal.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("No user found"));
    }

    tracing::info!(user_id = %principal.id, "Deleted user");

    Ok(Json(Envelope::new(
        "user deleted",
        UserResponse {
            id: principal.id,
            user_name: principal.user_name,
            email: principal.email,
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UserRole;
    use crate::testing;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn registration_returns_reduced_projection() {
        let state = testing::test_state().await;

        let (status, Json(envelope)) = create_user(
            State(state.clone()),
            Json(CreateUserRequest {
                user_name: "alice".to_string(),
                email: "a@x.com".to_string(),
                password: "secret".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(envelope.data.user_name, "alice");
        assert_eq!(envelope.data.email, "a@x.com");

        // Neither the password nor the role leaks into the serialized body.
        let body = serde_json::to_string(&envelope).unwrap();
        assert!(!body.contains("password"));
        assert!(!body.contains("role"));
    }

    #[tokio::test]
    async fn registration_forces_user_role_and_hashes_password() {
        let state = testing::test_state().await;

        create_user(
            State(state.clone()),
            Json(CreateUserRequest {
                user_name: "bob".to_string(),
                email: "b@x.com".to_string(),
                password: "plaintext".to_string(),
            }),
        )
        .await
        .unwrap();

        let (role, password_hash): (String, String) =
            sqlx::query_as("SELECT role, password_hash FROM users WHERE user_name = 'bob'")
                .fetch_one(&state.db)
                .await
                .unwrap();

        assert_eq!(role, "user");
        assert_ne!(password_hash, "plaintext");
        assert!(crate::api::auth::verify_password("plaintext", &password_hash));
    }

    #[tokio::test]
    async fn registration_rejects_invalid_input_with_ordered_message() {
        let state = testing::test_state().await;

        let err = create_user(
            State(state),
            Json(CreateUserRequest {
                user_name: String::new(),
                email: "nope".to_string(),
                password: "secret".to_string(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.message(),
            "user name is required: user_name, invalid email format: email"
        );
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let state = testing::test_state().await;
        testing::create_user(&state.db, "carol", "c@x.com", UserRole::User).await;

        let err = create_user(
            State(state),
            Json(CreateUserRequest {
                user_name: "carol2".to_string(),
                email: "c@x.com".to_string(),
                password: "secret".to_string(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn check_token_without_principal_is_forbidden() {
        let err = check_token(MaybePrincipal(None)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "token not valid");
    }

    #[tokio::test]
    async fn check_token_echoes_principal_without_db_access() {
        let principal = testing::principal("some-id", UserRole::User);
        let Json(response) = check_token(MaybePrincipal(Some(principal))).await.unwrap();
        assert_eq!(response.id, "some-id");
    }

    #[tokio::test]
    async fn get_user_excludes_role_and_missing_id_is_404() {
        let state = testing::test_state().await;
        let user = testing::create_user(&state.db, "dave", "d@x.com", UserRole::Admin).await;

        let Json(found) = get_user(State(state.clone()), Path(user.id.clone()))
            .await
            .unwrap();
        let body = serde_json::to_string(&found).unwrap();
        assert!(!body.contains("role"));
        assert!(!body.contains("password"));

        let missing = uuid::Uuid::new_v4().to_string();
        let err = get_user(State(state), Path(missing)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "No user found");
    }

    #[tokio::test]
    async fn update_current_touches_only_own_record() {
        let state = testing::test_state().await;
        let user = testing::create_user(&state.db, "erin", "e@x.com", UserRole::User).await;
        let other = testing::create_user(&state.db, "frank", "f@x.com", UserRole::User).await;

        let Json(envelope) = update_current(
            State(state.clone()),
            testing::principal_for(&user),
            Json(UpdateUserRequest {
                user_name: Some("erin2".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(envelope.data.user_name, "erin2");

        let (untouched,): (String,) =
            sqlx::query_as("SELECT user_name FROM users WHERE id = ?")
                .bind(&other.id)
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(untouched, "frank");
    }

    #[tokio::test]
    async fn delete_current_cascades_to_owned_cats() {
        let state = testing::test_state().await;
        let user = testing::create_user(&state.db, "gina", "g@x.com", UserRole::User).await;
        testing::insert_cat(&state.db, &user.id, "Mittens", 1.0, 2.0).await;

        let Json(envelope) = delete_current(State(state.clone()), testing::principal_for(&user))
            .await
            .unwrap();
        assert_eq!(envelope.data.id, user.id);

        let cats: Vec<(String,)> = sqlx::query_as("SELECT id FROM cats WHERE owner_id = ?")
            .bind(&user.id)
            .fetch_all(&state.db)
            .await
            .unwrap();
        assert!(cats.is_empty());
    }
}
