//! Cat models and the owner-expanded read projection.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UserResponse;

/// Geographic point as stored on a cat row and serialized in responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub point_type: String,
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            point_type: "Point".to_string(),
            lat,
            lng,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Cat {
    pub id: String,
    pub name: String,
    pub weight: f64,
    pub birthdate: String,
    pub filename: String,
    pub location_type: String,
    pub lat: f64,
    pub lng: f64,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Flat row produced by the cats ⋈ users join. Read queries always go
/// through this shape so the owner reference comes back expanded.
#[derive(Debug, Clone, FromRow)]
pub struct CatWithOwner {
    pub id: String,
    pub name: String,
    pub weight: f64,
    pub birthdate: String,
    pub filename: String,
    pub location_type: String,
    pub lat: f64,
    pub lng: f64,
    pub created_at: String,
    pub updated_at: String,
    pub owner_id: String,
    pub owner_user_name: String,
    pub owner_email: String,
}

impl CatWithOwner {
    /// Build the composed read view: location folded into a point object,
    /// owner columns folded into the reduced user projection.
    pub fn to_response(self) -> CatResponse {
        CatResponse {
            id: self.id,
            name: self.name,
            weight: self.weight,
            birthdate: self.birthdate,
            filename: self.filename,
            location: GeoPoint {
                point_type: self.location_type,
                lat: self.lat,
                lng: self.lng,
            },
            owner: UserResponse {
                id: self.owner_id,
                user_name: self.owner_user_name,
                email: self.owner_email,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatResponse {
    pub id: String,
    pub name: String,
    pub weight: f64,
    pub birthdate: String,
    pub filename: String,
    pub location: GeoPoint,
    pub owner: UserResponse,
    pub created_at: String,
    pub updated_at: String,
}

/// Text fields of the multipart create request, collected before validation.
#[derive(Debug, Default)]
pub struct CreateCatFields {
    pub name: Option<String>,
    pub weight: Option<String>,
    pub birthdate: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCatRequest {
    pub name: Option<String>,
    pub weight: Option<f64>,
    pub birthdate: Option<String>,
    /// Re-geocoded into a new location when present.
    pub address: Option<String>,
}

/// Admin update: everything the owner can change plus owner reassignment.
#[derive(Debug, Default, Deserialize)]
pub struct AdminUpdateCatRequest {
    #[serde(flatten)]
    pub fields: UpdateCatRequest,
    pub owner_id: Option<String>,
}
