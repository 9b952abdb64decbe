//! Shared test fixtures: in-memory pools with the real migrations applied,
//! seeded users, and a geocoder that resolves every address to a fixed point.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

use crate::api::auth::{hash_password, Principal};
use crate::config::Config;
use crate::db::{DbPool, User, UserRole};
use crate::geo::Coord;
use crate::geocode::{GeocodeError, Geocoder};
use crate::AppState;

/// App state over a fresh in-memory pool, a fixed geocoder, and a
/// throwaway uploads directory.
pub async fn test_state() -> Arc<AppState> {
    let pool = test_pool().await;
    let mut config = Config::default();
    config.storage.uploads_dir =
        std::env::temp_dir().join(format!("whiskr-test-{}", uuid::Uuid::new_v4()));

    let geocoder = Arc::new(FixedGeocoder(Coord::new(10.0, 20.0).expect("coord")));
    Arc::new(AppState::new(config, pool, geocoder))
}

/// Fresh in-memory SQLite pool with migrations and pragmas applied.
pub async fn test_pool() -> DbPool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    crate::db::configure(&pool).await.expect("pragmas");
    crate::db::run_migrations(&pool).await.expect("migrations");
    pool
}

/// Password every seeded user authenticates with.
pub const TEST_PASSWORD: &str = "secret123";

pub async fn create_user(pool: &DbPool, user_name: &str, email: &str, role: UserRole) -> User {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let password_hash = hash_password(TEST_PASSWORD).expect("hash");

    sqlx::query(
        r#"
        INSERT INTO users (id, user_name, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_name)
    .bind(email)
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert user");

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await
        .expect("fetch user")
}

pub fn principal(id: &str, role: UserRole) -> Principal {
    Principal {
        id: id.to_string(),
        user_name: format!("user-{}", id),
        email: format!("{}@test.local", id),
        role,
    }
}

pub fn principal_for(user: &User) -> Principal {
    Principal {
        id: user.id.clone(),
        user_name: user.user_name.clone(),
        email: user.email.clone(),
        role: user.role_enum(),
    }
}

pub async fn insert_cat(pool: &DbPool, owner_id: &str, name: &str, lat: f64, lng: f64) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO cats (id, name, weight, birthdate, filename, location_type, lat, lng,
                          owner_id, created_at, updated_at)
        VALUES (?, ?, 4.0, '2020-01-01', 'photo.jpg', 'Point', ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(name)
    .bind(lat)
    .bind(lng)
    .bind(owner_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert cat");

    id
}

/// Geocoder that resolves every address to the same coordinate.
pub struct FixedGeocoder(pub Coord);

#[async_trait]
impl Geocoder for FixedGeocoder {
    async fn resolve(&self, _address: &str) -> Result<Coord, GeocodeError> {
        Ok(self.0)
    }
}

mod tests {
    use super::*;

    #[test]
    fn fixed_geocoder_resolves_everything_to_its_point() {
        let point = Coord::new(1.0, 2.0).unwrap();
        let geocoder = FixedGeocoder(point);
        let resolved = tokio_test::block_on(geocoder.resolve("anywhere at all")).unwrap();
        assert_eq!(resolved, point);
    }
}
