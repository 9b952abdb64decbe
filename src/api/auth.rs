//! Authentication and authorization.
//!
//! Login issues an opaque bearer token whose SHA-256 digest is stored in a
//! session row; the [`Principal`] extractor resolves the token before any
//! controller body runs. Authorization for mutating operations goes through
//! one explicit capability check, [`authorize`] — a denial is always an
//! explicit 403, never a silent no-op.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
    Json,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::db::{DbPool, LoginRequest, LoginResponse, User, UserResponse, UserRole};
use crate::AppState;

use super::error::ApiError;

/// Hash a password using Argon2 with a freshly generated salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random bearer token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// The authenticated identity attached to a request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    pub user_name: String,
    pub email: String,
    pub role: UserRole,
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        let role = user.role_enum();
        Self {
            id: user.id,
            user_name: user.user_name,
            email: user.email,
            role,
        }
    }
}

/// Actions a principal can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Mutate a record the principal owns
    UpdateOwn,
    DeleteOwn,
    /// Mutate any record, regardless of ownership
    UpdateAny,
    DeleteAny,
}

/// Capability check called before every mutating cat operation.
///
/// Owner-scoped actions require an exact principal/owner id match; an admin
/// who does not own the record is denied here and must use the admin
/// operations. Admin-scoped actions require the admin role.
pub fn authorize(principal: &Principal, action: Action, owner_id: &str) -> Result<(), ApiError> {
    match action {
        Action::UpdateOwn | Action::DeleteOwn => {
            if principal.id == owner_id {
                Ok(())
            } else {
                Err(ApiError::forbidden("you do not own this record"))
            }
        }
        Action::UpdateAny | Action::DeleteAny => {
            if principal.role.is_admin() {
                Ok(())
            } else {
                Err(ApiError::forbidden("admin role required"))
            }
        }
    }
}

/// Login endpoint: verifies credentials and issues a session token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token =
        create_session(&state.db, &user.id, state.config.auth.session_ttl_hours).await?;

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// Insert a session row for the user and return the plaintext token. Only
/// the token's digest hits the database.
pub async fn create_session(pool: &DbPool, user_id: &str, ttl_hours: i64) -> Result<String, ApiError> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let now = chrono::Utc::now();
    let expires_at = (now + chrono::Duration::hours(ttl_hours)).to_rfc3339();

    let session_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&session_id)
    .bind(user_id)
    .bind(&token_hash)
    .bind(&expires_at)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(token)
}

/// Extract the bearer token from request headers
fn extract_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let auth_header = headers.get("Authorization")?.to_str().ok()?;
    auth_header
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}

/// Resolve a token to its principal through an unexpired session.
pub async fn resolve_principal(pool: &DbPool, token: &str) -> Result<Principal, ApiError> {
    let token_hash = hash_token(token);

    let user: Option<User> = sqlx::query_as(
        r#"
        SELECT u.* FROM users u
        JOIN sessions s ON s.user_id = u.id
        WHERE s.token_hash = ? AND s.expires_at > ?
        "#,
    )
    .bind(&token_hash)
    .bind(chrono::Utc::now().to_rfc3339())
    .fetch_optional(pool)
    .await?;

    user.map(Principal::from)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        resolve_principal(&state.db, &token).await
    }
}

/// Extractor that observes an optional principal instead of rejecting the
/// request; check-token builds its own 403 from the absence.
#[derive(Debug, Clone)]
pub struct MaybePrincipal(pub Option<Principal>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybePrincipal {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let principal = match extract_token(&parts.headers) {
            Some(token) => resolve_principal(&state.db, &token).await.ok(),
            None => None,
        };
        Ok(MaybePrincipal(principal))
    }
}

/// Ensure the configured admin account exists. This bootstrap is the only
/// path to the admin role; registration always produces plain users.
pub async fn ensure_admin_user(
    pool: &DbPool,
    admin_email: &str,
    admin_password: &Option<String>,
) -> anyhow::Result<()> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM users WHERE role = 'admin' LIMIT 1")
            .fetch_optional(pool)
            .await?;

    if existing.is_some() {
        return Ok(());
    }

    let password = match admin_password {
        Some(p) => p.clone(),
        None => {
            let mut rng = rand::rng();
            let bytes: [u8; 16] = rng.random();
            let generated = hex::encode(bytes);
            tracing::info!("Generated admin password: {}", generated);
            generated
        }
    };

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash =
        hash_password(&password).map_err(|e| anyhow::anyhow!("failed to hash password: {}", e))?;
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO users (id, user_name, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'admin', ?, ?)
        "#,
    )
    .bind(&id)
    .bind("admin")
    .bind(admin_email)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!("Created admin user: {}", admin_email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn identical_passwords_hash_differently() {
        let a = hash_password("secret").unwrap();
        let b = hash_password("secret").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, "secret");
        assert!(verify_password("secret", &a));
        assert!(verify_password("secret", &b));
        assert!(!verify_password("wrong", &a));
    }

    #[test]
    fn owner_actions_require_exact_owner_match() {
        let owner = testing::principal("owner-id", UserRole::User);
        let stranger = testing::principal("other-id", UserRole::User);
        let admin = testing::principal("admin-id", UserRole::Admin);

        assert!(authorize(&owner, Action::UpdateOwn, "owner-id").is_ok());
        assert!(authorize(&owner, Action::DeleteOwn, "owner-id").is_ok());
        assert!(authorize(&stranger, Action::UpdateOwn, "owner-id").is_err());
        assert!(authorize(&stranger, Action::DeleteOwn, "owner-id").is_err());
        // Admins do not get a pass on the owner-scoped operations.
        assert!(authorize(&admin, Action::UpdateOwn, "owner-id").is_err());
    }

    #[test]
    fn admin_actions_require_admin_role() {
        let user = testing::principal("user-id", UserRole::User);
        let admin = testing::principal("admin-id", UserRole::Admin);

        assert!(authorize(&admin, Action::UpdateAny, "anyone").is_ok());
        assert!(authorize(&admin, Action::DeleteAny, "anyone").is_ok());
        assert!(authorize(&user, Action::UpdateAny, "user-id").is_err());
        assert!(authorize(&user, Action::DeleteAny, "user-id").is_err());
    }

    #[tokio::test]
    async fn login_issues_token_for_valid_credentials_only() {
        let state = testing::test_state().await;
        testing::create_user(&state.db, "alice", "a@x.com", UserRole::User).await;

        let Json(response) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "a@x.com".to_string(),
                password: testing::TEST_PASSWORD.to_string(),
            }),
        )
        .await
        .unwrap();

        assert!(!response.token.is_empty());
        let principal = resolve_principal(&state.db, &response.token).await.unwrap();
        assert_eq!(principal.user_name, "alice");

        let err = login(
            State(state),
            Json(LoginRequest {
                email: "a@x.com".to_string(),
                password: "wrong".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn session_round_trip_resolves_principal() {
        let pool = testing::test_pool().await;
        let user = testing::create_user(&pool, "alice", "a@x.com", UserRole::User).await;

        let token = create_session(&pool, &user.id, 1).await.unwrap();
        let principal = resolve_principal(&pool, &token).await.unwrap();
        assert_eq!(principal.id, user.id);
        assert_eq!(principal.user_name, "alice");
        assert_eq!(principal.role, UserRole::User);
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let pool = testing::test_pool().await;
        let user = testing::create_user(&pool, "bob", "b@x.com", UserRole::User).await;

        let token = create_session(&pool, &user.id, -1).await.unwrap();
        let err = resolve_principal(&pool, &token).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let pool = testing::test_pool().await;
        assert!(resolve_principal(&pool, "deadbeef").await.is_err());
    }

    #[tokio::test]
    async fn admin_bootstrap_runs_once() {
        let pool = testing::test_pool().await;

        ensure_admin_user(&pool, "ops@example.com", &Some("hunter2hunter2".to_string()))
            .await
            .unwrap();
        ensure_admin_user(&pool, "ops@example.com", &Some("hunter2hunter2".to_string()))
            .await
            .unwrap();

        let admins: Vec<(String,)> = sqlx::query_as("SELECT id FROM users WHERE role = 'admin'")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(admins.len(), 1);
    }
}
