pub mod auth;
mod cats;
pub mod error;
mod users;
mod validation;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

/// Uniform wrapper returned by every mutating operation.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub message: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes. Login is public; check-token observes an optional
    // principal and builds its own failure.
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/check-token", get(users::check_token));

    // User routes. Registration is public; the self-service mutations
    // authenticate through the Principal extractor.
    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/", post(users::create_user))
        .route("/me", put(users::update_current))
        .route("/me", delete(users::delete_current))
        .route("/:id", get(users::get_user));

    // Cat routes. Reads are public; mutations authenticate through the
    // Principal extractor and authorize per operation.
    let cat_routes = Router::new()
        .route("/", get(cats::list_cats))
        .route("/", post(cats::create_cat))
        .route("/mine", get(cats::my_cats))
        .route("/in-area", get(cats::cats_in_area))
        .route("/:id", get(cats::get_cat))
        .route("/:id", put(cats::update_cat))
        .route("/:id", delete(cats::delete_cat));

    // Admin-scoped cat mutations: any record, admin role required.
    let admin_routes = Router::new()
        .route("/cats/:id", put(cats::admin_update_cat))
        .route("/cats/:id", delete(cats::admin_delete_cat));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/cats", cat_routes)
        .nest("/api/admin", admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
