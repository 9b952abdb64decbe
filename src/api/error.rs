//! Unified API error handling.
//!
//! Every controller failure is converted into an [`ApiError`] before it
//! reaches the boundary; the wire shape is always `{message, stack?}` with
//! `stack` (the internal error chain) only emitted outside production.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Whether error responses include the internal error chain. Set once at
/// startup from the configured environment; defaults to hidden.
static EXPOSE_STACK: OnceCell<bool> = OnceCell::new();

pub fn set_expose_stack(expose: bool) {
    let _ = EXPOSE_STACK.set(expose);
}

fn expose_stack() -> bool {
    EXPOSE_STACK.get().copied().unwrap_or(false)
}

/// Error kinds the API can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Aggregated field validation errors (400)
    ValidationFailed,
    /// Missing or invalid credentials (401)
    Unauthorized,
    /// Authenticated but not allowed (403)
    Forbidden,
    /// Resource absent (404)
    NotFound,
    /// Unique constraint violation (409)
    Conflict,
    /// Upstream collaborator failure (502)
    BadGateway,
    /// Catch-all (500)
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The wire shape of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    /// Internal error chain, never shown in production.
    stack: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
        }
    }

    /// Attach the internal error chain for non-production diagnostics.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status_code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadGateway, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Single-field validation failure.
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrorBuilder::new();
        errors.add(field, message);
        errors.build().expect("one error was just added")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            message: self.message,
            stack: if expose_stack() { self.stack } else { None },
        };

        (self.kind.status_code(), Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.status_code(), self.message)
    }
}

impl std::error::Error for ApiError {}

// -------------------------------------------------------------------------
// Conversions from collaborator error types
// -------------------------------------------------------------------------

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);

        let api_err = match &err {
            sqlx::Error::RowNotFound => ApiError::not_found("Resource not found"),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("UNIQUE constraint failed") {
                    ApiError::conflict("A resource with this identifier already exists")
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    ApiError::new(ErrorKind::ValidationFailed, "Referenced resource does not exist")
                } else {
                    ApiError::internal("A database error occurred")
                }
            }
            _ => ApiError::internal("A database error occurred"),
        };

        api_err.with_stack(err.to_string())
    }
}

impl From<crate::geocode::GeocodeError> for ApiError {
    fn from(err: crate::geocode::GeocodeError) -> Self {
        use crate::geocode::GeocodeError;
        match err {
            GeocodeError::NoMatch(_) => ApiError::validation_field("address", err.to_string()),
            GeocodeError::Transport(_) => {
                tracing::error!("Geocoding error: {}", err);
                ApiError::bad_gateway("Failed to resolve address").with_stack(err.to_string())
            }
        }
    }
}

impl From<crate::storage::UploadError> for ApiError {
    fn from(err: crate::storage::UploadError) -> Self {
        use crate::storage::UploadError;
        match &err {
            UploadError::Io(io) => {
                tracing::error!("Upload storage error: {}", io);
                ApiError::internal("Failed to store uploaded file").with_stack(io.to_string())
            }
            _ => ApiError::validation_field("photo", err.to_string()),
        }
    }
}

// -------------------------------------------------------------------------
// Ordered builder for aggregated validation errors
// -------------------------------------------------------------------------

/// Collects `(field, message)` pairs in insertion order. The built message
/// concatenates each `"<msg>: <field>"` pair joined by `", "`, so callers
/// get a deterministic report.
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: Vec<(String, String)>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors.push((field.into(), message.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn build(self) -> Option<ApiError> {
        if self.errors.is_empty() {
            return None;
        }

        let message = self
            .errors
            .iter()
            .map(|(field, msg)| format!("{}: {}", msg, field))
            .collect::<Vec<_>>()
            .join(", ");

        Some(ApiError::new(ErrorKind::ValidationFailed, message))
    }

    /// Return Ok(()) if no errors were collected.
    pub fn finish(self) -> Result<(), ApiError> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_status_codes() {
        assert_eq!(
            ErrorKind::ValidationFailed.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ErrorKind::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorKind::BadGateway.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ErrorKind::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn builder_keeps_insertion_order_in_message() {
        let mut builder = ValidationErrorBuilder::new();
        builder.add("name", "name is required");
        builder.add("email", "invalid email format");

        let err = builder.build().unwrap();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert_eq!(
            err.message(),
            "name is required: name, invalid email format: email"
        );
    }

    #[test]
    fn empty_builder_finishes_ok() {
        assert!(ValidationErrorBuilder::new().finish().is_ok());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn stack_is_hidden_by_default() {
        // EXPOSE_STACK is unset in tests, so the hidden default applies.
        let err = ApiError::internal("boom").with_stack("secret detail");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
