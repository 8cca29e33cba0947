//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, and the mapping
//! from the core's error taxonomy to HTTP statuses and the uniform response
//! envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;
use crate::web::protocol::ConflictingSessionDto;
use studysphere_core::DomainError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the booking core.
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, detail) = match &self {
            ApiError::Domain(domain) => match domain {
                DomainError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
                DomainError::NotFound(_) => (StatusCode::NOT_FOUND, domain.to_string(), None),
                DomainError::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
                DomainError::State { .. } => (StatusCode::BAD_REQUEST, domain.to_string(), None),
                DomainError::Conflict { conflicts } => {
                    let listed: Vec<ConflictingSessionDto> =
                        conflicts.iter().map(ConflictingSessionDto::from).collect();
                    (
                        StatusCode::CONFLICT,
                        domain.to_string(),
                        Some(json!({ "conflictingSessions": listed })),
                    )
                }
                DomainError::Payment(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
                // The gateway, not the caller, is at fault.
                DomainError::Gateway(msg) => (StatusCode::BAD_GATEWAY, msg.clone(), None),
                // Infrastructure failures are logged with detail but surfaced
                // generically so internals do not leak to clients.
                DomainError::Storage(msg) => {
                    error!("storage error: {msg}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "An internal error occurred".to_string(),
                        None,
                    )
                }
            },
            ApiError::Database(e) => {
                error!("database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            other => {
                error!("internal error: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = json!({
            "success": false,
            "message": message,
            "error": detail,
        });
        (status, Json(body)).into_response()
    }
}
