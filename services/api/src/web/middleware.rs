//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::web::state::AppState;

/// Middleware that validates the opaque bearer credential and resolves the
/// acting party.
///
/// If valid, inserts the `Actor` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the Authorization header
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Strip the Bearer prefix
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 3. Validate the credential, resolve the actor (user id + role)
    let actor = state.auth.validate(token).await.map_err(|e| {
        error!("Failed to validate credential: {:?}", e);
        StatusCode::UNAUTHORIZED
    })?;

    // 4. Insert the actor into request extensions
    req.extensions_mut().insert(actor);

    // 5. Continue to the handler
    Ok(next.run(req).await)
}
