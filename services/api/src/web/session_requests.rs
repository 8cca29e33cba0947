//! services/api/src/web/session_requests.rs
//!
//! Axum handlers for the session-request (proposal) endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::protocol::{ApiResponse, SessionDto, SessionRequestDto};
use crate::web::state::AppState;
use studysphere_core::{Actor, RequestSessionInput, SessionKind, TimeRange};

//=========================================================================================
// Request payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestBody {
    pub tutor_id: Uuid,
    pub subject: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub mode: String,
    #[serde(default)]
    pub location: Option<String>,
    pub proposed_price: f64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AcceptRequestBody {
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DeclineRequestBody {
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedRequestDto {
    pub request: SessionRequestDto,
    pub session: SessionDto,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Student proposes a session to a tutor.
#[utoipa::path(
    post,
    path = "/session-requests",
    request_body = CreateRequestBody,
    responses(
        (status = 201, description = "Request created", body = ApiResponse<SessionRequestDto>),
        (status = 400, description = "Validation failure or duplicate intent"),
        (status = 404, description = "Unknown tutor")
    ),
    tag = "session-requests"
)]
pub async fn create_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CreateRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let range = TimeRange::new(body.start_time, body.end_time)?;
    let mode = SessionKind::parse(&body.mode)?;
    let request = state
        .orchestrator
        .create_request(
            actor,
            RequestSessionInput {
                tutor_id: body.tutor_id,
                subject: body.subject,
                title: body.title,
                description: body.description,
                requested_range: range,
                mode,
                location: body.location,
                proposed_price: body.proposed_price,
                message: body.message,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Request created",
            SessionRequestDto::from(&request),
        )),
    ))
}

/// List the caller's requests (students see what they sent, tutors what they
/// received).
#[utoipa::path(
    get,
    path = "/session-requests",
    responses(
        (status = 200, description = "Requests for the caller", body = ApiResponse<Vec<SessionRequestDto>>)
    ),
    tag = "session-requests"
)]
pub async fn list_requests_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state.orchestrator.list_requests(actor).await?;
    let dtos: Vec<SessionRequestDto> = requests.iter().map(SessionRequestDto::from).collect();
    Ok(Json(ApiResponse::ok("Requests", dtos)))
}

/// Tutor-side request listing.
#[utoipa::path(
    get,
    path = "/session-requests/tutor",
    responses(
        (status = 200, description = "Requests addressed to the caller", body = ApiResponse<Vec<SessionRequestDto>>),
        (status = 403, description = "Caller is not a tutor")
    ),
    tag = "session-requests"
)]
pub async fn list_tutor_requests_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    match actor {
        Actor::Tutor(_) => {}
        _ => {
            return Err(studysphere_core::DomainError::Authorization(
                "only tutors can use the tutor listing".to_string(),
            )
            .into())
        }
    }
    let requests = state.orchestrator.list_requests(actor).await?;
    let dtos: Vec<SessionRequestDto> = requests.iter().map(SessionRequestDto::from).collect();
    Ok(Json(ApiResponse::ok("Requests", dtos)))
}

/// Tutor accepts a pending request, producing a booked session.
#[utoipa::path(
    patch,
    path = "/session-requests/{id}/accept",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = AcceptRequestBody,
    responses(
        (status = 200, description = "Request accepted, session created", body = ApiResponse<AcceptedRequestDto>),
        (status = 400, description = "Request not open (responded or expired)"),
        (status = 403, description = "Caller is not the addressed tutor"),
        (status = 409, description = "Requested slot is no longer free")
    ),
    tag = "session-requests"
)]
pub async fn accept_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<AcceptRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (request, session) = state
        .orchestrator
        .accept_request(actor, id, body.response)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Request accepted",
        AcceptedRequestDto {
            request: SessionRequestDto::from(&request),
            session: SessionDto::from(&session),
        },
    )))
}

/// Tutor declines a pending request with a reason.
#[utoipa::path(
    patch,
    path = "/session-requests/{id}/decline",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = DeclineRequestBody,
    responses(
        (status = 200, description = "Request declined", body = ApiResponse<SessionRequestDto>),
        (status = 400, description = "Request not open, or missing reason")
    ),
    tag = "session-requests"
)]
pub async fn decline_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<DeclineRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .orchestrator
        .decline_request(actor, id, &body.reason)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Request declined",
        SessionRequestDto::from(&request),
    )))
}

/// Student withdraws their own pending request.
#[utoipa::path(
    patch,
    path = "/session-requests/{id}/cancel",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request cancelled", body = ApiResponse<SessionRequestDto>),
        (status = 400, description = "Request not pending")
    ),
    tag = "session-requests"
)]
pub async fn cancel_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.orchestrator.cancel_request(actor, id).await?;
    Ok(Json(ApiResponse::ok(
        "Request cancelled",
        SessionRequestDto::from(&request),
    )))
}
