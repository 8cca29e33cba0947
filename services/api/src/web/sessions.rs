//! services/api/src/web/sessions.rs
//!
//! Axum handlers for the session lifecycle endpoints.

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
use crate::web::protocol::{ApiResponse, ConflictingSessionDto, SessionDto};
use crate::web::state::AppState;
use studysphere_core::{
    Actor, BookSessionInput, SessionKind, TimeRange,
};

//=========================================================================================
// Request payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
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
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CancelSessionBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CompleteSessionBody {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RejectCompletionBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleSessionBody {
    pub new_start_time: DateTime<Utc>,
    pub new_end_time: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviewSessionBody {
    pub rating: u8,
    #[serde(default)]
    pub review: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckAvailabilityBody {
    pub tutor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityDto {
    pub available: bool,
    pub conflicting_sessions: Vec<ConflictingSessionDto>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcomeDto {
    pub session: SessionDto,
    pub payment_refunded: bool,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcomeDto {
    pub session: SessionDto,
    pub payment_captured: bool,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Book a session directly with a tutor.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionBody,
    responses(
        (status = 201, description = "Session booked", body = ApiResponse<SessionDto>),
        (status = 400, description = "Validation failure"),
        (status = 404, description = "Tutor or student profile missing"),
        (status = 409, description = "Time slot conflicts with an active session")
    ),
    tag = "sessions"
)]
pub async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CreateSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let range = TimeRange::new(body.start_time, body.end_time)?;
    let mode = SessionKind::parse(&body.mode)?;
    let session = state
        .orchestrator
        .book_session(
            actor,
            BookSessionInput {
                tutor_id: body.tutor_id,
                subject: body.subject,
                title: body.title,
                description: body.description,
                range,
                mode,
                location: body.location,
                notes: body.notes,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Session booked", SessionDto::from(&session))),
    ))
}

/// List the caller's sessions (students see their bookings, tutors theirs).
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Sessions for the caller", body = ApiResponse<Vec<SessionDto>>)
    ),
    tag = "sessions"
)]
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.orchestrator.list_sessions(actor).await?;
    let dtos: Vec<SessionDto> = sessions.iter().map(SessionDto::from).collect();
    Ok(Json(ApiResponse::ok("Sessions", dtos)))
}

/// Tutor-side session listing.
#[utoipa::path(
    get,
    path = "/sessions/tutor",
    responses(
        (status = 200, description = "Sessions taught by the caller", body = ApiResponse<Vec<SessionDto>>),
        (status = 403, description = "Caller is not a tutor")
    ),
    tag = "sessions"
)]
pub async fn list_tutor_sessions_handler(
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
    let sessions = state.orchestrator.list_sessions(actor).await?;
    let dtos: Vec<SessionDto> = sessions.iter().map(SessionDto::from).collect();
    Ok(Json(ApiResponse::ok("Sessions", dtos)))
}

/// Fetch one session; only its parties may read it.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "The session", body = ApiResponse<SessionDto>),
        (status = 403, description = "Caller is not a party"),
        (status = 404, description = "Unknown session")
    ),
    tag = "sessions"
)]
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.orchestrator.get_session(actor, id).await?;
    Ok(Json(ApiResponse::ok("Session", SessionDto::from(&session))))
}

/// Cancel a session. The refund of an authorized payment is best-effort;
/// `paymentRefunded` reports what actually happened.
#[utoipa::path(
    patch,
    path = "/sessions/{id}/cancel",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body = CancelSessionBody,
    responses(
        (status = 200, description = "Session cancelled", body = ApiResponse<CancelOutcomeDto>),
        (status = 400, description = "Session already terminal")
    ),
    tag = "sessions"
)]
pub async fn cancel_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .orchestrator
        .cancel_session(actor, id, body.reason)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Session cancelled",
        CancelOutcomeDto {
            session: SessionDto::from(&outcome.session),
            payment_refunded: outcome.payment_refunded,
        },
    )))
}

/// Tutor marks the session as held; the student must approve.
#[utoipa::path(
    patch,
    path = "/sessions/{id}/complete",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body = CompleteSessionBody,
    responses(
        (status = 200, description = "Completion requested", body = ApiResponse<SessionDto>),
        (status = 400, description = "Session is not active"),
        (status = 403, description = "Caller is not the session's tutor")
    ),
    tag = "sessions"
)]
pub async fn request_completion_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<CompleteSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .orchestrator
        .request_completion(actor, id, body.notes)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Completion requested",
        SessionDto::from(&session),
    )))
}

/// Student approves the completion; an authorized payment is captured.
#[utoipa::path(
    patch,
    path = "/sessions/{id}/complete/approve",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session completed", body = ApiResponse<CompletionOutcomeDto>),
        (status = 400, description = "No completion pending")
    ),
    tag = "sessions"
)]
pub async fn approve_completion_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.orchestrator.approve_completion(actor, id).await?;
    Ok(Json(ApiResponse::ok(
        "Session completed",
        CompletionOutcomeDto {
            session: SessionDto::from(&outcome.session),
            payment_captured: outcome.payment_captured,
        },
    )))
}

/// Student rejects the completion; the session returns to scheduled.
#[utoipa::path(
    patch,
    path = "/sessions/{id}/complete/reject",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body = RejectCompletionBody,
    responses(
        (status = 200, description = "Completion rejected", body = ApiResponse<SessionDto>),
        (status = 400, description = "No completion pending")
    ),
    tag = "sessions"
)]
pub async fn reject_completion_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectCompletionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .orchestrator
        .reject_completion(actor, id, body.reason)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Completion rejected",
        SessionDto::from(&session),
    )))
}

/// Move a scheduled session to a new slot.
#[utoipa::path(
    patch,
    path = "/sessions/{id}/reschedule",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body = RescheduleSessionBody,
    responses(
        (status = 200, description = "Session rescheduled", body = ApiResponse<SessionDto>),
        (status = 400, description = "Session is not scheduled"),
        (status = 409, description = "New slot conflicts with an active session")
    ),
    tag = "sessions"
)]
pub async fn reschedule_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<RescheduleSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let new_range = TimeRange::new(body.new_start_time, body.new_end_time)?;
    let session = state
        .orchestrator
        .reschedule_session(actor, id, new_range, body.reason)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Session rescheduled",
        SessionDto::from(&session),
    )))
}

/// Student rates a completed session, once.
#[utoipa::path(
    patch,
    path = "/sessions/{id}/review",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body = ReviewSessionBody,
    responses(
        (status = 200, description = "Review stored", body = ApiResponse<SessionDto>),
        (status = 400, description = "Session not completed or already reviewed")
    ),
    tag = "sessions"
)]
pub async fn review_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .orchestrator
        .submit_review(actor, id, body.rating, body.review)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Review stored",
        SessionDto::from(&session),
    )))
}

/// Check whether a tutor is free for a candidate slot.
#[utoipa::path(
    post,
    path = "/sessions/check-availability",
    request_body = CheckAvailabilityBody,
    responses(
        (status = 200, description = "Availability report", body = ApiResponse<AvailabilityDto>)
    ),
    tag = "sessions"
)]
pub async fn check_availability_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckAvailabilityBody>,
) -> Result<impl IntoResponse, ApiError> {
    let range = TimeRange::new(body.start_time, body.end_time)?;
    let report = state
        .orchestrator
        .check_availability(body.tutor_id, range)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Availability",
        AvailabilityDto {
            available: report.available,
            conflicting_sessions: report
                .conflicts
                .iter()
                .map(ConflictingSessionDto::from)
                .collect(),
        },
    )))
}
