//! services/api/src/web/protocol.rs
//!
//! The uniform response envelope and the JSON projections (DTOs) of the core
//! domain records. Wire field names are camelCase to match the SPA client.

use chrono::{DateTime, Utc};
use serde::Serialize;
use studysphere_core::{
    Payment, Session, SessionRequest, SessionSummary,
};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Envelope
//=========================================================================================

/// Every endpoint answers `{success, message, data?}`; errors use the same
/// shape with `error` populated (see `ApiError`).
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

//=========================================================================================
// Session DTOs
//=========================================================================================

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub id: Uuid,
    pub title: String,
    pub tutor_id: Uuid,
    pub student_id: Uuid,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_request: Option<CompletionRequestDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reschedule_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequestDto {
    pub requested_at: DateTime<Utc>,
    pub requested_by: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl From<&Session> for SessionDto {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            title: s.title.clone(),
            tutor_id: s.tutor_id,
            student_id: s.student_id,
            subject: s.subject.clone(),
            description: s.description.clone(),
            start_time: s.range.start,
            end_time: s.range.end,
            status: s.status.as_str().to_string(),
            mode: s.mode.as_str().to_string(),
            location: s.location.clone(),
            price: s.price,
            payment_status: s.payment_status.map(|p| p.as_str().to_string()),
            rating: s.rating,
            review: s.review.clone(),
            notes: s.notes.clone(),
            cancel_reason: s.cancel_reason.clone(),
            cancelled_at: s.cancelled_at,
            completed_at: s.completed_at,
            completion_request: s.completion_request.as_ref().map(|c| CompletionRequestDto {
                requested_at: c.requested_at,
                requested_by: c.requested_by,
                notes: c.notes.clone(),
                responded_at: c.responded_at,
                approved: c.approved,
                rejection_reason: c.rejection_reason.clone(),
            }),
            reschedule_reason: s.reschedule_reason.clone(),
            created_at: s.created_at,
        }
    }
}

/// Compact projection listed inside 409 conflict responses.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConflictingSessionDto {
    pub id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
}

impl From<&SessionSummary> for ConflictingSessionDto {
    fn from(s: &SessionSummary) -> Self {
        Self {
            id: s.id,
            title: s.title.clone(),
            start_time: s.range.start,
            end_time: s.range.end,
            status: s.status.as_str().to_string(),
        }
    }
}

//=========================================================================================
// SessionRequest DTO
//=========================================================================================

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestDto {
    pub id: Uuid,
    pub student_id: Uuid,
    pub tutor_id: Uuid,
    pub subject: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub requested_start: DateTime<Utc>,
    pub requested_end: DateTime<Utc>,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub proposed_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tutor_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&SessionRequest> for SessionRequestDto {
    fn from(r: &SessionRequest) -> Self {
        Self {
            id: r.id,
            student_id: r.student_id,
            tutor_id: r.tutor_id,
            subject: r.subject.clone(),
            title: r.title.clone(),
            description: r.description.clone(),
            requested_start: r.requested_range.start,
            requested_end: r.requested_range.end,
            mode: r.mode.as_str().to_string(),
            location: r.location.clone(),
            proposed_price: r.proposed_price,
            message: r.message.clone(),
            status: r.status.as_str().to_string(),
            tutor_response: r.tutor_response.clone(),
            decline_reason: r.decline_reason.clone(),
            responded_at: r.responded_at,
            expires_at: r.expires_at,
            session_id: r.session_id,
            created_at: r.created_at,
        }
    }
}

//=========================================================================================
// Payment DTO
//=========================================================================================

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDto {
    pub id: Uuid,
    pub session_id: Uuid,
    pub payer_id: Uuid,
    pub payee_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub platform_fee: f64,
    pub tutor_amount: f64,
    pub status: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentDto {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id,
            session_id: p.session_id,
            payer_id: p.payer_id,
            payee_id: p.payee_id,
            amount: p.amount,
            currency: p.currency.clone(),
            platform_fee: p.platform_fee,
            tutor_amount: p.tutor_amount,
            status: p.status.as_str().to_string(),
            mode: p.mode.as_str().to_string(),
            order_id: p.gateway_order_id.clone(),
            authorized_at: p.authorized_at,
            captured_at: p.captured_at,
            refund_amount: p.refund.as_ref().map(|r| r.amount),
            error_message: p.error.as_ref().map(|e| e.message.clone()),
            created_at: p.created_at,
        }
    }
}
