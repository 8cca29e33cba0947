//! services/api/src/web/payments.rs
//!
//! Axum handlers for the payment endpoints and the gateway webhook.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::protocol::{ApiResponse, PaymentDto};
use crate::web::state::AppState;
use studysphere_core::{Actor, DomainError, PaymentMode, WebhookEvent, WebhookPayload};

type HmacSha256 = Hmac<Sha256>;

const WEBHOOK_SIGNATURE_HEADER: &str = "x-webhook-signature";

//=========================================================================================
// Request payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderBody {
    pub session_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentBody {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefundBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBody {
    pub event: String,
    pub order_id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub refund_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Open a gateway order for a booked session. Only the paying student may
/// call this; the fee split is fixed when the order is opened.
#[utoipa::path(
    post,
    path = "/payments/create-order",
    request_body = CreateOrderBody,
    responses(
        (status = 201, description = "Order opened", body = ApiResponse<PaymentDto>),
        (status = 400, description = "A payment already exists"),
        (status = 403, description = "Caller is not the paying student"),
        (status = 404, description = "Unknown session"),
        (status = 502, description = "The gateway declined or timed out")
    ),
    tag = "payments"
)]
pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CreateOrderBody>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state
        .orchestrator
        .open_payment_order(actor, body.session_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Order opened", PaymentDto::from(&payment))),
    ))
}

/// Verify the gateway callback signature and authorize the payment.
#[utoipa::path(
    post,
    path = "/payments/verify",
    request_body = VerifyPaymentBody,
    responses(
        (status = 200, description = "Payment authorized", body = ApiResponse<PaymentDto>),
        (status = 400, description = "Signature mismatch; the entry is marked failed"),
        (status = 404, description = "No payment for that order")
    ),
    tag = "payments"
)]
pub async fn verify_payment_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyPaymentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state
        .orchestrator
        .verify_payment(&body.order_id, &body.payment_id, &body.signature)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Payment authorized",
        PaymentDto::from(&payment),
    )))
}

/// Explicitly settle an authorized payment (retry path after a failed
/// capture-on-approval).
#[utoipa::path(
    post,
    path = "/payments/capture/{session_id}",
    params(("session_id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Payment captured", body = ApiResponse<PaymentDto>),
        (status = 400, description = "Payment is not authorized"),
        (status = 404, description = "No payment for that session"),
        (status = 502, description = "The gateway declined or timed out")
    ),
    tag = "payments"
)]
pub async fn capture_payment_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state.orchestrator.capture_payment(actor, session_id).await?;
    Ok(Json(ApiResponse::ok(
        "Payment captured",
        PaymentDto::from(&payment),
    )))
}

/// Explicitly reverse an authorized or captured payment.
#[utoipa::path(
    post,
    path = "/payments/refund/{session_id}",
    params(("session_id" = Uuid, Path, description = "Session ID")),
    request_body = RefundBody,
    responses(
        (status = 200, description = "Payment refunded", body = ApiResponse<PaymentDto>),
        (status = 400, description = "Payment is not refundable"),
        (status = 404, description = "No payment for that session"),
        (status = 502, description = "The gateway declined or timed out")
    ),
    tag = "payments"
)]
pub async fn refund_payment_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<RefundBody>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state
        .orchestrator
        .refund_payment(actor, session_id, body.reason)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Payment refunded",
        PaymentDto::from(&payment),
    )))
}

/// Fetch the payment entry for a session.
#[utoipa::path(
    get,
    path = "/payments/session/{session_id}",
    params(("session_id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "The payment", body = ApiResponse<PaymentDto>),
        (status = 404, description = "No payment for that session")
    ),
    tag = "payments"
)]
pub async fn get_session_payment_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.get_session(actor, session_id).await?;
    let payment = state
        .payments
        .find_for_session(session_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("payment for session {session_id}")))?;
    Ok(Json(ApiResponse::ok("Payment", PaymentDto::from(&payment))))
}

/// Gateway webhook. Unauthenticated but signature-checked: the signature
/// header carries an HMAC-SHA256 of the raw body under the shared webhook
/// secret. Unknown events and guard-failing events are acknowledged so the
/// gateway does not retry forever.
#[utoipa::path(
    post,
    path = "/payments/webhook",
    request_body = WebhookBody,
    responses(
        (status = 200, description = "Event processed or ignored"),
        (status = 400, description = "Bad signature or malformed body")
    ),
    tag = "payments"
)]
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    verify_webhook_signature(&state, &headers, &body)?;

    let parsed: WebhookBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Domain(DomainError::Validation(format!("malformed webhook body: {e}"))))?;

    let Some(event) = WebhookEvent::parse(&parsed.event) else {
        warn!(event = %parsed.event, "unrecognized webhook event, ignoring");
        return Ok(Json(ApiResponse::ok("Ignored", ())));
    };

    state
        .orchestrator
        .apply_payment_webhook(
            event,
            WebhookPayload {
                order_id: parsed.order_id,
                gateway_payment_id: parsed.payment_id,
                refund_id: parsed.refund_id,
                error_message: parsed.error_message,
                error_code: parsed.error_code,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok("Processed", ())))
}

/// Constant-shape HMAC check over the raw body. Skipped in development mode,
/// where no secret is configured and the dev gateway auto-succeeds anyway.
fn verify_webhook_signature(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), ApiError> {
    if state.config.payment_mode == PaymentMode::Development {
        return Ok(());
    }
    let secret = state
        .config
        .gateway_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::Internal("webhook secret is not configured".to_string()))?;

    let provided = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::Domain(DomainError::Validation(
                "missing webhook signature header".to_string(),
            ))
        })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
        return Err(ApiError::Domain(DomainError::Validation(
            "invalid webhook signature".to_string(),
        )));
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
