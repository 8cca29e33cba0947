//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification.

use utoipa::OpenApi;

use crate::web::payments;
use crate::web::protocol::{
    CompletionRequestDto, ConflictingSessionDto, PaymentDto, SessionDto, SessionRequestDto,
};
use crate::web::session_requests;
use crate::web::sessions;

#[derive(OpenApi)]
#[openapi(
    paths(
        sessions::create_session_handler,
        sessions::list_sessions_handler,
        sessions::list_tutor_sessions_handler,
        sessions::get_session_handler,
        sessions::cancel_session_handler,
        sessions::request_completion_handler,
        sessions::approve_completion_handler,
        sessions::reject_completion_handler,
        sessions::reschedule_session_handler,
        sessions::review_session_handler,
        sessions::check_availability_handler,
        session_requests::create_request_handler,
        session_requests::list_requests_handler,
        session_requests::list_tutor_requests_handler,
        session_requests::accept_request_handler,
        session_requests::decline_request_handler,
        session_requests::cancel_request_handler,
        payments::create_order_handler,
        payments::verify_payment_handler,
        payments::capture_payment_handler,
        payments::refund_payment_handler,
        payments::get_session_payment_handler,
        payments::webhook_handler,
    ),
    components(
        schemas(
            SessionDto,
            CompletionRequestDto,
            ConflictingSessionDto,
            SessionRequestDto,
            PaymentDto,
            sessions::CreateSessionBody,
            sessions::CancelSessionBody,
            sessions::CompleteSessionBody,
            sessions::RejectCompletionBody,
            sessions::RescheduleSessionBody,
            sessions::ReviewSessionBody,
            sessions::CheckAvailabilityBody,
            sessions::AvailabilityDto,
            sessions::CancelOutcomeDto,
            sessions::CompletionOutcomeDto,
            session_requests::CreateRequestBody,
            session_requests::AcceptRequestBody,
            session_requests::DeclineRequestBody,
            session_requests::AcceptedRequestDto,
            payments::CreateOrderBody,
            payments::VerifyPaymentBody,
            payments::RefundBody,
            payments::WebhookBody,
        )
    ),
    tags(
        (name = "sessions", description = "Session lifecycle: booking, completion, cancellation, rescheduling."),
        (name = "session-requests", description = "Student proposals awaiting a tutor response."),
        (name = "payments", description = "Authorize/capture/refund ledger and the gateway webhook.")
    )
)]
pub struct ApiDoc;
