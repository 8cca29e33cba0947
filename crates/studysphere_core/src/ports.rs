//! crates/studysphere_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the booking core.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of the database, the payment gateway, the identity
//! provider and the notification transport.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Actor, PartyRole, Payment, Session, SessionRequest, SessionStatus, StudentProfile,
    TutorProfile,
};
use crate::error::DomainResult;

//=========================================================================================
// Repositories
//=========================================================================================

/// Session persistence. Every write is a full-record replace; there is no
/// multi-writer merge.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &Session) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Session>;

    async fn update(&self, session: &Session) -> DomainResult<()>;

    /// Compensating removal for the post-insert race check.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// Query-by-field fetch used by the conflict checker: all sessions where
    /// the given party appears on the given side with one of the statuses.
    async fn list_for_party(
        &self,
        party_id: Uuid,
        role: PartyRole,
        statuses: &[SessionStatus],
    ) -> DomainResult<Vec<Session>>;

    async fn list_for_student(&self, student_id: Uuid) -> DomainResult<Vec<Session>>;

    async fn list_for_tutor(&self, tutor_id: Uuid) -> DomainResult<Vec<Session>>;
}

#[async_trait]
pub trait SessionRequestRepository: Send + Sync {
    async fn insert(&self, request: &SessionRequest) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<SessionRequest>;

    async fn update(&self, request: &SessionRequest) -> DomainResult<()>;

    async fn list_for_student(&self, student_id: Uuid) -> DomainResult<Vec<SessionRequest>>;

    async fn list_for_tutor(&self, tutor_id: Uuid) -> DomainResult<Vec<SessionRequest>>;

    /// Pending requests from a student to a tutor whose requested start falls
    /// within `window_minutes` of `start` (the duplicate-intent guard).
    async fn find_pending_near(
        &self,
        student_id: Uuid,
        tutor_id: Uuid,
        start: chrono::DateTime<chrono::Utc>,
        window_minutes: i64,
    ) -> DomainResult<Vec<SessionRequest>>;

    /// Persists the accepted request and its new session in one transaction.
    /// If the session insert fails, the request must stay pending.
    async fn accept_with_session(
        &self,
        request: &SessionRequest,
        session: &Session,
    ) -> DomainResult<()>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, payment: &Payment) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Payment>;

    async fn update(&self, payment: &Payment) -> DomainResult<()>;

    /// The live (non-failed) entry for a session when one exists, otherwise
    /// the latest failed attempt, kept for display.
    async fn find_by_session(&self, session_id: Uuid) -> DomainResult<Option<Payment>>;

    async fn find_by_order_id(&self, order_id: &str) -> DomainResult<Option<Payment>>;
}

/// Narrow projections of the marketplace profiles; full profile CRUD lives
/// outside the booking core.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_tutor(&self, user_id: Uuid) -> DomainResult<TutorProfile>;

    async fn get_student(&self, user_id: Uuid) -> DomainResult<StudentProfile>;
}

//=========================================================================================
// Payment gateway
//=========================================================================================

#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub order_id: String,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub refund_id: String,
}

/// The order/authorize/capture/refund contract against the external gateway.
/// Implementations: deterministic auto-success (development) and HTTP with a
/// bounded timeout (test/live).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount: f64,
        currency: &str,
        receipt: &str,
    ) -> DomainResult<GatewayOrder>;

    /// HMAC-SHA256 over `"{order_id}|{payment_id}"` with the shared secret.
    /// A mismatch is a hard failure, not retried.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    async fn capture(&self, gateway_payment_id: &str, amount: f64) -> DomainResult<()>;

    async fn refund(&self, gateway_payment_id: &str, amount: f64) -> DomainResult<GatewayRefund>;
}

//=========================================================================================
// Notifications
//=========================================================================================

/// Events pushed to the chat/dashboard transport. Delivery is fire-and-forget:
/// callers log failures and never propagate them.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    SessionBooked { session_id: Uuid, tutor_id: Uuid, student_id: Uuid },
    SessionCancelled { session_id: Uuid, cancelled_by: Uuid },
    SessionRescheduled { session_id: Uuid },
    CompletionRequested { session_id: Uuid, student_id: Uuid },
    CompletionApproved { session_id: Uuid, tutor_id: Uuid },
    RequestReceived { request_id: Uuid, tutor_id: Uuid },
    RequestAccepted { request_id: Uuid, session_id: Uuid, student_id: Uuid },
    RequestDeclined { request_id: Uuid, student_id: Uuid },
    PaymentCaptured { session_id: Uuid, amount: f64 },
    PaymentRefunded { session_id: Uuid, amount: f64 },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> DomainResult<()>;
}

//=========================================================================================
// Identity
//=========================================================================================

/// Validates the opaque bearer credential issued by the out-of-scope identity
/// system and resolves it to an actor (user id + role).
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn validate(&self, token: &str) -> DomainResult<Actor>;
}
