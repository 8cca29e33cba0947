//! crates/studysphere_core/src/payment.rs
//!
//! The payment ledger: entity guards for the authorize/capture/refund
//! lifecycle, and the `PaymentService` that drives the external gateway.
//! The service never decides session state; it reports the outcome of the
//! money movement and callers update the session's payment status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    Actor, Payment, PaymentFailure, PaymentMode, PaymentStatus, RefundInfo, Session,
};
use crate::error::{DomainError, DomainResult};
use crate::ports::{PaymentGateway, PaymentRepository};
use crate::pricing::fee_split;

//=========================================================================================
// Entity transitions
//=========================================================================================

impl Payment {
    pub fn new_order(
        session: &Session,
        order_id: String,
        currency: String,
        fee_percent: f64,
        mode: PaymentMode,
        now: DateTime<Utc>,
    ) -> Payment {
        let (platform_fee, tutor_amount) = fee_split(session.price, fee_percent);
        Payment {
            id: Uuid::new_v4(),
            session_id: session.id,
            payer_id: session.student_id,
            payee_id: session.tutor_id,
            amount: session.price,
            currency,
            platform_fee,
            tutor_amount,
            status: PaymentStatus::Pending,
            mode,
            gateway_order_id: Some(order_id),
            gateway_payment_id: None,
            payment_method: None,
            authorized_at: None,
            captured_at: None,
            refund: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn authorize(&mut self, gateway_payment_id: String, now: DateTime<Utc>) -> DomainResult<()> {
        self.require_status(&[PaymentStatus::Pending])?;
        self.status = PaymentStatus::Authorized;
        self.gateway_payment_id = Some(gateway_payment_id);
        self.authorized_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Capture only from authorized.
    pub fn capture(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.require_status(&[PaymentStatus::Authorized])?;
        self.status = PaymentStatus::Captured;
        self.captured_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Refund only from authorized or captured.
    pub fn refund(
        &mut self,
        reason: Option<String>,
        initiated_by: Uuid,
        gateway_refund_id: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.require_status(&[PaymentStatus::Authorized, PaymentStatus::Captured])?;
        self.status = PaymentStatus::Refunded;
        self.refund = Some(RefundInfo {
            reason,
            amount: self.amount,
            initiated_by,
            initiated_at: now,
            gateway_refund_id,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Records a gateway failure. Only a pending entry can fail; once the
    /// money moved the entry keeps its state. A failed entry is never mutated
    /// again; a retry supersedes it with a new entry.
    pub fn mark_failed(
        &mut self,
        message: String,
        code: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.require_status(&[PaymentStatus::Pending])?;
        self.status = PaymentStatus::Failed;
        self.error = Some(PaymentFailure { message, code });
        self.updated_at = now;
        Ok(())
    }

    fn require_status(&self, allowed: &[PaymentStatus]) -> DomainResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::State {
                current: self.status.as_str().to_string(),
                required: allowed
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" or "),
            })
        }
    }
}

//=========================================================================================
// Webhook events
//=========================================================================================

/// Gateway webhook event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentAuthorized,
    PaymentCaptured,
    PaymentFailed,
    RefundCreated,
}

impl WebhookEvent {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment.authorized" => Some(WebhookEvent::PaymentAuthorized),
            "payment.captured" => Some(WebhookEvent::PaymentCaptured),
            "payment.failed" => Some(WebhookEvent::PaymentFailed),
            "refund.created" => Some(WebhookEvent::RefundCreated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookPayload {
    pub order_id: String,
    pub gateway_payment_id: Option<String>,
    pub refund_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

//=========================================================================================
// PaymentService
//=========================================================================================

pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    fee_percent: f64,
    currency: String,
    mode: PaymentMode,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        fee_percent: f64,
        currency: String,
        mode: PaymentMode,
    ) -> Self {
        Self {
            payments,
            gateway,
            fee_percent,
            currency,
            mode,
        }
    }

    pub fn mode(&self) -> PaymentMode {
        self.mode
    }

    /// Opens a gateway order for a session and persists the pending entry.
    /// Only the paying student may open the order. At most one non-failed
    /// entry exists per session; a failed one may be superseded.
    pub async fn create_order(&self, session: &Session, actor: Actor) -> DomainResult<Payment> {
        match actor {
            Actor::Student(id) if id == session.student_id => {}
            Actor::Admin(_) => {}
            _ => {
                return Err(DomainError::Authorization(
                    "only the booking student can open a payment order".to_string(),
                ))
            }
        }
        if let Some(existing) = self.payments.find_by_session(session.id).await? {
            if existing.status != PaymentStatus::Failed {
                return Err(DomainError::Validation(format!(
                    "a payment already exists for this session (status '{}')",
                    existing.status.as_str()
                )));
            }
        }

        let now = Utc::now();
        let receipt = format!("session-{}", session.id);
        let order = match self
            .gateway
            .create_order(session.price, &self.currency, &receipt)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                // Keep the failed attempt for display, then surface the error.
                let mut failed = Payment::new_order(
                    session,
                    String::new(),
                    self.currency.clone(),
                    self.fee_percent,
                    self.mode,
                    now,
                );
                failed.gateway_order_id = None;
                failed.mark_failed(e.to_string(), None, now)?;
                self.payments.insert(&failed).await?;
                return Err(e);
            }
        };

        let payment = Payment::new_order(
            session,
            order.order_id,
            self.currency.clone(),
            self.fee_percent,
            self.mode,
            now,
        );
        self.payments.insert(&payment).await?;
        Ok(payment)
    }

    /// Verifies the gateway signature for an order and authorizes the entry.
    /// A signature mismatch is a hard failure and marks the entry failed.
    pub async fn verify(
        &self,
        order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> DomainResult<Payment> {
        let mut payment = self
            .payments
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("payment for order {order_id}")))?;

        let now = Utc::now();
        if !self
            .gateway
            .verify_signature(order_id, gateway_payment_id, signature)
        {
            // Only a pending entry is marked failed; a settled one keeps its
            // state and the caller still gets the error.
            if payment.status == PaymentStatus::Pending {
                payment.mark_failed("invalid gateway signature".to_string(), None, now)?;
                self.payments.update(&payment).await?;
            }
            return Err(DomainError::Payment("invalid gateway signature".to_string()));
        }

        payment.authorize(gateway_payment_id.to_string(), now)?;
        self.payments.update(&payment).await?;
        Ok(payment)
    }

    /// Settles an authorized payment. Triggered by completion approval or the
    /// explicit capture endpoint.
    pub async fn capture_for_session(&self, session_id: Uuid) -> DomainResult<Payment> {
        let mut payment = self.require_payment(session_id).await?;
        payment.require_status(&[PaymentStatus::Authorized])?;

        let gateway_payment_id = payment
            .gateway_payment_id
            .clone()
            .ok_or_else(|| DomainError::Payment("payment has no gateway id".to_string()))?;
        self.gateway
            .capture(&gateway_payment_id, payment.amount)
            .await?;

        payment.capture(Utc::now())?;
        self.payments.update(&payment).await?;
        Ok(payment)
    }

    /// Reverses an authorized or captured payment.
    pub async fn refund_for_session(
        &self,
        session_id: Uuid,
        reason: Option<String>,
        initiated_by: Uuid,
    ) -> DomainResult<Payment> {
        let mut payment = self.require_payment(session_id).await?;
        payment.require_status(&[PaymentStatus::Authorized, PaymentStatus::Captured])?;

        let gateway_payment_id = payment
            .gateway_payment_id
            .clone()
            .ok_or_else(|| DomainError::Payment("payment has no gateway id".to_string()))?;
        let refund = self
            .gateway
            .refund(&gateway_payment_id, payment.amount)
            .await?;

        payment.refund(reason, initiated_by, Some(refund.refund_id), Utc::now())?;
        self.payments.update(&payment).await?;
        Ok(payment)
    }

    pub async fn find_for_session(&self, session_id: Uuid) -> DomainResult<Option<Payment>> {
        self.payments.find_by_session(session_id).await
    }

    /// Applies a gateway webhook event to the matching entry. Guard failures
    /// (an event arriving after the state already moved on) are logged and
    /// ignored so the gateway does not retry forever. Returns the updated
    /// entry when the event applied.
    pub async fn apply_webhook(
        &self,
        event: WebhookEvent,
        payload: WebhookPayload,
    ) -> DomainResult<Option<Payment>> {
        let Some(mut payment) = self.payments.find_by_order_id(&payload.order_id).await? else {
            warn!(order_id = %payload.order_id, "webhook for unknown order, ignoring");
            return Ok(None);
        };

        let now = Utc::now();
        let outcome = match event {
            WebhookEvent::PaymentAuthorized => {
                let gpid = payload.gateway_payment_id.unwrap_or_default();
                payment.authorize(gpid, now)
            }
            WebhookEvent::PaymentCaptured => payment.capture(now),
            WebhookEvent::PaymentFailed => payment.mark_failed(
                payload
                    .error_message
                    .unwrap_or_else(|| "gateway reported failure".to_string()),
                payload.error_code,
                now,
            ),
            WebhookEvent::RefundCreated => {
                payment.refund(None, payment.payer_id, payload.refund_id.clone(), now)
            }
        };

        match outcome {
            Ok(()) => {
                self.payments.update(&payment).await?;
                Ok(Some(payment))
            }
            Err(DomainError::State { current, required }) => {
                warn!(
                    order_id = %payload.order_id,
                    %current,
                    %required,
                    "webhook event does not apply to current payment state, ignoring"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn require_payment(&self, session_id: Uuid) -> DomainResult<Payment> {
        self.payments
            .find_by_session(session_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("payment for session {session_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SessionKind, TimeRange};
    use crate::session::NewSession;
    use crate::testsupport::{MemoryPaymentRepository, StubGateway};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 9, 12, 0, 0).unwrap()
    }

    fn session() -> Session {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap();
        Session::create(
            NewSession {
                title: "Algebra".into(),
                tutor_id: Uuid::new_v4(),
                student_id: Uuid::new_v4(),
                subject: "math".into(),
                description: None,
                range: TimeRange::new(start, start + Duration::hours(1)).unwrap(),
                mode: SessionKind::Online,
                location: None,
                price: 40.0,
                notes: None,
            },
            now(),
        )
        .unwrap()
    }

    fn service(gateway: Arc<StubGateway>) -> PaymentService {
        PaymentService::new(
            Arc::new(MemoryPaymentRepository::default()),
            gateway,
            10.0,
            "USD".to_string(),
            PaymentMode::Development,
        )
    }

    #[tokio::test]
    async fn order_fixes_fee_split() {
        let svc = service(Arc::new(StubGateway::default()));
        let s = session();
        let p = svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();
        assert_eq!(p.status, PaymentStatus::Pending);
        assert_eq!(p.amount, 40.0);
        assert_eq!(p.platform_fee, 4.0);
        assert_eq!(p.tutor_amount, 36.0);
        assert!(p.gateway_order_id.is_some());
    }

    #[tokio::test]
    async fn only_payer_opens_order() {
        let svc = service(Arc::new(StubGateway::default()));
        let s = session();
        let err = svc
            .create_order(&s, Actor::Student(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Authorization(_)));
    }

    #[tokio::test]
    async fn duplicate_order_rejected_unless_failed() {
        let gateway = Arc::new(StubGateway::default());
        let svc = service(gateway.clone());
        let s = session();
        svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();
        let err = svc
            .create_order(&s, Actor::Student(s.student_id))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn verify_authorizes_with_valid_signature() {
        let gateway = Arc::new(StubGateway::default());
        let svc = service(gateway.clone());
        let s = session();
        let p = svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();
        let order_id = p.gateway_order_id.unwrap();

        let verified = svc.verify(&order_id, "pay_1", "ok").await.unwrap();
        assert_eq!(verified.status, PaymentStatus::Authorized);
        assert_eq!(verified.gateway_payment_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn bad_signature_is_a_hard_failure() {
        let gateway = Arc::new(StubGateway::default());
        gateway.reject_signatures();
        let svc = service(gateway.clone());
        let s = session();
        let p = svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();
        let order_id = p.gateway_order_id.unwrap();

        let err = svc.verify(&order_id, "pay_1", "bad").await.unwrap_err();
        assert!(matches!(err, DomainError::Payment(_)));
        let stored = svc.find_for_session(s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn capture_requires_authorized() {
        let gateway = Arc::new(StubGateway::default());
        let svc = service(gateway.clone());
        let s = session();
        svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();

        // Still pending: capture must fail the guard.
        let err = svc.capture_for_session(s.id).await.unwrap_err();
        assert!(matches!(err, DomainError::State { .. }));
    }

    #[tokio::test]
    async fn capture_then_double_capture_fails() {
        let gateway = Arc::new(StubGateway::default());
        let svc = service(gateway.clone());
        let s = session();
        let p = svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();
        svc.verify(&p.gateway_order_id.unwrap(), "pay_1", "ok")
            .await
            .unwrap();

        let captured = svc.capture_for_session(s.id).await.unwrap();
        assert_eq!(captured.status, PaymentStatus::Captured);
        assert_eq!(gateway.captures(), 1);

        let err = svc.capture_for_session(s.id).await.unwrap_err();
        assert!(matches!(err, DomainError::State { .. }));
        assert_eq!(gateway.captures(), 1);
    }

    #[tokio::test]
    async fn refund_from_captured() {
        let gateway = Arc::new(StubGateway::default());
        let svc = service(gateway.clone());
        let s = session();
        let p = svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();
        svc.verify(&p.gateway_order_id.unwrap(), "pay_1", "ok")
            .await
            .unwrap();
        svc.capture_for_session(s.id).await.unwrap();

        let refunded = svc
            .refund_for_session(s.id, Some("cancelled".into()), s.student_id)
            .await
            .unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        let info = refunded.refund.unwrap();
        assert_eq!(info.amount, 40.0);
        assert_eq!(info.reason.as_deref(), Some("cancelled"));

        // Refunded is terminal.
        let err = svc
            .refund_for_session(s.id, None, s.student_id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::State { .. }));
    }

    #[tokio::test]
    async fn webhook_out_of_order_event_is_ignored() {
        let gateway = Arc::new(StubGateway::default());
        let svc = service(gateway.clone());
        let s = session();
        let p = svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();
        let order_id = p.gateway_order_id.unwrap();
        svc.verify(&order_id, "pay_1", "ok").await.unwrap();

        // A late "authorized" event must not clobber the authorized entry.
        svc.apply_webhook(
            WebhookEvent::PaymentAuthorized,
            WebhookPayload {
                order_id: order_id.clone(),
                gateway_payment_id: Some("pay_other".into()),
                refund_id: None,
                error_message: None,
                error_code: None,
            },
        )
        .await
        .unwrap();
        let stored = svc.find_for_session(s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Authorized);
        assert_eq!(stored.gateway_payment_id.as_deref(), Some("pay_1"));
    }

    // A replayed or late failure event must not clobber a settled entry.
    #[tokio::test]
    async fn late_failed_webhook_ignored_after_capture() {
        let gateway = Arc::new(StubGateway::default());
        let svc = service(gateway.clone());
        let s = session();
        let p = svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();
        let order_id = p.gateway_order_id.unwrap();
        svc.verify(&order_id, "pay_1", "ok").await.unwrap();
        svc.capture_for_session(s.id).await.unwrap();

        svc.apply_webhook(
            WebhookEvent::PaymentFailed,
            WebhookPayload {
                order_id: order_id.clone(),
                gateway_payment_id: None,
                refund_id: None,
                error_message: Some("stale failure".into()),
                error_code: None,
            },
        )
        .await
        .unwrap();

        let stored = svc.find_for_session(s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Captured);
        // The settled entry keeps blocking a second order for the session.
        let err = svc
            .create_order(&s, Actor::Student(s.student_id))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn bad_signature_cannot_fail_an_authorized_entry() {
        let gateway = Arc::new(StubGateway::default());
        let svc = service(gateway.clone());
        let s = session();
        let p = svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();
        let order_id = p.gateway_order_id.unwrap();
        svc.verify(&order_id, "pay_1", "ok").await.unwrap();

        gateway.reject_signatures();
        let err = svc.verify(&order_id, "pay_1", "bad").await.unwrap_err();
        assert!(matches!(err, DomainError::Payment(_)));
        let stored = svc.find_for_session(s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Authorized);
    }

    #[tokio::test]
    async fn webhook_capture_applies() {
        let gateway = Arc::new(StubGateway::default());
        let svc = service(gateway.clone());
        let s = session();
        let p = svc.create_order(&s, Actor::Student(s.student_id)).await.unwrap();
        let order_id = p.gateway_order_id.unwrap();
        svc.verify(&order_id, "pay_1", "ok").await.unwrap();

        svc.apply_webhook(
            WebhookEvent::PaymentCaptured,
            WebhookPayload {
                order_id,
                gateway_payment_id: None,
                refund_id: None,
                error_message: None,
                error_code: None,
            },
        )
        .await
        .unwrap();
        let stored = svc.find_for_session(s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Captured);
    }
}
