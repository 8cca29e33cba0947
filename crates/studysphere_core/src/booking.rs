//! crates/studysphere_core/src/booking.rs
//!
//! The booking orchestrator: coordinates validation, conflict detection,
//! pricing, persistence, payment and notifications for the two booking entry
//! points (direct create, accept-from-request) and for every session
//! transition that touches more than one collaborator.
//!
//! Notifications are fire-and-forget throughout: a delivery failure is logged
//! and never fails the primary operation.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::conflict::ConflictChecker;
use crate::domain::{
    Actor, PartyRole, Payment, PaymentStatus, Session, SessionKind, SessionRequest, SessionStatus,
    SessionSummary, TimeRange,
};
use crate::error::{DomainError, DomainResult};
use crate::payment::{PaymentService, WebhookEvent, WebhookPayload};
use crate::ports::{
    NotificationEvent, Notifier, ProfileRepository, SessionRepository, SessionRequestRepository,
};
use crate::pricing::session_price;
use crate::session::NewSession;
use crate::session_request::NewSessionRequest;

/// Window around a requested start inside which a second pending request to
/// the same tutor counts as duplicate intent.
const DUPLICATE_REQUEST_WINDOW_MINUTES: i64 = 60;

//=========================================================================================
// Inputs and outcomes
//=========================================================================================

pub struct BookSessionInput {
    pub tutor_id: Uuid,
    pub subject: String,
    pub title: String,
    pub description: Option<String>,
    pub range: TimeRange,
    pub mode: SessionKind,
    pub location: Option<String>,
    pub notes: Option<String>,
}

pub struct RequestSessionInput {
    pub tutor_id: Uuid,
    pub subject: String,
    pub title: String,
    pub description: Option<String>,
    pub requested_range: TimeRange,
    pub mode: SessionKind,
    pub location: Option<String>,
    pub proposed_price: f64,
    pub message: Option<String>,
}

/// Cancellation result. The state transition is the primary effect; the
/// refund is best-effort and its outcome is reported, not enforced.
pub struct CancelOutcome {
    pub session: Session,
    pub payment_refunded: bool,
}

/// Completion-approval result, mirroring the cancel partial-failure shape.
pub struct CompletionOutcome {
    pub session: Session,
    pub payment_captured: bool,
}

pub struct AvailabilityReport {
    pub available: bool,
    pub conflicts: Vec<SessionSummary>,
}

//=========================================================================================
// BookingOrchestrator
//=========================================================================================

pub struct BookingOrchestrator {
    sessions: Arc<dyn SessionRepository>,
    requests: Arc<dyn SessionRequestRepository>,
    profiles: Arc<dyn ProfileRepository>,
    payments: Arc<PaymentService>,
    notifier: Arc<dyn Notifier>,
    checker: ConflictChecker,
}

impl BookingOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        requests: Arc<dyn SessionRequestRepository>,
        profiles: Arc<dyn ProfileRepository>,
        payments: Arc<PaymentService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let checker = ConflictChecker::new(sessions.clone());
        Self {
            sessions,
            requests,
            profiles,
            payments,
            notifier,
            checker,
        }
    }

    pub fn conflict_checker(&self) -> &ConflictChecker {
        &self.checker
    }

    pub fn payments(&self) -> &PaymentService {
        &self.payments
    }

    //-------------------------------------------------------------------------------------
    // Direct booking
    //-------------------------------------------------------------------------------------

    /// Direct student booking: conflict-check both parties, price the slot
    /// from the tutor's current rate, persist, then re-check for a racing
    /// commit. No payment order is opened here; the client opens it with a
    /// separate call (the documented two-step flow).
    pub async fn book_session(
        &self,
        actor: Actor,
        input: BookSessionInput,
    ) -> DomainResult<Session> {
        let student_id = match actor {
            Actor::Student(id) => id,
            _ => {
                return Err(DomainError::Authorization(
                    "only a student can book a session".to_string(),
                ))
            }
        };

        let tutor = self.profiles.get_tutor(input.tutor_id).await?;
        self.profiles.get_student(student_id).await?;

        self.checker
            .ensure_free(tutor.user_id, PartyRole::Tutor, &input.range, None)
            .await?;
        self.checker
            .ensure_free(student_id, PartyRole::Student, &input.range, None)
            .await?;

        let price = session_price(tutor.hourly_rate, &input.range)?;
        let session = Session::create(
            NewSession {
                title: input.title,
                tutor_id: tutor.user_id,
                student_id,
                subject: input.subject,
                description: input.description,
                range: input.range,
                mode: input.mode,
                location: input.location,
                price,
                notes: input.notes,
            },
            Utc::now(),
        )?;

        self.sessions.insert(&session).await?;
        self.confirm_no_race(&session).await?;

        self.notify(NotificationEvent::SessionBooked {
            session_id: session.id,
            tutor_id: session.tutor_id,
            student_id: session.student_id,
        })
        .await;
        Ok(session)
    }

    /// The check-then-act race backstop: two overlapping bookings can both
    /// pass the conflict check before either commits. After our insert we
    /// re-read; if another overlapping active session committed and wins the
    /// (created_at, id) tie-break, we are the loser: delete our session and
    /// report the conflict.
    async fn confirm_no_race(&self, session: &Session) -> DomainResult<()> {
        let mut rivals = self
            .checker
            .find_conflicts(
                session.tutor_id,
                PartyRole::Tutor,
                &session.range,
                Some(session.id),
            )
            .await?;
        rivals.extend(
            self.checker
                .find_conflicts(
                    session.student_id,
                    PartyRole::Student,
                    &session.range,
                    Some(session.id),
                )
                .await?,
        );

        let lost = {
            let mut lost = false;
            for rival in &rivals {
                let rival_full = self.sessions.get(rival.id).await?;
                if (rival_full.created_at, rival_full.id) < (session.created_at, session.id) {
                    lost = true;
                    break;
                }
            }
            lost
        };
        if lost {
            self.sessions.delete(session.id).await?;
            return Err(DomainError::Conflict { conflicts: rivals });
        }
        Ok(())
    }

    pub async fn check_availability(
        &self,
        tutor_id: Uuid,
        range: TimeRange,
    ) -> DomainResult<AvailabilityReport> {
        let conflicts = self
            .checker
            .find_conflicts(tutor_id, PartyRole::Tutor, &range, None)
            .await?;
        Ok(AvailabilityReport {
            available: conflicts.is_empty(),
            conflicts,
        })
    }

    //-------------------------------------------------------------------------------------
    // Session requests
    //-------------------------------------------------------------------------------------

    pub async fn create_request(
        &self,
        actor: Actor,
        input: RequestSessionInput,
    ) -> DomainResult<SessionRequest> {
        let student_id = match actor {
            Actor::Student(id) => id,
            _ => {
                return Err(DomainError::Authorization(
                    "only a student can request a session".to_string(),
                ))
            }
        };
        self.profiles.get_tutor(input.tutor_id).await?;

        let duplicates = self
            .requests
            .find_pending_near(
                student_id,
                input.tutor_id,
                input.requested_range.start,
                DUPLICATE_REQUEST_WINDOW_MINUTES,
            )
            .await?;
        if !duplicates.is_empty() {
            return Err(DomainError::Validation(
                "you already have a pending request with this tutor around that time".to_string(),
            ));
        }

        let request = SessionRequest::create(
            NewSessionRequest {
                student_id,
                tutor_id: input.tutor_id,
                subject: input.subject,
                title: input.title,
                description: input.description,
                requested_range: input.requested_range,
                mode: input.mode,
                location: input.location,
                proposed_price: input.proposed_price,
                message: input.message,
            },
            Utc::now(),
        )?;
        self.requests.insert(&request).await?;

        self.notify(NotificationEvent::RequestReceived {
            request_id: request.id,
            tutor_id: request.tutor_id,
        })
        .await;
        Ok(request)
    }

    /// Tutor accepts a pending request: re-run the conflict check for the
    /// tutor, build the session with the proposed price carried over
    /// verbatim, and commit session + accepted request atomically. If the
    /// commit fails the request stays pending.
    pub async fn accept_request(
        &self,
        actor: Actor,
        request_id: Uuid,
        response: Option<String>,
    ) -> DomainResult<(SessionRequest, Session)> {
        let mut request = self.requests.get(request_id).await?;
        let now = Utc::now();

        // Ownership and open-state problems surface before the calendar is
        // consulted.
        request.require_owning_tutor(actor, "accept")?;
        request.require_open(now)?;

        self.checker
            .ensure_free(request.tutor_id, PartyRole::Tutor, &request.requested_range, None)
            .await?;

        let session = Session::create(
            NewSession {
                title: request.title.clone(),
                tutor_id: request.tutor_id,
                student_id: request.student_id,
                subject: request.subject.clone(),
                description: request.description.clone(),
                range: request.requested_range,
                mode: request.mode,
                location: request.location.clone(),
                price: request.proposed_price,
                notes: None,
            },
            now,
        )?;

        // Guards (ownership, pending, non-expired) run before anything is
        // persisted; the repository then commits both records in one
        // transaction.
        request.accept(actor, session.id, response, now)?;
        self.requests.accept_with_session(&request, &session).await?;

        if let Err(conflict) = self.confirm_no_race(&session).await {
            // Lost the race after commit: compensate by reopening the request.
            request.status = crate::domain::RequestStatus::Pending;
            request.session_id = None;
            request.responded_at = None;
            request.tutor_response = None;
            self.requests.update(&request).await?;
            return Err(conflict);
        }

        self.notify(NotificationEvent::RequestAccepted {
            request_id: request.id,
            session_id: session.id,
            student_id: request.student_id,
        })
        .await;
        Ok((request, session))
    }

    pub async fn decline_request(
        &self,
        actor: Actor,
        request_id: Uuid,
        reason: &str,
    ) -> DomainResult<SessionRequest> {
        let mut request = self.requests.get(request_id).await?;
        request.decline(actor, reason, Utc::now())?;
        self.requests.update(&request).await?;

        self.notify(NotificationEvent::RequestDeclined {
            request_id: request.id,
            student_id: request.student_id,
        })
        .await;
        Ok(request)
    }

    pub async fn cancel_request(
        &self,
        actor: Actor,
        request_id: Uuid,
    ) -> DomainResult<SessionRequest> {
        let mut request = self.requests.get(request_id).await?;
        request.cancel(actor, Utc::now())?;
        self.requests.update(&request).await?;
        Ok(request)
    }

    //-------------------------------------------------------------------------------------
    // Session transitions
    //-------------------------------------------------------------------------------------

    /// Cancels a session. The refund, when a payment is authorized or
    /// captured, is best-effort: a gateway failure is logged and reported as
    /// `payment_refunded: false` but the cancellation stands.
    pub async fn cancel_session(
        &self,
        actor: Actor,
        session_id: Uuid,
        reason: Option<String>,
    ) -> DomainResult<CancelOutcome> {
        let mut session = self.sessions.get(session_id).await?;
        session.cancel(actor, reason.clone(), Utc::now())?;
        self.sessions.update(&session).await?;

        let mut payment_refunded = false;
        if let Some(payment) = self.payments.find_for_session(session.id).await? {
            if matches!(
                payment.status,
                PaymentStatus::Authorized | PaymentStatus::Captured
            ) {
                match self
                    .payments
                    .refund_for_session(session.id, reason, actor.id())
                    .await
                {
                    Ok(refunded) => {
                        payment_refunded = true;
                        session.payment_status = Some(PaymentStatus::Refunded);
                        self.sessions.update(&session).await?;
                        self.notify(NotificationEvent::PaymentRefunded {
                            session_id: session.id,
                            amount: refunded.amount,
                        })
                        .await;
                    }
                    Err(e) => {
                        warn!(session_id = %session.id, error = %e, "refund failed during cancellation");
                    }
                }
            }
        }

        self.notify(NotificationEvent::SessionCancelled {
            session_id: session.id,
            cancelled_by: actor.id(),
        })
        .await;
        Ok(CancelOutcome {
            session,
            payment_refunded,
        })
    }

    pub async fn request_completion(
        &self,
        actor: Actor,
        session_id: Uuid,
        notes: Option<String>,
    ) -> DomainResult<Session> {
        let mut session = self.sessions.get(session_id).await?;
        session.request_completion(actor, notes, Utc::now())?;
        self.sessions.update(&session).await?;

        self.notify(NotificationEvent::CompletionRequested {
            session_id: session.id,
            student_id: session.student_id,
        })
        .await;
        Ok(session)
    }

    /// Student approves completion. An authorized payment is captured; a
    /// capture failure is logged and reported, the completion stands and an
    /// explicit capture call can retry later.
    pub async fn approve_completion(
        &self,
        actor: Actor,
        session_id: Uuid,
    ) -> DomainResult<CompletionOutcome> {
        let mut session = self.sessions.get(session_id).await?;
        session.approve_completion(actor, Utc::now())?;
        self.sessions.update(&session).await?;

        let mut payment_captured = false;
        if let Some(payment) = self.payments.find_for_session(session.id).await? {
            if payment.status == PaymentStatus::Authorized {
                match self.payments.capture_for_session(session.id).await {
                    Ok(captured) => {
                        payment_captured = true;
                        session.payment_status = Some(PaymentStatus::Captured);
                        self.sessions.update(&session).await?;
                        self.notify(NotificationEvent::PaymentCaptured {
                            session_id: session.id,
                            amount: captured.amount,
                        })
                        .await;
                    }
                    Err(e) => {
                        warn!(session_id = %session.id, error = %e, "capture failed during completion approval");
                    }
                }
            }
        }

        self.notify(NotificationEvent::CompletionApproved {
            session_id: session.id,
            tutor_id: session.tutor_id,
        })
        .await;
        Ok(CompletionOutcome {
            session,
            payment_captured,
        })
    }

    pub async fn reject_completion(
        &self,
        actor: Actor,
        session_id: Uuid,
        reason: Option<String>,
    ) -> DomainResult<Session> {
        let mut session = self.sessions.get(session_id).await?;
        session.reject_completion(actor, reason, Utc::now())?;
        self.sessions.update(&session).await?;
        Ok(session)
    }

    /// Reschedules a scheduled session. The new range is conflict-checked for
    /// both parties, excluding the session itself; on conflict the session is
    /// unchanged.
    pub async fn reschedule_session(
        &self,
        actor: Actor,
        session_id: Uuid,
        new_range: TimeRange,
        reason: Option<String>,
    ) -> DomainResult<Session> {
        let mut session = self.sessions.get(session_id).await?;

        self.checker
            .ensure_free(session.tutor_id, PartyRole::Tutor, &new_range, Some(session.id))
            .await?;
        self.checker
            .ensure_free(
                session.student_id,
                PartyRole::Student,
                &new_range,
                Some(session.id),
            )
            .await?;

        session.reschedule(actor, new_range, reason, Utc::now())?;
        self.sessions.update(&session).await?;

        self.notify(NotificationEvent::SessionRescheduled {
            session_id: session.id,
        })
        .await;
        Ok(session)
    }

    pub async fn submit_review(
        &self,
        actor: Actor,
        session_id: Uuid,
        rating: u8,
        review: Option<String>,
    ) -> DomainResult<Session> {
        let mut session = self.sessions.get(session_id).await?;
        session.submit_review(actor, rating, review, Utc::now())?;
        self.sessions.update(&session).await?;
        Ok(session)
    }

    //-------------------------------------------------------------------------------------
    // Payment facade
    //-------------------------------------------------------------------------------------
    //
    // The payment service moves the money; these wrappers additionally mirror
    // the outcome onto the session's payment status so reads stay consistent
    // with the ledger.

    /// Opens the payment order for a session the actor is a party to.
    pub async fn open_payment_order(
        &self,
        actor: Actor,
        session_id: Uuid,
    ) -> DomainResult<Payment> {
        let session = self.get_session(actor, session_id).await?;
        let payment = self.payments.create_order(&session, actor).await?;
        self.record_payment_status(session_id, payment.status).await;
        Ok(payment)
    }

    /// Verifies a gateway callback and authorizes the matching entry.
    pub async fn verify_payment(
        &self,
        order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> DomainResult<Payment> {
        let payment = self
            .payments
            .verify(order_id, gateway_payment_id, signature)
            .await?;
        self.record_payment_status(payment.session_id, payment.status).await;
        Ok(payment)
    }

    /// Explicit capture, the retry path after a failed capture-on-approval.
    pub async fn capture_payment(&self, actor: Actor, session_id: Uuid) -> DomainResult<Payment> {
        self.get_session(actor, session_id).await?;
        let payment = self.payments.capture_for_session(session_id).await?;
        self.record_payment_status(session_id, payment.status).await;
        self.notify(NotificationEvent::PaymentCaptured {
            session_id,
            amount: payment.amount,
        })
        .await;
        Ok(payment)
    }

    /// Explicit refund of an authorized or captured payment.
    pub async fn refund_payment(
        &self,
        actor: Actor,
        session_id: Uuid,
        reason: Option<String>,
    ) -> DomainResult<Payment> {
        self.get_session(actor, session_id).await?;
        let payment = self
            .payments
            .refund_for_session(session_id, reason, actor.id())
            .await?;
        self.record_payment_status(session_id, payment.status).await;
        self.notify(NotificationEvent::PaymentRefunded {
            session_id,
            amount: payment.amount,
        })
        .await;
        Ok(payment)
    }

    /// Applies a gateway webhook; when the event landed on an entry the new
    /// payment state is mirrored onto its session.
    pub async fn apply_payment_webhook(
        &self,
        event: WebhookEvent,
        payload: WebhookPayload,
    ) -> DomainResult<()> {
        if let Some(payment) = self.payments.apply_webhook(event, payload).await? {
            self.record_payment_status(payment.session_id, payment.status).await;
        }
        Ok(())
    }

    /// The money already moved, so a failure to mirror the status onto the
    /// session is logged rather than surfaced.
    async fn record_payment_status(&self, session_id: Uuid, status: PaymentStatus) {
        let result = match self.sessions.get(session_id).await {
            Ok(mut session) => {
                session.payment_status = Some(status);
                self.sessions.update(&session).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(session_id = %session_id, error = %e, "failed to record payment status on session");
        }
    }

    //-------------------------------------------------------------------------------------
    // Reads (role-filtered)
    //-------------------------------------------------------------------------------------

    pub async fn get_session(&self, actor: Actor, session_id: Uuid) -> DomainResult<Session> {
        let session = self.sessions.get(session_id).await?;
        let allowed = match actor {
            Actor::Student(id) => id == session.student_id,
            Actor::Tutor(id) => id == session.tutor_id,
            Actor::Admin(_) => true,
        };
        if !allowed {
            return Err(DomainError::Authorization(
                "you are not a party to this session".to_string(),
            ));
        }
        Ok(session)
    }

    pub async fn list_sessions(&self, actor: Actor) -> DomainResult<Vec<Session>> {
        match actor {
            Actor::Student(id) => self.sessions.list_for_student(id).await,
            Actor::Tutor(id) => self.sessions.list_for_tutor(id).await,
            Actor::Admin(_) => Err(DomainError::Authorization(
                "admin session listing is out of scope".to_string(),
            )),
        }
    }

    pub async fn list_requests(&self, actor: Actor) -> DomainResult<Vec<SessionRequest>> {
        match actor {
            Actor::Student(id) => self.requests.list_for_student(id).await,
            Actor::Tutor(id) => self.requests.list_for_tutor(id).await,
            Actor::Admin(_) => Err(DomainError::Authorization(
                "admin request listing is out of scope".to_string(),
            )),
        }
    }

    async fn notify(&self, event: NotificationEvent) {
        if let Err(e) = self.notifier.notify(event).await {
            warn!(error = %e, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PaymentMode, RequestStatus};
    use crate::testsupport::{
        MemoryPaymentRepository, MemoryProfileRepository, MemoryRequestRepository,
        MemorySessionRepository, RecordingNotifier, StubGateway,
    };
    use chrono::{DateTime, Duration};

    struct Fixture {
        orchestrator: BookingOrchestrator,
        sessions: Arc<MemorySessionRepository>,
        requests: Arc<MemoryRequestRepository>,
        profiles: Arc<MemoryProfileRepository>,
        gateway: Arc<StubGateway>,
        notifier: Arc<RecordingNotifier>,
        tutor: Uuid,
        student: Uuid,
    }

    fn fixture() -> Fixture {
        let sessions = Arc::new(MemorySessionRepository::default());
        let requests = Arc::new(MemoryRequestRepository::new(sessions.clone()));
        let profiles = Arc::new(MemoryProfileRepository::default());
        let gateway = Arc::new(StubGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let payments = Arc::new(PaymentService::new(
            Arc::new(MemoryPaymentRepository::default()),
            gateway.clone(),
            10.0,
            "USD".to_string(),
            PaymentMode::Development,
        ));
        let tutor = profiles.add_tutor("T. Tutor", 40.0);
        let student = profiles.add_student("S. Student");
        let orchestrator = BookingOrchestrator::new(
            sessions.clone(),
            requests.clone(),
            profiles.clone(),
            payments,
            notifier.clone(),
        );
        Fixture {
            orchestrator,
            sessions,
            requests,
            profiles,
            gateway,
            notifier,
            tutor,
            student,
        }
    }

    fn future(hours: i64) -> DateTime<Utc> {
        Utc::now() + Duration::hours(hours)
    }

    fn slot(hours_from_now: i64, len_hours: i64) -> TimeRange {
        TimeRange::new(future(hours_from_now), future(hours_from_now + len_hours)).unwrap()
    }

    fn booking(f: &Fixture, range: TimeRange) -> BookSessionInput {
        BookSessionInput {
            tutor_id: f.tutor,
            subject: "math".into(),
            title: "Algebra".into(),
            description: None,
            range,
            mode: SessionKind::Online,
            location: None,
            notes: None,
        }
    }

    fn request_input(f: &Fixture, range: TimeRange) -> RequestSessionInput {
        RequestSessionInput {
            tutor_id: f.tutor,
            subject: "math".into(),
            title: "Algebra".into(),
            description: None,
            requested_range: range,
            mode: SessionKind::Online,
            location: None,
            proposed_price: 35.0,
            message: None,
        }
    }

    // Scenario A: price derives from the tutor's rate.
    #[tokio::test]
    async fn booking_prices_from_hourly_rate() {
        let f = fixture();
        let session = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();
        assert_eq!(session.price, 40.0);
        assert_eq!(session.status, SessionStatus::Scheduled);
    }

    // Scenario B: an overlapping second booking gets a conflict naming the first.
    #[tokio::test]
    async fn overlapping_booking_conflicts() {
        let f = fixture();
        let first = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();

        let other_student = f.profiles.add_student("Other");
        let overlapping = TimeRange::new(
            first.range.start + Duration::minutes(30),
            first.range.end + Duration::minutes(30),
        )
        .unwrap();
        let err = f
            .orchestrator
            .book_session(Actor::Student(other_student), booking(&f, overlapping))
            .await
            .unwrap_err();
        match err {
            DomainError::Conflict { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].id, first.id);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn adjacent_bookings_both_succeed() {
        let f = fixture();
        let first = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();

        let other_student = f.profiles.add_student("Other");
        let adjacent = TimeRange::new(first.range.end, first.range.end + Duration::hours(1)).unwrap();
        f.orchestrator
            .book_session(Actor::Student(other_student), booking(&f, adjacent))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn student_double_booking_is_blocked_too() {
        let f = fixture();
        f.orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();

        let other_tutor = f.profiles.add_tutor("Other tutor", 50.0);
        let mut input = booking(&f, slot(24, 1));
        input.tutor_id = other_tutor;
        let err = f
            .orchestrator
            .book_session(Actor::Student(f.student), input)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    // Price immutability: a later rate change never reprices a booked session.
    #[tokio::test]
    async fn rate_change_does_not_reprice() {
        let f = fixture();
        let session = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();
        f.profiles.set_tutor_rate(f.tutor, 80.0);
        let reread = f.sessions.get(session.id).await.unwrap();
        assert_eq!(reread.price, 40.0);
    }

    #[tokio::test]
    async fn unknown_tutor_is_not_found() {
        let f = fixture();
        let mut input = booking(&f, slot(24, 1));
        input.tutor_id = Uuid::new_v4();
        let err = f
            .orchestrator
            .book_session(Actor::Student(f.student), input)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    // Scenario E: accepting a request creates a linked session atomically.
    #[tokio::test]
    async fn accept_request_links_session() {
        let f = fixture();
        let request = f
            .orchestrator
            .create_request(Actor::Student(f.student), request_input(&f, slot(24, 1)))
            .await
            .unwrap();

        let (accepted, session) = f
            .orchestrator
            .accept_request(Actor::Tutor(f.tutor), request.id, None)
            .await
            .unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert_eq!(accepted.session_id, Some(session.id));
        assert_eq!(session.status, SessionStatus::Scheduled);
        // Proposed price carried over verbatim, not repriced from the rate.
        assert_eq!(session.price, 35.0);

        let stored = f.requests.get(request.id).await.unwrap();
        assert_eq!(stored.session_id, Some(session.id));
        assert_eq!(stored.status, RequestStatus::Accepted);
    }

    #[tokio::test]
    async fn accept_rechecks_conflicts() {
        let f = fixture();
        let range = slot(24, 1);
        let request = f
            .orchestrator
            .create_request(Actor::Student(f.student), request_input(&f, range))
            .await
            .unwrap();

        // The slot gets taken between proposal and acceptance.
        let other_student = f.profiles.add_student("Other");
        f.orchestrator
            .book_session(Actor::Student(other_student), booking(&f, range))
            .await
            .unwrap();

        let err = f
            .orchestrator
            .accept_request(Actor::Tutor(f.tutor), request.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
        let stored = f.requests.get(request.id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
        assert!(stored.session_id.is_none());
    }

    #[tokio::test]
    async fn duplicate_intent_guard() {
        let f = fixture();
        let range = slot(24, 1);
        f.orchestrator
            .create_request(Actor::Student(f.student), request_input(&f, range))
            .await
            .unwrap();

        // Second request to the same tutor 30 minutes away: duplicate intent.
        let near = TimeRange::new(
            range.start + Duration::minutes(30),
            range.end + Duration::minutes(30),
        )
        .unwrap();
        let err = f
            .orchestrator
            .create_request(Actor::Student(f.student), request_input(&f, near))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // Two hours away is a distinct intent.
        let far = TimeRange::new(range.start + Duration::hours(2), range.end + Duration::hours(2))
            .unwrap();
        f.orchestrator
            .create_request(Actor::Student(f.student), request_input(&f, far))
            .await
            .unwrap();
    }

    // Scenario C: completion round-trip captures an authorized payment.
    #[tokio::test]
    async fn completion_captures_authorized_payment() {
        let f = fixture();
        let session = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();
        let payment = f
            .orchestrator
            .payments()
            .create_order(&session, Actor::Student(f.student))
            .await
            .unwrap();
        f.orchestrator
            .payments()
            .verify(&payment.gateway_order_id.unwrap(), "pay_1", "ok")
            .await
            .unwrap();

        f.orchestrator
            .request_completion(Actor::Tutor(f.tutor), session.id, None)
            .await
            .unwrap();
        let outcome = f
            .orchestrator
            .approve_completion(Actor::Student(f.student), session.id)
            .await
            .unwrap();
        assert_eq!(outcome.session.status, SessionStatus::Completed);
        assert!(outcome.payment_captured);
        assert_eq!(f.gateway.captures(), 1);

        let stored = f
            .orchestrator
            .payments()
            .find_for_session(session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PaymentStatus::Captured);
    }

    // Scenario D: cancel refunds an authorized payment.
    #[tokio::test]
    async fn cancel_refunds_authorized_payment() {
        let f = fixture();
        let session = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();
        let payment = f
            .orchestrator
            .payments()
            .create_order(&session, Actor::Student(f.student))
            .await
            .unwrap();
        f.orchestrator
            .payments()
            .verify(&payment.gateway_order_id.unwrap(), "pay_1", "ok")
            .await
            .unwrap();

        let outcome = f
            .orchestrator
            .cancel_session(Actor::Tutor(f.tutor), session.id, Some("ill".into()))
            .await
            .unwrap();
        assert_eq!(outcome.session.status, SessionStatus::Cancelled);
        assert!(outcome.payment_refunded);
        assert_eq!(
            outcome.session.payment_status,
            Some(PaymentStatus::Refunded)
        );
    }

    // Property 6: refund failure never blocks cancellation.
    #[tokio::test]
    async fn refund_failure_does_not_block_cancel() {
        let f = fixture();
        let session = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();
        let payment = f
            .orchestrator
            .payments()
            .create_order(&session, Actor::Student(f.student))
            .await
            .unwrap();
        f.orchestrator
            .payments()
            .verify(&payment.gateway_order_id.unwrap(), "pay_1", "ok")
            .await
            .unwrap();

        f.gateway.fail_refunds();
        let outcome = f
            .orchestrator
            .cancel_session(Actor::Student(f.student), session.id, None)
            .await
            .unwrap();
        assert_eq!(outcome.session.status, SessionStatus::Cancelled);
        assert!(!outcome.payment_refunded);

        let stored = f
            .orchestrator
            .payments()
            .find_for_session(session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PaymentStatus::Authorized);
    }

    // Mirror of the refund policy: a capture failure never blocks completion.
    #[tokio::test]
    async fn capture_failure_does_not_block_completion() {
        let f = fixture();
        let session = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();
        let payment = f
            .orchestrator
            .open_payment_order(Actor::Student(f.student), session.id)
            .await
            .unwrap();
        f.orchestrator
            .verify_payment(&payment.gateway_order_id.unwrap(), "pay_1", "ok")
            .await
            .unwrap();

        f.gateway.fail_captures();
        f.orchestrator
            .request_completion(Actor::Tutor(f.tutor), session.id, None)
            .await
            .unwrap();
        let outcome = f
            .orchestrator
            .approve_completion(Actor::Student(f.student), session.id)
            .await
            .unwrap();
        assert_eq!(outcome.session.status, SessionStatus::Completed);
        assert!(!outcome.payment_captured);
        assert_eq!(f.gateway.captures(), 0);

        let stored = f
            .orchestrator
            .payments()
            .find_for_session(session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PaymentStatus::Authorized);
    }

    // A retried capture through the explicit path settles the payment and the
    // session record reflects it.
    #[tokio::test]
    async fn capture_retry_updates_session_payment_status() {
        let f = fixture();
        let session = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();
        let payment = f
            .orchestrator
            .open_payment_order(Actor::Student(f.student), session.id)
            .await
            .unwrap();
        let reread = f.sessions.get(session.id).await.unwrap();
        assert_eq!(reread.payment_status, Some(PaymentStatus::Pending));

        f.orchestrator
            .verify_payment(&payment.gateway_order_id.unwrap(), "pay_1", "ok")
            .await
            .unwrap();
        let reread = f.sessions.get(session.id).await.unwrap();
        assert_eq!(reread.payment_status, Some(PaymentStatus::Authorized));

        f.gateway.fail_captures();
        f.orchestrator
            .request_completion(Actor::Tutor(f.tutor), session.id, None)
            .await
            .unwrap();
        let outcome = f
            .orchestrator
            .approve_completion(Actor::Student(f.student), session.id)
            .await
            .unwrap();
        assert!(!outcome.payment_captured);

        f.gateway.allow_captures();
        f.orchestrator
            .capture_payment(Actor::Student(f.student), session.id)
            .await
            .unwrap();
        let reread = f.sessions.get(session.id).await.unwrap();
        assert_eq!(reread.status, SessionStatus::Completed);
        assert_eq!(reread.payment_status, Some(PaymentStatus::Captured));
    }

    #[tokio::test]
    async fn explicit_refund_updates_session_payment_status() {
        let f = fixture();
        let session = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();
        let payment = f
            .orchestrator
            .open_payment_order(Actor::Student(f.student), session.id)
            .await
            .unwrap();
        f.orchestrator
            .verify_payment(&payment.gateway_order_id.unwrap(), "pay_1", "ok")
            .await
            .unwrap();

        f.orchestrator
            .refund_payment(Actor::Student(f.student), session.id, Some("changed plans".into()))
            .await
            .unwrap();
        let reread = f.sessions.get(session.id).await.unwrap();
        assert_eq!(reread.payment_status, Some(PaymentStatus::Refunded));
    }

    // Scenario F: a reschedule into a taken slot leaves the session unchanged.
    #[tokio::test]
    async fn reschedule_into_taken_slot_conflicts() {
        let f = fixture();
        let a = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();
        let other_student = f.profiles.add_student("Other");
        let b = f
            .orchestrator
            .book_session(Actor::Student(other_student), booking(&f, slot(30, 1)))
            .await
            .unwrap();

        let err = f
            .orchestrator
            .reschedule_session(Actor::Student(f.student), a.id, b.range, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));

        let unchanged = f.sessions.get(a.id).await.unwrap();
        assert_eq!(unchanged.status, SessionStatus::Scheduled);
        assert_eq!(unchanged.range, a.range);
    }

    #[tokio::test]
    async fn reschedule_to_free_slot_excludes_self() {
        let f = fixture();
        let a = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 2)))
            .await
            .unwrap();

        // Shift by one hour: overlaps the old slot, which must not count.
        let shifted = TimeRange::new(
            a.range.start + Duration::hours(1),
            a.range.end + Duration::hours(1),
        )
        .unwrap();
        let updated = f
            .orchestrator
            .reschedule_session(Actor::Tutor(f.tutor), a.id, shifted, Some("moved".into()))
            .await
            .unwrap();
        assert_eq!(updated.status, SessionStatus::Rescheduled);
        assert_eq!(updated.range, shifted);
    }

    #[tokio::test]
    async fn notification_failure_never_fails_booking() {
        let f = fixture();
        f.notifier.fail_all();
        let session = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Scheduled);
    }

    #[tokio::test]
    async fn race_loser_rolls_back() {
        let f = fixture();
        // Simulate the racing committer: a session inserted behind the
        // checker's back with an earlier creation timestamp.
        let range = slot(24, 1);
        let mut rival = Session::create(
            NewSession {
                title: "rival".into(),
                tutor_id: f.tutor,
                student_id: f.profiles.add_student("Rival"),
                subject: "math".into(),
                description: None,
                range,
                mode: SessionKind::Online,
                location: None,
                price: 40.0,
                notes: None,
            },
            Utc::now() - Duration::seconds(5),
        )
        .unwrap();
        rival.created_at = Utc::now() - Duration::seconds(5);
        f.sessions.insert_hidden_until_recheck(&rival);

        let err = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, range))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));

        // Our session was compensated away: the rival is the only survivor.
        let remaining = f
            .sessions
            .list_for_party(f.tutor, PartyRole::Tutor, &SessionStatus::ACTIVE)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, rival.id);
    }

    #[tokio::test]
    async fn read_paths_are_role_filtered() {
        let f = fixture();
        let session = f
            .orchestrator
            .book_session(Actor::Student(f.student), booking(&f, slot(24, 1)))
            .await
            .unwrap();

        let err = f
            .orchestrator
            .get_session(Actor::Student(Uuid::new_v4()), session.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Authorization(_)));

        let mine = f
            .orchestrator
            .list_sessions(Actor::Student(f.student))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        let tutors = f
            .orchestrator
            .list_sessions(Actor::Tutor(f.tutor))
            .await
            .unwrap();
        assert_eq!(tutors.len(), 1);
    }
}
