//! crates/studysphere_core/src/testsupport.rs
//!
//! In-memory implementations of the ports, used by the core's unit tests.
//! Stores are Mutex<HashMap> maps; the gateway and notifier are scriptable so
//! tests can force the failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::{
    PartyRole, Payment, PaymentStatus, RequestStatus, Session, SessionRequest, SessionStatus,
    StudentProfile, TutorProfile,
};
use crate::error::{DomainError, DomainResult};
use crate::ports::{
    GatewayOrder, GatewayRefund, NotificationEvent, Notifier, PaymentGateway, PaymentRepository,
    ProfileRepository, SessionRepository, SessionRequestRepository,
};

//=========================================================================================
// Sessions
//=========================================================================================

#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: Mutex<HashMap<Uuid, Session>>,
    // Sessions that appear only after the next insert, simulating a rival
    // committer racing the conflict check.
    pending_rivals: Mutex<Vec<Session>>,
}

impl MemorySessionRepository {
    /// Registers a session that stays invisible to conflict checks until the
    /// next insert lands, reproducing the check-then-act race window.
    pub fn insert_hidden_until_recheck(&self, session: &Session) {
        self.pending_rivals.lock().unwrap().push(session.clone());
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn insert(&self, session: &Session) -> DomainResult<()> {
        let mut map = self.sessions.lock().unwrap();
        map.insert(session.id, session.clone());
        for rival in self.pending_rivals.lock().unwrap().drain(..) {
            map.insert(rival.id, rival);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Session> {
        self.sessions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("session {id}")))
    }

    async fn update(&self, session: &Session) -> DomainResult<()> {
        let mut map = self.sessions.lock().unwrap();
        if !map.contains_key(&session.id) {
            return Err(DomainError::NotFound(format!("session {}", session.id)));
        }
        map.insert(session.id, session.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        self.sessions.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn list_for_party(
        &self,
        party_id: Uuid,
        role: PartyRole,
        statuses: &[SessionStatus],
    ) -> DomainResult<Vec<Session>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| match role {
                PartyRole::Tutor => s.tutor_id == party_id,
                PartyRole::Student => s.student_id == party_id,
            })
            .filter(|s| statuses.contains(&s.status))
            .cloned()
            .collect())
    }

    async fn list_for_student(&self, student_id: Uuid) -> DomainResult<Vec<Session>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn list_for_tutor(&self, tutor_id: Uuid) -> DomainResult<Vec<Session>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.tutor_id == tutor_id)
            .cloned()
            .collect())
    }
}

//=========================================================================================
// Session requests
//=========================================================================================

pub struct MemoryRequestRepository {
    requests: Mutex<HashMap<Uuid, SessionRequest>>,
    sessions: std::sync::Arc<MemorySessionRepository>,
}

impl MemoryRequestRepository {
    pub fn new(sessions: std::sync::Arc<MemorySessionRepository>) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            sessions,
        }
    }
}

#[async_trait]
impl SessionRequestRepository for MemoryRequestRepository {
    async fn insert(&self, request: &SessionRequest) -> DomainResult<()> {
        self.requests
            .lock()
            .unwrap()
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<SessionRequest> {
        self.requests
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("session request {id}")))
    }

    async fn update(&self, request: &SessionRequest) -> DomainResult<()> {
        self.requests
            .lock()
            .unwrap()
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn list_for_student(&self, student_id: Uuid) -> DomainResult<Vec<SessionRequest>> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn list_for_tutor(&self, tutor_id: Uuid) -> DomainResult<Vec<SessionRequest>> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.tutor_id == tutor_id)
            .cloned()
            .collect())
    }

    async fn find_pending_near(
        &self,
        student_id: Uuid,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        window_minutes: i64,
    ) -> DomainResult<Vec<SessionRequest>> {
        let window = Duration::minutes(window_minutes);
        Ok(self
            .requests
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.student_id == student_id && r.tutor_id == tutor_id)
            .filter(|r| r.status == RequestStatus::Pending && !r.is_expired(Utc::now()))
            .filter(|r| {
                let delta = r.requested_range.start - start;
                delta.abs() <= window
            })
            .cloned()
            .collect())
    }

    async fn accept_with_session(
        &self,
        request: &SessionRequest,
        session: &Session,
    ) -> DomainResult<()> {
        // The sqlx adapter does this in one transaction; here both writes
        // happen back to back, which is atomic enough for single-task tests.
        self.sessions.insert(session).await?;
        self.requests
            .lock()
            .unwrap()
            .insert(request.id, request.clone());
        Ok(())
    }
}

//=========================================================================================
// Payments
//=========================================================================================

#[derive(Default)]
pub struct MemoryPaymentRepository {
    payments: Mutex<HashMap<Uuid, Payment>>,
}

#[async_trait]
impl PaymentRepository for MemoryPaymentRepository {
    async fn insert(&self, payment: &Payment) -> DomainResult<()> {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Payment> {
        self.payments
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("payment {id}")))
    }

    async fn update(&self, payment: &Payment) -> DomainResult<()> {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_by_session(&self, session_id: Uuid) -> DomainResult<Option<Payment>> {
        let map = self.payments.lock().unwrap();
        let mut entries: Vec<&Payment> = map
            .values()
            .filter(|p| p.session_id == session_id)
            .collect();
        entries.sort_by_key(|p| p.created_at);
        // Prefer the live entry; fall back to the latest failed one.
        Ok(entries
            .iter()
            .rev()
            .find(|p| p.status != PaymentStatus::Failed)
            .or_else(|| entries.last())
            .map(|p| (*p).clone()))
    }

    async fn find_by_order_id(&self, order_id: &str) -> DomainResult<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.gateway_order_id.as_deref() == Some(order_id))
            .cloned())
    }
}

//=========================================================================================
// Profiles
//=========================================================================================

#[derive(Default)]
pub struct MemoryProfileRepository {
    tutors: Mutex<HashMap<Uuid, TutorProfile>>,
    students: Mutex<HashMap<Uuid, StudentProfile>>,
}

impl MemoryProfileRepository {
    pub fn add_tutor(&self, name: &str, hourly_rate: f64) -> Uuid {
        let id = Uuid::new_v4();
        self.tutors.lock().unwrap().insert(
            id,
            TutorProfile {
                user_id: id,
                display_name: name.to_string(),
                hourly_rate,
                subjects: vec!["math".to_string()],
                verified: true,
            },
        );
        id
    }

    pub fn add_student(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.students.lock().unwrap().insert(
            id,
            StudentProfile {
                user_id: id,
                display_name: name.to_string(),
            },
        );
        id
    }

    pub fn set_tutor_rate(&self, id: Uuid, hourly_rate: f64) {
        if let Some(t) = self.tutors.lock().unwrap().get_mut(&id) {
            t.hourly_rate = hourly_rate;
        }
    }
}

#[async_trait]
impl ProfileRepository for MemoryProfileRepository {
    async fn get_tutor(&self, user_id: Uuid) -> DomainResult<TutorProfile> {
        self.tutors
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("tutor profile {user_id}")))
    }

    async fn get_student(&self, user_id: Uuid) -> DomainResult<StudentProfile> {
        self.students
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("student profile {user_id}")))
    }
}

//=========================================================================================
// Gateway and notifier stubs
//=========================================================================================

/// Auto-succeeding gateway whose failure paths can be switched on per test.
#[derive(Default)]
pub struct StubGateway {
    orders: AtomicU32,
    captures: AtomicU32,
    refunds: AtomicU32,
    fail_refunds: AtomicBool,
    fail_captures: AtomicBool,
    reject_signatures: AtomicBool,
}

impl StubGateway {
    pub fn fail_refunds(&self) {
        self.fail_refunds.store(true, Ordering::SeqCst);
    }

    pub fn fail_captures(&self) {
        self.fail_captures.store(true, Ordering::SeqCst);
    }

    pub fn allow_captures(&self) {
        self.fail_captures.store(false, Ordering::SeqCst);
    }

    pub fn reject_signatures(&self) {
        self.reject_signatures.store(true, Ordering::SeqCst);
    }

    pub fn captures(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn refunds(&self) -> u32 {
        self.refunds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        _amount: f64,
        _currency: &str,
        _receipt: &str,
    ) -> DomainResult<GatewayOrder> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            order_id: format!("order_stub_{n}"),
        })
    }

    fn verify_signature(&self, _order_id: &str, _payment_id: &str, _signature: &str) -> bool {
        !self.reject_signatures.load(Ordering::SeqCst)
    }

    async fn capture(&self, _gateway_payment_id: &str, _amount: f64) -> DomainResult<()> {
        if self.fail_captures.load(Ordering::SeqCst) {
            return Err(DomainError::Gateway("stub capture failure".to_string()));
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refund(&self, _gateway_payment_id: &str, _amount: f64) -> DomainResult<GatewayRefund> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(DomainError::Gateway("stub refund failure".to_string()));
        }
        let n = self.refunds.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayRefund {
            refund_id: format!("refund_stub_{n}"),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
    fail_all: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotificationEvent) -> DomainResult<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(DomainError::Storage("notifier offline".to_string()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
