//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the repository ports from the `studysphere_core` crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use studysphere_core::domain::{
    CompletionRequest, MeetingRoom, Payment, PaymentFailure, PaymentMode, PaymentStatus,
    PartyRole, RefundInfo, RequestStatus, Session, SessionKind, SessionRequest, SessionStatus,
    StudentProfile, TimeRange, TutorProfile,
};
use studysphere_core::error::{DomainError, DomainResult};
use studysphere_core::ports::{
    PaymentRepository, ProfileRepository, SessionRepository, SessionRequestRepository,
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter implementing all four repository ports over one pool.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn storage_err(e: sqlx::Error) -> DomainError {
    DomainError::Storage(e.to_string())
}

fn not_found_or_storage(e: sqlx::Error, what: String) -> DomainError {
    match e {
        sqlx::Error::RowNotFound => DomainError::NotFound(what),
        other => DomainError::Storage(other.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    title: String,
    tutor_id: Uuid,
    student_id: Uuid,
    subject: String,
    description: Option<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    status: String,
    mode: String,
    location: Option<String>,
    price: f64,
    payment_status: Option<String>,
    rating: Option<i16>,
    review: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    cancel_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<Uuid>,
    completion_requested_at: Option<DateTime<Utc>>,
    completion_requested_by: Option<Uuid>,
    completion_request_notes: Option<String>,
    completion_responded_at: Option<DateTime<Utc>>,
    completion_responded_by: Option<Uuid>,
    completion_approved: Option<bool>,
    completion_rejection_reason: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    completion_notes: Option<String>,
    reschedule_reason: Option<String>,
    rescheduled_at: Option<DateTime<Utc>>,
    meeting_room_id: Option<String>,
    meeting_room_url: Option<String>,
    meeting_room_active: Option<bool>,
    meeting_room_started_at: Option<DateTime<Utc>>,
    meeting_room_started_by: Option<Uuid>,
    meeting_room_ended_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl SessionRecord {
    fn to_domain(self) -> DomainResult<Session> {
        let range = TimeRange::new(self.start_time, self.end_time)
            .map_err(|_| DomainError::Storage("session row has an inverted time range".to_string()))?;
        let completion_request = self.completion_requested_at.map(|requested_at| {
            CompletionRequest {
                requested_at,
                requested_by: self.completion_requested_by.unwrap_or(self.tutor_id),
                notes: self.completion_request_notes.clone(),
                responded_at: self.completion_responded_at,
                responded_by: self.completion_responded_by,
                approved: self.completion_approved,
                rejection_reason: self.completion_rejection_reason.clone(),
            }
        });
        let meeting_room = match (self.meeting_room_id, self.meeting_room_url) {
            (Some(room_id), Some(room_url)) => Some(MeetingRoom {
                room_id,
                room_url,
                is_active: self.meeting_room_active.unwrap_or(false),
                started_at: self.meeting_room_started_at,
                started_by: self.meeting_room_started_by,
                ended_at: self.meeting_room_ended_at,
            }),
            _ => None,
        };
        Ok(Session {
            id: self.id,
            title: self.title,
            tutor_id: self.tutor_id,
            student_id: self.student_id,
            subject: self.subject,
            description: self.description,
            range,
            status: SessionStatus::parse(&self.status)?,
            mode: SessionKind::parse(&self.mode)?,
            location: self.location,
            price: self.price,
            payment_status: self
                .payment_status
                .as_deref()
                .map(PaymentStatus::parse)
                .transpose()?,
            rating: self.rating.map(|r| r as u8),
            review: self.review,
            reviewed_at: self.reviewed_at,
            notes: self.notes,
            cancel_reason: self.cancel_reason,
            cancelled_at: self.cancelled_at,
            cancelled_by: self.cancelled_by,
            completion_request,
            completed_at: self.completed_at,
            completion_notes: self.completion_notes,
            reschedule_reason: self.reschedule_reason,
            rescheduled_at: self.rescheduled_at,
            meeting_room,
            created_at: self.created_at,
        })
    }
}

const SESSION_COLUMNS: &str = "id, title, tutor_id, student_id, subject, description, start_time, \
     end_time, status, mode, location, price, payment_status, rating, review, reviewed_at, notes, \
     cancel_reason, cancelled_at, cancelled_by, completion_requested_at, completion_requested_by, \
     completion_request_notes, completion_responded_at, completion_responded_by, \
     completion_approved, completion_rejection_reason, completed_at, completion_notes, \
     reschedule_reason, rescheduled_at, meeting_room_id, meeting_room_url, meeting_room_active, \
     meeting_room_started_at, meeting_room_started_by, meeting_room_ended_at, created_at";

#[derive(FromRow)]
struct SessionRequestRecord {
    id: Uuid,
    student_id: Uuid,
    tutor_id: Uuid,
    subject: String,
    title: String,
    description: Option<String>,
    requested_start: DateTime<Utc>,
    requested_end: DateTime<Utc>,
    mode: String,
    location: Option<String>,
    proposed_price: f64,
    message: Option<String>,
    status: String,
    tutor_response: Option<String>,
    decline_reason: Option<String>,
    responded_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    session_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl SessionRequestRecord {
    fn to_domain(self) -> DomainResult<SessionRequest> {
        let requested_range = TimeRange::new(self.requested_start, self.requested_end)
            .map_err(|_| DomainError::Storage("request row has an inverted time range".to_string()))?;
        Ok(SessionRequest {
            id: self.id,
            student_id: self.student_id,
            tutor_id: self.tutor_id,
            subject: self.subject,
            title: self.title,
            description: self.description,
            requested_range,
            mode: SessionKind::parse(&self.mode)?,
            location: self.location,
            proposed_price: self.proposed_price,
            message: self.message,
            status: RequestStatus::parse(&self.status)?,
            tutor_response: self.tutor_response,
            decline_reason: self.decline_reason,
            responded_at: self.responded_at,
            expires_at: self.expires_at,
            session_id: self.session_id,
            created_at: self.created_at,
        })
    }
}

const REQUEST_COLUMNS: &str = "id, student_id, tutor_id, subject, title, description, \
     requested_start, requested_end, mode, location, proposed_price, message, status, \
     tutor_response, decline_reason, responded_at, expires_at, session_id, created_at";

#[derive(FromRow)]
struct PaymentRecord {
    id: Uuid,
    session_id: Uuid,
    payer_id: Uuid,
    payee_id: Uuid,
    amount: f64,
    currency: String,
    platform_fee: f64,
    tutor_amount: f64,
    status: String,
    mode: String,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    payment_method: Option<String>,
    authorized_at: Option<DateTime<Utc>>,
    captured_at: Option<DateTime<Utc>>,
    refund_reason: Option<String>,
    refund_amount: Option<f64>,
    refund_initiated_by: Option<Uuid>,
    refund_initiated_at: Option<DateTime<Utc>>,
    gateway_refund_id: Option<String>,
    error_message: Option<String>,
    error_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    fn to_domain(self) -> DomainResult<Payment> {
        let refund = match (self.refund_amount, self.refund_initiated_by, self.refund_initiated_at)
        {
            (Some(amount), Some(initiated_by), Some(initiated_at)) => Some(RefundInfo {
                reason: self.refund_reason.clone(),
                amount,
                initiated_by,
                initiated_at,
                gateway_refund_id: self.gateway_refund_id.clone(),
            }),
            _ => None,
        };
        let error = self.error_message.clone().map(|message| PaymentFailure {
            message,
            code: self.error_code.clone(),
        });
        Ok(Payment {
            id: self.id,
            session_id: self.session_id,
            payer_id: self.payer_id,
            payee_id: self.payee_id,
            amount: self.amount,
            currency: self.currency,
            platform_fee: self.platform_fee,
            tutor_amount: self.tutor_amount,
            status: PaymentStatus::parse(&self.status)?,
            mode: PaymentMode::parse(&self.mode)?,
            gateway_order_id: self.gateway_order_id,
            gateway_payment_id: self.gateway_payment_id,
            payment_method: self.payment_method,
            authorized_at: self.authorized_at,
            captured_at: self.captured_at,
            refund,
            error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const PAYMENT_COLUMNS: &str = "id, session_id, payer_id, payee_id, amount, currency, \
     platform_fee, tutor_amount, status, mode, gateway_order_id, gateway_payment_id, \
     payment_method, authorized_at, captured_at, refund_reason, refund_amount, \
     refund_initiated_by, refund_initiated_at, gateway_refund_id, error_message, error_code, \
     created_at, updated_at";

#[derive(FromRow)]
struct TutorProfileRecord {
    user_id: Uuid,
    display_name: String,
    hourly_rate: f64,
    subjects: Vec<String>,
    verified: bool,
}

impl TutorProfileRecord {
    fn to_domain(self) -> TutorProfile {
        TutorProfile {
            user_id: self.user_id,
            display_name: self.display_name,
            hourly_rate: self.hourly_rate,
            subjects: self.subjects,
            verified: self.verified,
        }
    }
}

#[derive(FromRow)]
struct StudentProfileRecord {
    user_id: Uuid,
    display_name: String,
}

impl StudentProfileRecord {
    fn to_domain(self) -> StudentProfile {
        StudentProfile {
            user_id: self.user_id,
            display_name: self.display_name,
        }
    }
}

//=========================================================================================
// Bind helpers
//=========================================================================================

/// Binds every session column, in `SESSION_COLUMNS` order, onto a query.
fn bind_session<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    s: &'q Session,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    let completion = s.completion_request.as_ref();
    let room = s.meeting_room.as_ref();
    query
        .bind(s.id)
        .bind(&s.title)
        .bind(s.tutor_id)
        .bind(s.student_id)
        .bind(&s.subject)
        .bind(&s.description)
        .bind(s.range.start)
        .bind(s.range.end)
        .bind(s.status.as_str())
        .bind(s.mode.as_str())
        .bind(&s.location)
        .bind(s.price)
        .bind(s.payment_status.map(|p| p.as_str()))
        .bind(s.rating.map(|r| r as i16))
        .bind(&s.review)
        .bind(s.reviewed_at)
        .bind(&s.notes)
        .bind(&s.cancel_reason)
        .bind(s.cancelled_at)
        .bind(s.cancelled_by)
        .bind(completion.map(|c| c.requested_at))
        .bind(completion.map(|c| c.requested_by))
        .bind(completion.and_then(|c| c.notes.clone()))
        .bind(completion.and_then(|c| c.responded_at))
        .bind(completion.and_then(|c| c.responded_by))
        .bind(completion.and_then(|c| c.approved))
        .bind(completion.and_then(|c| c.rejection_reason.clone()))
        .bind(s.completed_at)
        .bind(&s.completion_notes)
        .bind(&s.reschedule_reason)
        .bind(s.rescheduled_at)
        .bind(room.map(|r| r.room_id.clone()))
        .bind(room.map(|r| r.room_url.clone()))
        .bind(room.map(|r| r.is_active))
        .bind(room.and_then(|r| r.started_at))
        .bind(room.and_then(|r| r.started_by))
        .bind(room.and_then(|r| r.ended_at))
        .bind(s.created_at)
}

const SESSION_INSERT: &str = "INSERT INTO sessions (id, title, tutor_id, student_id, subject, \
     description, start_time, end_time, status, mode, location, price, payment_status, rating, \
     review, reviewed_at, notes, cancel_reason, cancelled_at, cancelled_by, \
     completion_requested_at, completion_requested_by, completion_request_notes, \
     completion_responded_at, completion_responded_by, completion_approved, \
     completion_rejection_reason, completed_at, completion_notes, reschedule_reason, \
     rescheduled_at, meeting_room_id, meeting_room_url, meeting_room_active, \
     meeting_room_started_at, meeting_room_started_by, meeting_room_ended_at, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
     $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34, $35, $36, \
     $37, $38)";

const SESSION_UPDATE: &str = "UPDATE sessions SET title = $2, tutor_id = $3, student_id = $4, \
     subject = $5, description = $6, start_time = $7, end_time = $8, status = $9, mode = $10, \
     location = $11, price = $12, payment_status = $13, rating = $14, review = $15, \
     reviewed_at = $16, notes = $17, cancel_reason = $18, cancelled_at = $19, cancelled_by = $20, \
     completion_requested_at = $21, completion_requested_by = $22, \
     completion_request_notes = $23, completion_responded_at = $24, \
     completion_responded_by = $25, completion_approved = $26, \
     completion_rejection_reason = $27, completed_at = $28, completion_notes = $29, \
     reschedule_reason = $30, rescheduled_at = $31, meeting_room_id = $32, \
     meeting_room_url = $33, meeting_room_active = $34, meeting_room_started_at = $35, \
     meeting_room_started_by = $36, meeting_room_ended_at = $37, created_at = $38 WHERE id = $1";

//=========================================================================================
// `SessionRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionRepository for DbAdapter {
    async fn insert(&self, session: &Session) -> DomainResult<()> {
        bind_session(sqlx::query(SESSION_INSERT), session)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_storage(e, format!("session {id}")))?;
        record.to_domain()
    }

    async fn update(&self, session: &Session) -> DomainResult<()> {
        let result = bind_session(sqlx::query(SESSION_UPDATE), session)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("session {}", session.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn list_for_party(
        &self,
        party_id: Uuid,
        role: PartyRole,
        statuses: &[SessionStatus],
    ) -> DomainResult<Vec<Session>> {
        let column = match role {
            PartyRole::Tutor => "tutor_id",
            PartyRole::Student => "student_id",
        };
        let status_strings: Vec<String> =
            statuses.iter().map(|s| s.as_str().to_string()).collect();
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE {column} = $1 AND status = ANY($2)"
        ))
        .bind(party_id)
        .bind(&status_strings)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_for_student(&self, student_id: Uuid) -> DomainResult<Vec<Session>> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE student_id = $1 ORDER BY start_time"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_for_tutor(&self, tutor_id: Uuid) -> DomainResult<Vec<Session>> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE tutor_id = $1 ORDER BY start_time"
        ))
        .bind(tutor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

//=========================================================================================
// `SessionRequestRepository` Trait Implementation
//=========================================================================================

const REQUEST_INSERT: &str = "INSERT INTO session_requests (id, student_id, tutor_id, subject, \
     title, description, requested_start, requested_end, mode, location, proposed_price, \
     message, status, tutor_response, decline_reason, responded_at, expires_at, session_id, \
     created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
     $17, $18, $19)";

const REQUEST_UPDATE: &str = "UPDATE session_requests SET status = $2, tutor_response = $3, \
     decline_reason = $4, responded_at = $5, session_id = $6 WHERE id = $1";

fn bind_request<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    r: &'q SessionRequest,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(r.id)
        .bind(r.student_id)
        .bind(r.tutor_id)
        .bind(&r.subject)
        .bind(&r.title)
        .bind(&r.description)
        .bind(r.requested_range.start)
        .bind(r.requested_range.end)
        .bind(r.mode.as_str())
        .bind(&r.location)
        .bind(r.proposed_price)
        .bind(&r.message)
        .bind(r.status.as_str())
        .bind(&r.tutor_response)
        .bind(&r.decline_reason)
        .bind(r.responded_at)
        .bind(r.expires_at)
        .bind(r.session_id)
        .bind(r.created_at)
}

#[async_trait]
impl SessionRequestRepository for DbAdapter {
    async fn insert(&self, request: &SessionRequest) -> DomainResult<()> {
        bind_request(sqlx::query(REQUEST_INSERT), request)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<SessionRequest> {
        let record = sqlx::query_as::<_, SessionRequestRecord>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM session_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_storage(e, format!("session request {id}")))?;
        record.to_domain()
    }

    async fn update(&self, request: &SessionRequest) -> DomainResult<()> {
        let result = sqlx::query(REQUEST_UPDATE)
            .bind(request.id)
            .bind(request.status.as_str())
            .bind(&request.tutor_response)
            .bind(&request.decline_reason)
            .bind(request.responded_at)
            .bind(request.session_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!(
                "session request {}",
                request.id
            )));
        }
        Ok(())
    }

    async fn list_for_student(&self, student_id: Uuid) -> DomainResult<Vec<SessionRequest>> {
        let records = sqlx::query_as::<_, SessionRequestRecord>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM session_requests WHERE student_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_for_tutor(&self, tutor_id: Uuid) -> DomainResult<Vec<SessionRequest>> {
        let records = sqlx::query_as::<_, SessionRequestRecord>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM session_requests WHERE tutor_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(tutor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn find_pending_near(
        &self,
        student_id: Uuid,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        window_minutes: i64,
    ) -> DomainResult<Vec<SessionRequest>> {
        let lo = start - Duration::minutes(window_minutes);
        let hi = start + Duration::minutes(window_minutes);
        // Expired pending requests are inert and must not block a new one.
        let records = sqlx::query_as::<_, SessionRequestRecord>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM session_requests WHERE student_id = $1 \
             AND tutor_id = $2 AND status = 'pending' AND expires_at > NOW() \
             AND requested_start BETWEEN $3 AND $4"
        ))
        .bind(student_id)
        .bind(tutor_id)
        .bind(lo)
        .bind(hi)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn accept_with_session(
        &self,
        request: &SessionRequest,
        session: &Session,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        bind_session(sqlx::query(SESSION_INSERT), session)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query(REQUEST_UPDATE)
            .bind(request.id)
            .bind(request.status.as_str())
            .bind(&request.tutor_response)
            .bind(&request.decline_reason)
            .bind(request.responded_at)
            .bind(request.session_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

//=========================================================================================
// `PaymentRepository` Trait Implementation
//=========================================================================================

const PAYMENT_INSERT: &str = "INSERT INTO payments (id, session_id, payer_id, payee_id, amount, \
     currency, platform_fee, tutor_amount, status, mode, gateway_order_id, gateway_payment_id, \
     payment_method, authorized_at, captured_at, refund_reason, refund_amount, \
     refund_initiated_by, refund_initiated_at, gateway_refund_id, error_message, error_code, \
     created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
     $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)";

const PAYMENT_UPDATE: &str = "UPDATE payments SET status = $2, gateway_order_id = $3, \
     gateway_payment_id = $4, payment_method = $5, authorized_at = $6, captured_at = $7, \
     refund_reason = $8, refund_amount = $9, refund_initiated_by = $10, \
     refund_initiated_at = $11, gateway_refund_id = $12, error_message = $13, error_code = $14, \
     updated_at = $15 WHERE id = $1";

#[async_trait]
impl PaymentRepository for DbAdapter {
    async fn insert(&self, payment: &Payment) -> DomainResult<()> {
        let refund = payment.refund.as_ref();
        let error = payment.error.as_ref();
        sqlx::query(PAYMENT_INSERT)
            .bind(payment.id)
            .bind(payment.session_id)
            .bind(payment.payer_id)
            .bind(payment.payee_id)
            .bind(payment.amount)
            .bind(&payment.currency)
            .bind(payment.platform_fee)
            .bind(payment.tutor_amount)
            .bind(payment.status.as_str())
            .bind(payment.mode.as_str())
            .bind(&payment.gateway_order_id)
            .bind(&payment.gateway_payment_id)
            .bind(&payment.payment_method)
            .bind(payment.authorized_at)
            .bind(payment.captured_at)
            .bind(refund.and_then(|r| r.reason.clone()))
            .bind(refund.map(|r| r.amount))
            .bind(refund.map(|r| r.initiated_by))
            .bind(refund.map(|r| r.initiated_at))
            .bind(refund.and_then(|r| r.gateway_refund_id.clone()))
            .bind(error.map(|e| e.message.clone()))
            .bind(error.and_then(|e| e.code.clone()))
            .bind(payment.created_at)
            .bind(payment.updated_at)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Payment> {
        let record = sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_storage(e, format!("payment {id}")))?;
        record.to_domain()
    }

    async fn update(&self, payment: &Payment) -> DomainResult<()> {
        let refund = payment.refund.as_ref();
        let error = payment.error.as_ref();
        let result = sqlx::query(PAYMENT_UPDATE)
            .bind(payment.id)
            .bind(payment.status.as_str())
            .bind(&payment.gateway_order_id)
            .bind(&payment.gateway_payment_id)
            .bind(&payment.payment_method)
            .bind(payment.authorized_at)
            .bind(payment.captured_at)
            .bind(refund.and_then(|r| r.reason.clone()))
            .bind(refund.map(|r| r.amount))
            .bind(refund.map(|r| r.initiated_by))
            .bind(refund.map(|r| r.initiated_at))
            .bind(refund.and_then(|r| r.gateway_refund_id.clone()))
            .bind(error.map(|e| e.message.clone()))
            .bind(error.and_then(|e| e.code.clone()))
            .bind(payment.updated_at)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("payment {}", payment.id)));
        }
        Ok(())
    }

    async fn find_by_session(&self, session_id: Uuid) -> DomainResult<Option<Payment>> {
        // Prefer the latest non-failed entry; fall back to a failed one so a
        // declined attempt is still visible.
        let record = sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE session_id = $1 \
             ORDER BY (status = 'failed') ASC, created_at DESC LIMIT 1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        record.map(|r| r.to_domain()).transpose()
    }

    async fn find_by_order_id(&self, order_id: &str) -> DomainResult<Option<Payment>> {
        let record = sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE gateway_order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        record.map(|r| r.to_domain()).transpose()
    }
}

//=========================================================================================
// `ProfileRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProfileRepository for DbAdapter {
    async fn get_tutor(&self, user_id: Uuid) -> DomainResult<TutorProfile> {
        let record = sqlx::query_as::<_, TutorProfileRecord>(
            "SELECT user_id, display_name, hourly_rate, subjects, verified \
             FROM tutor_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_storage(e, format!("tutor profile {user_id}")))?;
        Ok(record.to_domain())
    }

    async fn get_student(&self, user_id: Uuid) -> DomainResult<StudentProfile> {
        let record = sqlx::query_as::<_, StudentProfileRecord>(
            "SELECT user_id, display_name FROM student_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_storage(e, format!("student profile {user_id}")))?;
        Ok(record.to_domain())
    }
}
