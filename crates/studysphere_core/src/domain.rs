//! crates/studysphere_core/src/domain.rs
//!
//! Defines the pure, core data structures for the booking subsystem.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// How long a session request stays open before it self-expires.
pub const REQUEST_TTL_HOURS: i64 = 48;

//=========================================================================================
// TimeRange
//=========================================================================================

/// A half-open [start, end) time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Builds a range, rejecting `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<Self> {
        if start >= end {
            return Err(DomainError::Validation(
                "start time must be before end time".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Half-open overlap test: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_hours(&self) -> f64 {
        let seconds = (self.end - self.start).num_seconds() as f64;
        seconds / 3600.0
    }
}

//=========================================================================================
// Actor
//=========================================================================================

/// The authenticated party performing an action. Each transition pattern-matches
/// on the actor kind instead of comparing role strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Student(Uuid),
    Tutor(Uuid),
    Admin(Uuid),
}

impl Actor {
    pub fn id(&self) -> Uuid {
        match self {
            Actor::Student(id) | Actor::Tutor(id) | Actor::Admin(id) => *id,
        }
    }
}

/// Which side of a booking a conflict query is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyRole {
    Tutor,
    Student,
}

//=========================================================================================
// Session
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Scheduled,
    Rescheduled,
    PendingCompletion,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Statuses that count for conflict detection. A session pending completion
    /// or completed is historical and does not block new bookings.
    pub const ACTIVE: [SessionStatus; 2] = [SessionStatus::Scheduled, SessionStatus::Rescheduled];

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Rescheduled => "rescheduled",
            SessionStatus::PendingCompletion => "pending_completion",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "rescheduled" => Ok(SessionStatus::Rescheduled),
            "pending_completion" => Ok(SessionStatus::PendingCompletion),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(DomainError::Storage(format!(
                "unknown session status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Online,
    Offline,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Online => "online",
            SessionKind::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "online" => Ok(SessionKind::Online),
            "offline" => Ok(SessionKind::Offline),
            other => Err(DomainError::Validation(format!(
                "mode must be 'online' or 'offline', got '{other}'"
            ))),
        }
    }
}

/// A tutor's proposal that the session took place, awaiting student approval.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub requested_at: DateTime<Utc>,
    pub requested_by: Uuid,
    pub notes: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub responded_by: Option<Uuid>,
    pub approved: Option<bool>,
    pub rejection_reason: Option<String>,
}

/// Video-classroom linkage. Data only: room issuance lives outside the core.
#[derive(Debug, Clone)]
pub struct MeetingRoom {
    pub room_id: String,
    pub room_url: String,
    pub is_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub started_by: Option<Uuid>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A confirmed booking between one tutor and one student.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub tutor_id: Uuid,
    pub student_id: Uuid,
    pub subject: String,
    pub description: Option<String>,
    pub range: TimeRange,
    pub status: SessionStatus,
    pub mode: SessionKind,
    pub location: Option<String>,
    /// Fixed at creation time; never recomputed even if the tutor's rate changes.
    pub price: f64,
    pub payment_status: Option<PaymentStatus>,
    pub rating: Option<u8>,
    pub review: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub completion_request: Option<CompletionRequest>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_notes: Option<String>,
    pub reschedule_reason: Option<String>,
    pub rescheduled_at: Option<DateTime<Utc>>,
    pub meeting_room: Option<MeetingRoom>,
    pub created_at: DateTime<Utc>,
}

/// Projection of a session carried inside conflict errors so clients can
/// explain which bookings collided.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub range: TimeRange,
    pub status: SessionStatus,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            title: s.title.clone(),
            range: s.range,
            status: s.status,
        }
    }
}

//=========================================================================================
// SessionRequest
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "declined" => Ok(RequestStatus::Declined),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(DomainError::Storage(format!(
                "unknown request status '{other}'"
            ))),
        }
    }
}

/// A student's proposal to a tutor, prior to a firm booking.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub tutor_id: Uuid,
    pub subject: String,
    pub title: String,
    pub description: Option<String>,
    pub requested_range: TimeRange,
    pub mode: SessionKind,
    pub location: Option<String>,
    pub proposed_price: f64,
    pub message: Option<String>,
    pub status: RequestStatus,
    pub tutor_response: Option<String>,
    pub decline_reason: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    /// Set when the request is accepted and a session is created from it.
    pub session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl SessionRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

pub fn request_expiry(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(REQUEST_TTL_HOURS)
}

//=========================================================================================
// Payment
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Captured,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "authorized" => Ok(PaymentStatus::Authorized),
            "captured" => Ok(PaymentStatus::Captured),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(DomainError::Storage(format!(
                "unknown payment status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    Development,
    Test,
    Live,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Development => "development",
            PaymentMode::Test => "test",
            PaymentMode::Live => "live",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "development" => Ok(PaymentMode::Development),
            "test" => Ok(PaymentMode::Test),
            "live" => Ok(PaymentMode::Live),
            other => Err(DomainError::Validation(format!(
                "payment mode must be development, test or live, got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefundInfo {
    pub reason: Option<String>,
    pub amount: f64,
    pub initiated_by: Uuid,
    pub initiated_at: DateTime<Utc>,
    pub gateway_refund_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentFailure {
    pub message: String,
    pub code: Option<String>,
}

/// A payment ledger entry, 1:1 with a session. At most one non-failed entry
/// exists per session at a time; a failed entry may be superseded by a retry.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub session_id: Uuid,
    pub payer_id: Uuid,
    pub payee_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub platform_fee: f64,
    pub tutor_amount: f64,
    pub status: PaymentStatus,
    pub mode: PaymentMode,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub refund: Option<RefundInfo>,
    pub error: Option<PaymentFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//=========================================================================================
// Profiles
//=========================================================================================

// The booking core only needs narrow projections of the marketplace profiles.

#[derive(Debug, Clone)]
pub struct TutorProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub hourly_rate: f64,
    pub subjects: Vec<String>,
    pub verified: bool,
}

#[derive(Debug, Clone)]
pub struct StudentProfile {
    pub user_id: Uuid,
    pub display_name: String,
}
