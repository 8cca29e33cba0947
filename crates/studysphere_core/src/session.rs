//! crates/studysphere_core/src/session.rs
//!
//! The session state machine. Each transition is a pure guard-then-mutate
//! method: it checks the acting party and the current status, then applies
//! the change in place. Callers persist the whole record afterwards, so a
//! failed guard leaves the session untouched.
//!
//! States: scheduled -> {rescheduled, pending_completion, cancelled};
//! rescheduled -> {pending_completion, cancelled};
//! pending_completion -> {completed, scheduled (on rejection)};
//! completed and cancelled are terminal.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Actor, CompletionRequest, Session, SessionKind, SessionStatus, TimeRange,
};
use crate::error::{DomainError, DomainResult};

/// Everything needed to build a session record; the price is supplied by the
/// caller (computed once, from the rate or carried over from a request).
pub struct NewSession {
    pub title: String,
    pub tutor_id: Uuid,
    pub student_id: Uuid,
    pub subject: String,
    pub description: Option<String>,
    pub range: TimeRange,
    pub mode: SessionKind,
    pub location: Option<String>,
    pub price: f64,
    pub notes: Option<String>,
}

impl Session {
    pub fn create(input: NewSession, now: DateTime<Utc>) -> DomainResult<Session> {
        if input.range.start <= now {
            return Err(DomainError::Validation(
                "session start time must be in the future".to_string(),
            ));
        }
        if input.mode == SessionKind::Offline && input.location.is_none() {
            return Err(DomainError::Validation(
                "location is required for offline sessions".to_string(),
            ));
        }
        if input.price <= 0.0 {
            return Err(DomainError::Validation(
                "session price must be positive".to_string(),
            ));
        }
        Ok(Session {
            id: Uuid::new_v4(),
            title: input.title,
            tutor_id: input.tutor_id,
            student_id: input.student_id,
            subject: input.subject,
            description: input.description,
            range: input.range,
            status: SessionStatus::Scheduled,
            mode: input.mode,
            location: input.location,
            price: input.price,
            payment_status: None,
            rating: None,
            review: None,
            reviewed_at: None,
            notes: input.notes,
            cancel_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            completion_request: None,
            completed_at: None,
            completion_notes: None,
            reschedule_reason: None,
            rescheduled_at: None,
            meeting_room: None,
            created_at: now,
        })
    }

    /// Tutor proposes that the session took place as scheduled.
    pub fn request_completion(
        &mut self,
        actor: Actor,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let tutor_id = match actor {
            Actor::Tutor(id) => id,
            _ => {
                return Err(DomainError::Authorization(
                    "only the tutor can request completion".to_string(),
                ))
            }
        };
        if tutor_id != self.tutor_id {
            return Err(DomainError::Authorization(
                "session belongs to a different tutor".to_string(),
            ));
        }
        self.require_status(&SessionStatus::ACTIVE)?;

        self.status = SessionStatus::PendingCompletion;
        self.completion_request = Some(CompletionRequest {
            requested_at: now,
            requested_by: tutor_id,
            notes,
            responded_at: None,
            responded_by: None,
            approved: None,
            rejection_reason: None,
        });
        Ok(())
    }

    /// Student confirms the completion request; the session becomes terminal.
    /// Payment capture is the caller's follow-up.
    pub fn approve_completion(&mut self, actor: Actor, now: DateTime<Utc>) -> DomainResult<()> {
        let student_id = self.require_owning_student(actor, "approve completion")?;
        self.require_status(&[SessionStatus::PendingCompletion])?;

        self.status = SessionStatus::Completed;
        self.completed_at = Some(now);
        if let Some(req) = self.completion_request.as_mut() {
            req.responded_at = Some(now);
            req.responded_by = Some(student_id);
            req.approved = Some(true);
        }
        Ok(())
    }

    /// Student disputes the completion request; the session returns to scheduled.
    pub fn reject_completion(
        &mut self,
        actor: Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let student_id = self.require_owning_student(actor, "reject completion")?;
        self.require_status(&[SessionStatus::PendingCompletion])?;

        self.status = SessionStatus::Scheduled;
        if let Some(req) = self.completion_request.as_mut() {
            req.responded_at = Some(now);
            req.responded_by = Some(student_id);
            req.approved = Some(false);
            req.rejection_reason = reason;
        }
        Ok(())
    }

    /// Either owning party may cancel any non-terminal session. The refund is
    /// the caller's best-effort follow-up and never blocks this transition.
    pub fn cancel(
        &mut self,
        actor: Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let by = self.require_owning_party(actor, "cancel")?;
        if self.status.is_terminal() {
            return Err(DomainError::State {
                current: self.status.as_str().to_string(),
                required: "any non-terminal status".to_string(),
            });
        }

        self.status = SessionStatus::Cancelled;
        self.cancel_reason = reason;
        self.cancelled_at = Some(now);
        self.cancelled_by = Some(by);
        Ok(())
    }

    /// Either owning party may move a session to a new slot, once: only a
    /// `scheduled` session can be rescheduled. The conflict check for the new
    /// range (excluding this session) is the orchestrator's job.
    pub fn reschedule(
        &mut self,
        actor: Actor,
        new_range: TimeRange,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.require_owning_party(actor, "reschedule")?;
        self.require_status(&[SessionStatus::Scheduled])?;
        if new_range.start <= now {
            return Err(DomainError::Validation(
                "new start time must be in the future".to_string(),
            ));
        }

        self.range = new_range;
        self.status = SessionStatus::Rescheduled;
        self.reschedule_reason = reason;
        self.rescheduled_at = Some(now);
        Ok(())
    }

    /// Write-once student review of a completed session.
    pub fn submit_review(
        &mut self,
        actor: Actor,
        rating: u8,
        review: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.require_owning_student(actor, "review")?;
        self.require_status(&[SessionStatus::Completed])?;
        if !(1..=5).contains(&rating) {
            return Err(DomainError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }
        if self.rating.is_some() {
            return Err(DomainError::Validation(
                "this session has already been reviewed".to_string(),
            ));
        }

        self.rating = Some(rating);
        self.review = review;
        self.reviewed_at = Some(now);
        Ok(())
    }

    fn require_status(&self, allowed: &[SessionStatus]) -> DomainResult<()> {
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

    fn require_owning_student(&self, actor: Actor, action: &str) -> DomainResult<Uuid> {
        match actor {
            Actor::Student(id) if id == self.student_id => Ok(id),
            Actor::Student(_) => Err(DomainError::Authorization(format!(
                "session belongs to a different student; cannot {action}"
            ))),
            _ => Err(DomainError::Authorization(format!(
                "only the student can {action}"
            ))),
        }
    }

    fn require_owning_party(&self, actor: Actor, action: &str) -> DomainResult<Uuid> {
        match actor {
            Actor::Tutor(id) if id == self.tutor_id => Ok(id),
            Actor::Student(id) if id == self.student_id => Ok(id),
            Actor::Admin(id) => Ok(id),
            _ => Err(DomainError::Authorization(format!(
                "only a party to this session can {action}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 9, 12, 0, 0).unwrap()
    }

    fn range(h: u32, d: u32) -> TimeRange {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, h, 0, 0).unwrap();
        TimeRange::new(start, start + chrono::Duration::hours(d as i64)).unwrap()
    }

    fn session() -> (Session, Uuid, Uuid) {
        let tutor = Uuid::new_v4();
        let student = Uuid::new_v4();
        let s = Session::create(
            NewSession {
                title: "Algebra".to_string(),
                tutor_id: tutor,
                student_id: student,
                subject: "math".to_string(),
                description: None,
                range: range(10, 1),
                mode: SessionKind::Online,
                location: None,
                price: 40.0,
                notes: None,
            },
            now(),
        )
        .unwrap();
        (s, tutor, student)
    }

    #[test]
    fn create_rejects_past_start() {
        let (_, tutor, student) = session();
        let past = TimeRange::new(
            now() - chrono::Duration::hours(2),
            now() - chrono::Duration::hours(1),
        )
        .unwrap();
        let err = Session::create(
            NewSession {
                title: "t".into(),
                tutor_id: tutor,
                student_id: student,
                subject: "math".into(),
                description: None,
                range: past,
                mode: SessionKind::Online,
                location: None,
                price: 40.0,
                notes: None,
            },
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_requires_location_for_offline() {
        let (_, tutor, student) = session();
        let err = Session::create(
            NewSession {
                title: "t".into(),
                tutor_id: tutor,
                student_id: student,
                subject: "math".into(),
                description: None,
                range: range(10, 1),
                mode: SessionKind::Offline,
                location: None,
                price: 40.0,
                notes: None,
            },
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn completion_round_trip() {
        let (mut s, tutor, student) = session();
        s.request_completion(Actor::Tutor(tutor), None, now()).unwrap();
        assert_eq!(s.status, SessionStatus::PendingCompletion);
        s.approve_completion(Actor::Student(student), now()).unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.completed_at.is_some());
        assert_eq!(s.completion_request.unwrap().approved, Some(true));
    }

    #[test]
    fn approve_from_scheduled_is_a_state_error() {
        let (mut s, _, student) = session();
        let err = s.approve_completion(Actor::Student(student), now()).unwrap_err();
        assert!(matches!(err, DomainError::State { .. }));
        assert_eq!(s.status, SessionStatus::Scheduled);
    }

    #[test]
    fn rejection_returns_to_scheduled() {
        let (mut s, tutor, student) = session();
        s.request_completion(Actor::Tutor(tutor), None, now()).unwrap();
        s.reject_completion(Actor::Student(student), Some("did not happen".into()), now())
            .unwrap();
        assert_eq!(s.status, SessionStatus::Scheduled);
        let req = s.completion_request.unwrap();
        assert_eq!(req.approved, Some(false));
        assert_eq!(req.rejection_reason.as_deref(), Some("did not happen"));
    }

    #[test]
    fn only_owning_tutor_requests_completion() {
        let (mut s, _, student) = session();
        assert!(matches!(
            s.request_completion(Actor::Tutor(Uuid::new_v4()), None, now()),
            Err(DomainError::Authorization(_))
        ));
        assert!(matches!(
            s.request_completion(Actor::Student(student), None, now()),
            Err(DomainError::Authorization(_))
        ));
    }

    #[test]
    fn cancel_is_idempotent_guarded() {
        let (mut s, tutor, _) = session();
        s.cancel(Actor::Tutor(tutor), Some("sick".into()), now()).unwrap();
        assert_eq!(s.status, SessionStatus::Cancelled);
        assert_eq!(s.cancelled_by, Some(tutor));
        let err = s.cancel(Actor::Tutor(tutor), None, now()).unwrap_err();
        assert!(matches!(err, DomainError::State { .. }));
    }

    #[test]
    fn second_approve_fails_cleanly() {
        let (mut s, tutor, student) = session();
        s.request_completion(Actor::Tutor(tutor), None, now()).unwrap();
        s.approve_completion(Actor::Student(student), now()).unwrap();
        let err = s.approve_completion(Actor::Student(student), now()).unwrap_err();
        assert!(matches!(err, DomainError::State { .. }));
    }

    #[test]
    fn reschedule_only_from_scheduled() {
        let (mut s, _, student) = session();
        s.reschedule(Actor::Student(student), range(14, 1), None, now())
            .unwrap();
        assert_eq!(s.status, SessionStatus::Rescheduled);
        let err = s
            .reschedule(Actor::Student(student), range(16, 1), None, now())
            .unwrap_err();
        assert!(matches!(err, DomainError::State { .. }));
    }

    #[test]
    fn cancelled_session_cannot_complete() {
        let (mut s, tutor, _) = session();
        s.cancel(Actor::Tutor(tutor), None, now()).unwrap();
        let err = s
            .request_completion(Actor::Tutor(tutor), None, now())
            .unwrap_err();
        assert!(matches!(err, DomainError::State { .. }));
    }

    #[test]
    fn review_is_write_once_and_needs_completion() {
        let (mut s, tutor, student) = session();
        assert!(matches!(
            s.submit_review(Actor::Student(student), 5, None, now()),
            Err(DomainError::State { .. })
        ));

        s.request_completion(Actor::Tutor(tutor), None, now()).unwrap();
        s.approve_completion(Actor::Student(student), now()).unwrap();

        assert!(matches!(
            s.submit_review(Actor::Student(student), 6, None, now()),
            Err(DomainError::Validation(_))
        ));
        s.submit_review(Actor::Student(student), 4, Some("great".into()), now())
            .unwrap();
        let err = s
            .submit_review(Actor::Student(student), 5, None, now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(s.rating, Some(4));
    }
}
