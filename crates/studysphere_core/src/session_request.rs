//! crates/studysphere_core/src/session_request.rs
//!
//! The session-request state machine: pending -> exactly one of
//! {accepted, declined, cancelled}. A pending request past its expiry is
//! inert even if the store has not reaped it yet, so every transition
//! re-validates non-expiry.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    request_expiry, Actor, RequestStatus, SessionKind, SessionRequest, TimeRange,
};
use crate::error::{DomainError, DomainResult};

pub struct NewSessionRequest {
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
}

impl SessionRequest {
    pub fn create(input: NewSessionRequest, now: DateTime<Utc>) -> DomainResult<SessionRequest> {
        if input.requested_range.start <= now {
            return Err(DomainError::Validation(
                "requested start time must be in the future".to_string(),
            ));
        }
        if input.mode == SessionKind::Offline && input.location.is_none() {
            return Err(DomainError::Validation(
                "location is required for offline sessions".to_string(),
            ));
        }
        if input.proposed_price <= 0.0 {
            return Err(DomainError::Validation(
                "proposed price must be positive".to_string(),
            ));
        }
        Ok(SessionRequest {
            id: Uuid::new_v4(),
            student_id: input.student_id,
            tutor_id: input.tutor_id,
            subject: input.subject,
            title: input.title,
            description: input.description,
            requested_range: input.requested_range,
            mode: input.mode,
            location: input.location,
            proposed_price: input.proposed_price,
            message: input.message,
            status: RequestStatus::Pending,
            tutor_response: None,
            decline_reason: None,
            responded_at: None,
            expires_at: request_expiry(now),
            session_id: None,
            created_at: now,
        })
    }

    /// Marks the request accepted and links the created session. The
    /// orchestrator persists the session and this record atomically.
    pub fn accept(
        &mut self,
        actor: Actor,
        session_id: Uuid,
        response: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.require_owning_tutor(actor, "accept")?;
        self.require_open(now)?;

        self.status = RequestStatus::Accepted;
        self.session_id = Some(session_id);
        self.tutor_response = response;
        self.responded_at = Some(now);
        Ok(())
    }

    pub fn decline(&mut self, actor: Actor, reason: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.require_owning_tutor(actor, "decline")?;
        self.require_open(now)?;
        if reason.trim().is_empty() {
            return Err(DomainError::Validation(
                "a decline reason is required".to_string(),
            ));
        }

        self.status = RequestStatus::Declined;
        self.decline_reason = Some(reason.to_string());
        self.responded_at = Some(now);
        Ok(())
    }

    /// Student withdraws a pending request. No cascade: no session exists yet.
    pub fn cancel(&mut self, actor: Actor, now: DateTime<Utc>) -> DomainResult<()> {
        match actor {
            Actor::Student(id) if id == self.student_id => {}
            Actor::Student(_) => {
                return Err(DomainError::Authorization(
                    "request belongs to a different student".to_string(),
                ))
            }
            _ => {
                return Err(DomainError::Authorization(
                    "only the requesting student can cancel".to_string(),
                ))
            }
        }
        self.require_open(now)?;

        self.status = RequestStatus::Cancelled;
        self.responded_at = Some(now);
        Ok(())
    }

    pub(crate) fn require_owning_tutor(&self, actor: Actor, action: &str) -> DomainResult<()> {
        match actor {
            Actor::Tutor(id) if id == self.tutor_id => Ok(()),
            Actor::Tutor(_) => Err(DomainError::Authorization(format!(
                "request is addressed to a different tutor; cannot {action}"
            ))),
            _ => Err(DomainError::Authorization(format!(
                "only the tutor can {action} a request"
            ))),
        }
    }

    pub(crate) fn require_open(&self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != RequestStatus::Pending {
            return Err(DomainError::State {
                current: self.status.as_str().to_string(),
                required: "pending".to_string(),
            });
        }
        if self.is_expired(now) {
            return Err(DomainError::State {
                current: "expired".to_string(),
                required: "pending".to_string(),
            });
        }
        Ok(())
    }
}
