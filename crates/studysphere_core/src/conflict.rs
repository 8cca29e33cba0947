//! crates/studysphere_core/src/conflict.rs
//!
//! Conflict detection: fetches a party's active sessions and tests each
//! against a candidate range with the half-open overlap rule. Runs at the
//! moment of commitment (create / accept / reschedule), not only at proposal
//! time, because time elapses between the two.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{PartyRole, SessionStatus, SessionSummary, TimeRange};
use crate::error::{DomainError, DomainResult};
use crate::ports::SessionRepository;

#[derive(Clone)]
pub struct ConflictChecker {
    sessions: Arc<dyn SessionRepository>,
}

impl ConflictChecker {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions }
    }

    /// All active sessions of `party_id` (on the given side) overlapping
    /// `candidate`, excluding `exclude` so a reschedule does not conflict
    /// with itself.
    pub async fn find_conflicts(
        &self,
        party_id: Uuid,
        role: PartyRole,
        candidate: &TimeRange,
        exclude: Option<Uuid>,
    ) -> DomainResult<Vec<SessionSummary>> {
        let active = self
            .sessions
            .list_for_party(party_id, role, &SessionStatus::ACTIVE)
            .await?;

        Ok(active
            .iter()
            .filter(|s| Some(s.id) != exclude)
            .filter(|s| s.range.overlaps(candidate))
            .map(SessionSummary::from)
            .collect())
    }

    /// Returns `Conflict` carrying the overlapping session summaries when the
    /// candidate range is not free for the party.
    pub async fn ensure_free(
        &self,
        party_id: Uuid,
        role: PartyRole,
        candidate: &TimeRange,
        exclude: Option<Uuid>,
    ) -> DomainResult<()> {
        let conflicts = self
            .find_conflicts(party_id, role, candidate, exclude)
            .await?;
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Conflict { conflicts })
        }
    }

    /// Display-only availability: filters candidate slots down to those that
    /// are in the future and free for the tutor.
    pub async fn available_slots(
        &self,
        tutor_id: Uuid,
        candidates: Vec<TimeRange>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<TimeRange>> {
        let active = self
            .sessions
            .list_for_party(tutor_id, PartyRole::Tutor, &SessionStatus::ACTIVE)
            .await?;

        Ok(candidates
            .into_iter()
            .filter(|slot| slot.start > now)
            .filter(|slot| !active.iter().any(|s| s.range.overlaps(slot)))
            .collect())
    }
}
