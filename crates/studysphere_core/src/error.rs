//! crates/studysphere_core/src/error.rs
//!
//! The single error taxonomy for the booking core. Errors are raised close to
//! the guard that detects them and propagate to the HTTP boundary unchanged;
//! the api service maps each variant to a status code.

use crate::domain::SessionSummary;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Missing or malformed input, bad time ordering. Never retried.
    #[error("{0}")]
    Validation(String),

    /// Tutor, student, session or request does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The caller is not the owning party for the attempted action.
    #[error("{0}")]
    Authorization(String),

    /// An overlapping active session blocks the candidate range. Carries the
    /// conflicting session summaries so a client can explain the failure.
    #[error("the requested time overlaps {} existing session(s)", conflicts.len())]
    Conflict { conflicts: Vec<SessionSummary> },

    /// Guard violation: the record is not in the status the transition requires.
    #[error("invalid state: current status is '{current}', requires '{required}'")]
    State { current: String, required: String },

    /// Payment rule violation or signature mismatch. The caller's fault.
    #[error("payment error: {0}")]
    Payment(String),

    /// The external gateway failed, timed out, or answered garbage. An
    /// upstream failure at the HTTP edge.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// Storage engine failure. Wrapped generically at the HTTP edge.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
