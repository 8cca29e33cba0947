pub mod booking;
pub mod conflict;
pub mod domain;
pub mod error;
pub mod payment;
pub mod ports;
pub mod pricing;
pub mod session;
pub mod session_request;

#[cfg(test)]
pub mod testsupport;

pub use booking::{
    AvailabilityReport, BookSessionInput, BookingOrchestrator, CancelOutcome, CompletionOutcome,
    RequestSessionInput,
};
pub use conflict::ConflictChecker;
pub use domain::{
    Actor, PartyRole, Payment, PaymentMode, PaymentStatus, RequestStatus, Session, SessionKind,
    SessionRequest, SessionStatus, SessionSummary, StudentProfile, TimeRange, TutorProfile,
};
pub use error::{DomainError, DomainResult};
pub use payment::{PaymentService, WebhookEvent, WebhookPayload};
pub use ports::{
    AuthService, NotificationEvent, Notifier, PaymentGateway, PaymentRepository,
    ProfileRepository, SessionRepository, SessionRequestRepository,
};
