//! services/api/src/adapters/notify.rs
//!
//! Notification adapter. Events are rendered to human-readable lines and
//! handed to a transport; the default transport writes structured log lines,
//! which the dashboard tails in development.

use async_trait::async_trait;
use tracing::info;

use studysphere_core::error::DomainResult;
use studysphere_core::ports::{NotificationEvent, Notifier};

/// Where rendered notification lines go.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn deliver(&self, recipient: uuid::Uuid, line: &str) -> DomainResult<()>;
}

/// Transport that emits each notification as a log line.
pub struct LogTransport;

#[async_trait]
impl MessageTransport for LogTransport {
    async fn deliver(&self, recipient: uuid::Uuid, line: &str) -> DomainResult<()> {
        info!(%recipient, "notification: {line}");
        Ok(())
    }
}

pub struct TransportNotifier<T: MessageTransport> {
    transport: T,
}

impl<T: MessageTransport> TransportNotifier<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: MessageTransport> Notifier for TransportNotifier<T> {
    async fn notify(&self, event: NotificationEvent) -> DomainResult<()> {
        let (recipient, line) = match &event {
            NotificationEvent::SessionBooked {
                session_id,
                tutor_id,
                ..
            } => (
                *tutor_id,
                format!("A new session {session_id} was booked with you"),
            ),
            NotificationEvent::SessionCancelled {
                session_id,
                cancelled_by,
            } => (
                *cancelled_by,
                format!("Session {session_id} was cancelled"),
            ),
            NotificationEvent::SessionRescheduled { session_id } => (
                uuid::Uuid::nil(),
                format!("Session {session_id} was rescheduled"),
            ),
            NotificationEvent::CompletionRequested {
                session_id,
                student_id,
            } => (
                *student_id,
                format!("Your tutor marked session {session_id} as held; please confirm"),
            ),
            NotificationEvent::CompletionApproved {
                session_id,
                tutor_id,
            } => (
                *tutor_id,
                format!("Session {session_id} was confirmed complete"),
            ),
            NotificationEvent::RequestReceived {
                request_id,
                tutor_id,
            } => (
                *tutor_id,
                format!("You received a new session request {request_id}"),
            ),
            NotificationEvent::RequestAccepted {
                request_id,
                session_id,
                student_id,
            } => (
                *student_id,
                format!("Your request {request_id} was accepted as session {session_id}"),
            ),
            NotificationEvent::RequestDeclined {
                request_id,
                student_id,
            } => (
                *student_id,
                format!("Your request {request_id} was declined"),
            ),
            NotificationEvent::PaymentCaptured { session_id, amount } => (
                uuid::Uuid::nil(),
                format!("Payment of {amount} for session {session_id} was captured"),
            ),
            NotificationEvent::PaymentRefunded { session_id, amount } => (
                uuid::Uuid::nil(),
                format!("Payment of {amount} for session {session_id} was refunded"),
            ),
        };
        self.transport.deliver(recipient, &line).await
    }
}
