//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use studysphere_core::{AuthService, BookingOrchestrator, PaymentService};

use crate::config::Config;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub payments: Arc<PaymentService>,
    pub auth: Arc<dyn AuthService>,
    pub config: Arc<Config>,
}
