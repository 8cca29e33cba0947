pub mod middleware;
pub mod payments;
pub mod protocol;
pub mod rest;
pub mod session_requests;
pub mod sessions;
pub mod state;

// Re-export the pieces the binary needs to build the router.
pub use middleware::require_auth;
pub use rest::ApiDoc;
pub use state::AppState;
