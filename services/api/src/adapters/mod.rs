pub mod auth;
pub mod db;
pub mod gateway;
pub mod notify;

pub use auth::TokenAuthService;
pub use db::DbAdapter;
pub use gateway::{DevGateway, HttpGateway};
pub use notify::{LogTransport, MessageTransport, TransportNotifier};
