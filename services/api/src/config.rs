//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use studysphere_core::PaymentMode;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub payment_mode: PaymentMode,
    pub gateway_base_url: String,
    pub gateway_key_id: Option<String>,
    pub gateway_key_secret: Option<String>,
    pub gateway_webhook_secret: Option<String>,
    pub gateway_timeout_secs: u64,
    pub platform_fee_percent: f64,
    pub currency: String,
    pub auth_token_secret: String,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Payment Gateway Settings ---
        let payment_mode_str =
            std::env::var("PAYMENT_MODE").unwrap_or_else(|_| "development".to_string());
        let payment_mode = PaymentMode::parse(&payment_mode_str).map_err(|e| {
            ConfigError::InvalidValue("PAYMENT_MODE".to_string(), e.to_string())
        })?;

        let gateway_base_url = std::env::var("GATEWAY_BASE_URL")
            .unwrap_or_else(|_| "https://api.gateway.example".to_string());
        let gateway_key_id = std::env::var("GATEWAY_KEY_ID").ok();
        let gateway_key_secret = std::env::var("GATEWAY_KEY_SECRET").ok();
        let gateway_webhook_secret = std::env::var("GATEWAY_WEBHOOK_SECRET").ok();

        // Gateway credentials are only optional while auto-succeeding in
        // development mode.
        if payment_mode != PaymentMode::Development {
            if gateway_key_id.is_none() {
                return Err(ConfigError::MissingVar("GATEWAY_KEY_ID".to_string()));
            }
            if gateway_key_secret.is_none() {
                return Err(ConfigError::MissingVar("GATEWAY_KEY_SECRET".to_string()));
            }
        }

        let gateway_timeout_secs = match std::env::var("GATEWAY_TIMEOUT_SECS") {
            Ok(v) => v.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("GATEWAY_TIMEOUT_SECS".to_string(), e.to_string())
            })?,
            Err(_) => 10,
        };

        let platform_fee_percent = match std::env::var("PLATFORM_FEE_PERCENT") {
            Ok(v) => v.parse::<f64>().map_err(|e| {
                ConfigError::InvalidValue("PLATFORM_FEE_PERCENT".to_string(), e.to_string())
            })?,
            Err(_) => 10.0,
        };
        let currency = std::env::var("CURRENCY").unwrap_or_else(|_| "USD".to_string());

        let auth_token_secret = std::env::var("AUTH_TOKEN_SECRET")
            .map_err(|_| ConfigError::MissingVar("AUTH_TOKEN_SECRET".to_string()))?;

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            payment_mode,
            gateway_base_url,
            gateway_key_id,
            gateway_key_secret,
            gateway_webhook_secret,
            gateway_timeout_secs,
            platform_fee_percent,
            currency,
            auth_token_secret,
            cors_origin,
        })
    }
}
