//! crates/studysphere_core/src/pricing.rs
//!
//! Price derivation. A session's price is hourly rate times duration, rounded
//! to the stored numeric precision (2 decimal places) once at creation time.

use crate::domain::TimeRange;
use crate::error::{DomainError, DomainResult};

/// Rounds to 2 decimal places, the precision prices are stored at.
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `hourly_rate x duration_hours`, fixed at creation time.
pub fn session_price(hourly_rate: f64, range: &TimeRange) -> DomainResult<f64> {
    if hourly_rate <= 0.0 {
        return Err(DomainError::Validation(
            "tutor hourly rate must be positive".to_string(),
        ));
    }
    let price = round_money(hourly_rate * range.duration_hours());
    if price <= 0.0 {
        return Err(DomainError::Validation(
            "computed session price must be positive".to_string(),
        ));
    }
    Ok(price)
}

/// Platform fee split, fixed at order-creation time.
/// Returns `(platform_fee, tutor_amount)`.
pub fn fee_split(amount: f64, fee_percent: f64) -> (f64, f64) {
    let fee = round_money(amount * fee_percent / 100.0);
    (fee, round_money(amount - fee))
}
