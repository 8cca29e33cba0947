//! services/api/src/adapters/gateway.rs
//!
//! Payment gateway adapters: an auto-succeeding development gateway and an
//! HTTP gateway for test/live mode with a bounded request timeout.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use studysphere_core::error::{DomainError, DomainResult};
use studysphere_core::ports::{GatewayOrder, GatewayRefund, PaymentGateway};

type HmacSha256 = Hmac<Sha256>;

//=========================================================================================
// Development gateway
//=========================================================================================

/// Auto-succeeds every operation and accepts every signature. Used when
/// PAYMENT_MODE=development so the booking flow can be exercised without
/// gateway credentials.
pub struct DevGateway;

#[async_trait]
impl PaymentGateway for DevGateway {
    async fn create_order(
        &self,
        amount: f64,
        currency: &str,
        receipt: &str,
    ) -> DomainResult<GatewayOrder> {
        debug!(amount, currency, receipt, "dev gateway: order auto-created");
        Ok(GatewayOrder {
            order_id: format!("dev_order_{}", Uuid::new_v4().simple()),
        })
    }

    fn verify_signature(&self, _order_id: &str, _payment_id: &str, _signature: &str) -> bool {
        true
    }

    async fn capture(&self, gateway_payment_id: &str, amount: f64) -> DomainResult<()> {
        debug!(gateway_payment_id, amount, "dev gateway: capture auto-succeeded");
        Ok(())
    }

    async fn refund(&self, gateway_payment_id: &str, amount: f64) -> DomainResult<GatewayRefund> {
        debug!(gateway_payment_id, amount, "dev gateway: refund auto-succeeded");
        Ok(GatewayRefund {
            refund_id: format!("dev_refund_{}", Uuid::new_v4().simple()),
        })
    }
}

//=========================================================================================
// HTTP gateway
//=========================================================================================

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
}

#[derive(Deserialize)]
struct RefundResponse {
    id: String,
}

/// Talks to the real gateway over HTTPS with basic auth. Every call runs
/// under the configured timeout; a timeout surfaces as a gateway error and
/// the caller decides whether the operation was best-effort.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpGateway {
    pub fn new(
        base_url: String,
        key_id: String,
        key_secret: String,
        timeout_secs: u64,
    ) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DomainError::Payment(format!("failed to build gateway client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            key_id,
            key_secret,
        })
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> DomainResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::Gateway(format!("gateway request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DomainError::Gateway(format!(
                "gateway returned {status}: {text}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_order(
        &self,
        amount: f64,
        currency: &str,
        receipt: &str,
    ) -> DomainResult<GatewayOrder> {
        let response = self
            .post_json(
                "/orders",
                serde_json::json!({
                    // The gateway takes amounts in minor units.
                    "amount": (amount * 100.0).round() as i64,
                    "currency": currency,
                    "receipt": receipt,
                }),
            )
            .await?;
        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Gateway(format!("malformed gateway order response: {e}")))?;
        Ok(GatewayOrder { order_id: order.id })
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let payload = format!("{order_id}|{payment_id}");
        let Ok(mut mac) = HmacSha256::new_from_slice(self.key_secret.as_bytes()) else {
            return false;
        };
        mac.update(payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());
        // Length check first keeps the comparison constant-time per length.
        expected.len() == signature.len()
            && expected
                .bytes()
                .zip(signature.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    async fn capture(&self, gateway_payment_id: &str, amount: f64) -> DomainResult<()> {
        self.post_json(
            &format!("/payments/{gateway_payment_id}/capture"),
            serde_json::json!({ "amount": (amount * 100.0).round() as i64 }),
        )
        .await?;
        Ok(())
    }

    async fn refund(&self, gateway_payment_id: &str, amount: f64) -> DomainResult<GatewayRefund> {
        let response = self
            .post_json(
                &format!("/payments/{gateway_payment_id}/refund"),
                serde_json::json!({ "amount": (amount * 100.0).round() as i64 }),
            )
            .await?;
        let refund: RefundResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Gateway(format!("malformed gateway refund response: {e}")))?;
        Ok(GatewayRefund {
            refund_id: refund.id,
        })
    }
}
