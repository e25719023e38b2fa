//! Payment gateway integration: hosted checkout redirect plus signed callbacks.

pub mod hosted;
pub mod sandbox;

use crate::config::{GatewayConfig, GatewayMode};
use crate::error::AppResult;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

pub use hosted::HostedGateway;
pub use sandbox::SandboxGateway;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the callback signature
pub const SIGNATURE_HEADER: &str = "X-Gateway-Signature";

/// What we ask the gateway to collect
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub payment_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub description: String,
    pub return_url: String,
}

/// Where to send the payer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub reference: String,
    pub redirect_url: String,
}

/// Body the gateway posts back once the payer is done
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub reference: String,
    pub status: String,
    pub amount: Decimal,
}

impl CallbackPayload {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("succeeded")
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a checkout session for one contribution
    async fn create_checkout(&self, request: &CheckoutRequest) -> AppResult<CheckoutSession>;
}

/// Fresh merchant reference for a payment
pub fn new_reference() -> String {
    format!("ekm_{}", Uuid::new_v4().simple())
}

/// Hex HMAC-SHA256 of a payload
pub fn sign(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a callback signature against the raw request body.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    let sig = signature.trim();
    let sig = sig.strip_prefix("sha256=").unwrap_or(sig);
    let sig_bytes = match hex::decode(sig) {
        Ok(b) => b,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// Pick the adapter named by the configuration
pub fn build_gateway(config: &GatewayConfig) -> Arc<dyn PaymentGateway> {
    match config.mode {
        GatewayMode::Sandbox => Arc::new(SandboxGateway::new()),
        GatewayMode::Hosted => Arc::new(HostedGateway::new(
            config.base_url.clone(),
            config.api_key.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"reference":"ekm_1","status":"succeeded","amount":"100.00"}"#;
        let sig = sign("topsecret", body);

        assert_eq!(sig.len(), 64);
        assert!(verify_signature("topsecret", body, &sig));
        assert!(verify_signature("topsecret", body, &format!("sha256={}", sig)));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let body = br#"{"reference":"ekm_1","status":"succeeded","amount":"100.00"}"#;
        let sig = sign("topsecret", body);

        assert!(!verify_signature("othersecret", body, &sig));
        assert!(!verify_signature("topsecret", b"{}", &sig));
        assert!(!verify_signature("topsecret", body, "zz-not-hex"));
        assert!(!verify_signature("", body, &sig));
    }

    #[test]
    fn test_callback_status() {
        let payload: CallbackPayload = serde_json::from_str(
            r#"{"reference":"ekm_1","status":"SUCCEEDED","amount":"250.50"}"#,
        )
        .unwrap();
        assert!(payload.is_success());
        assert_eq!(payload.amount, Decimal::new(25050, 2));

        let failed = CallbackPayload {
            status: "declined".to_string(),
            ..payload
        };
        assert!(!failed.is_success());
    }

    #[test]
    fn test_references_are_unique() {
        let a = new_reference();
        assert!(a.starts_with("ekm_"));
        assert_ne!(a, new_reference());
    }
}
