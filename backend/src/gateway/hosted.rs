use super::{CheckoutRequest, CheckoutSession, PaymentGateway};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info};

/// Hosted checkout reached over HTTPS
pub struct HostedGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HostedGateway {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn checkout_url(&self) -> String {
        format!("{}/v1/checkout", self.base_url)
    }
}

#[async_trait]
impl PaymentGateway for HostedGateway {
    fn name(&self) -> &'static str {
        "hosted"
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> AppResult<CheckoutSession> {
        let body = serde_json::json!({
            "reference": request.reference,
            "amount": request.amount.to_string(),
            "description": request.description,
            "return_url": request.return_url,
            "metadata": { "payment_id": request.payment_id.to_string() },
        });

        let resp = self
            .client
            .post(self.checkout_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gateway request failed: {}", e);
                AppError::ExternalService(format!("Gateway unreachable: {}", e))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!("Gateway rejected checkout {}: {} {}", request.reference, status, text);
            return Err(AppError::ExternalService(format!(
                "Gateway returned {}",
                status
            )));
        }

        let session: CheckoutSession = resp.json().await.map_err(|e| {
            AppError::ExternalService(format!("Malformed gateway response: {}", e))
        })?;

        info!("Opened hosted checkout {}", session.reference);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_url() {
        let gateway = HostedGateway::new("https://pay.example.com".to_string(), "key".to_string());
        assert_eq!(gateway.checkout_url(), "https://pay.example.com/v1/checkout");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_external_error() {
        // Port 9 (discard) on localhost is not expected to speak HTTP
        let gateway = HostedGateway::new("http://127.0.0.1:9".to_string(), "key".to_string());
        let request = CheckoutRequest {
            payment_id: uuid::Uuid::new_v4(),
            reference: "ekm_x".to_string(),
            amount: rust_decimal::Decimal::new(100, 0),
            description: "Round 1".to_string(),
            return_url: "http://localhost/return".to_string(),
        };

        let err = gateway.create_checkout(&request).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
    }
}
