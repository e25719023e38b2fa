use super::{CheckoutRequest, CheckoutSession, PaymentGateway};
use crate::error::AppResult;
use async_trait::async_trait;
use tracing::debug;

/// Local stand-in that sends the payer straight back to the return URL.
///
/// Completion still has to arrive through a signed callback.
#[derive(Debug, Default, Clone)]
pub struct SandboxGateway;

impl SandboxGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> AppResult<CheckoutSession> {
        let separator = if request.return_url.contains('?') { '&' } else { '?' };
        let redirect_url = format!(
            "{}{}reference={}&payment_id={}",
            request.return_url, separator, request.reference, request.payment_id
        );

        debug!("Sandbox checkout {} for {}", request.reference, request.amount);

        Ok(CheckoutSession {
            reference: request.reference.clone(),
            redirect_url,
        })
    }
}
