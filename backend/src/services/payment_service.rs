use crate::error::{AppError, AppResult, RepositoryError};
use crate::gateway::{self, CallbackPayload, CheckoutRequest, PaymentGateway};
use crate::models::{NotificationKind, Payment, PaymentMethod, PaymentStatus, User};
use crate::repositories::{
    KametiMemberRepository, KametiRepository, NewNotification, PaymentRepository,
};
use crate::services::access::{load_kameti, require_kameti_admin, require_member};
use crate::services::{AuditTrailService, NotificationService, PayoutService};
use crate::uploads::UploadStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A freshly created payment and, for gateway payments, where to send the payer
#[derive(Debug, Clone, Serialize)]
pub struct InitiatedPayment {
    pub payment: Payment,
    pub redirect_url: Option<String>,
}

/// Gateway settings the payment flow needs
#[derive(Clone)]
pub struct GatewaySettings {
    pub gateway: Arc<dyn PaymentGateway>,
    pub secret: String,
    pub return_url: String,
}

/// Result of trying to settle one payment
enum Completion {
    Completed(Payment),
    /// The round was already paid by another payment; this one was failed
    Superseded(Payment),
    /// The payment had already left pending / awaiting_confirmation
    Stale,
}

/// Contributions: gateway checkout, signed callbacks and manual receipts
pub struct PaymentService {
    kameti_repo: Arc<KametiRepository>,
    member_repo: Arc<KametiMemberRepository>,
    payment_repo: Arc<PaymentRepository>,
    gateway: GatewaySettings,
    uploads: UploadStore,
    notifications: Arc<NotificationService>,
    audit: Arc<AuditTrailService>,
    payouts: Arc<PayoutService>,
    auto_release: bool,
}

impl PaymentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kameti_repo: Arc<KametiRepository>,
        member_repo: Arc<KametiMemberRepository>,
        payment_repo: Arc<PaymentRepository>,
        gateway: GatewaySettings,
        uploads: UploadStore,
        notifications: Arc<NotificationService>,
        audit: Arc<AuditTrailService>,
        payouts: Arc<PayoutService>,
        auto_release: bool,
    ) -> Self {
        Self {
            kameti_repo,
            member_repo,
            payment_repo,
            gateway,
            uploads,
            notifications,
            audit,
            payouts,
            auto_release,
        }
    }

    /// Start paying the current round's contribution
    pub async fn initiate(
        &self,
        kameti_id: Uuid,
        user: &User,
        method: PaymentMethod,
    ) -> AppResult<InitiatedPayment> {
        let kameti = load_kameti(&self.kameti_repo, kameti_id).await?;
        if !self.member_repo.is_member(kameti_id, user.id).await? {
            return Err(AppError::Forbidden("You are not a member of this kameti".to_string()));
        }
        if !kameti.is_active() {
            return Err(AppError::BusinessLogic(format!(
                "Kameti is {}, contributions are only taken while it is active",
                kameti.status
            )));
        }

        let round = kameti.current_round;
        if self.payment_repo.has_completed(kameti_id, user.id, round).await? {
            return Err(AppError::Conflict(format!(
                "You have already paid for round {}",
                round
            )));
        }

        let payment = self
            .payment_repo
            .create(kameti_id, user.id, round, kameti.contribution_amount, method)
            .await?;

        if method == PaymentMethod::Manual {
            info!("Manual payment {} created for round {} of {}", payment.id, round, kameti_id);
            return Ok(InitiatedPayment {
                payment,
                redirect_url: None,
            });
        }

        let request = CheckoutRequest {
            payment_id: payment.id,
            reference: gateway::new_reference(),
            amount: payment.amount,
            description: format!("{} round {} contribution", kameti.name, round),
            return_url: self.gateway.return_url.clone(),
        };

        let session = match self.gateway.gateway.create_checkout(&request).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(fail_err) = self.payment_repo.fail(payment.id).await {
                    warn!("Could not mark payment {} failed: {}", payment.id, fail_err);
                }
                return Err(e);
            }
        };

        let payment = self
            .payment_repo
            .set_gateway_reference(payment.id, &session.reference)
            .await?;

        info!(
            "Payment {} sent to {} checkout {}",
            payment.id,
            self.gateway.gateway.name(),
            session.reference
        );

        Ok(InitiatedPayment {
            payment,
            redirect_url: Some(session.redirect_url),
        })
    }

    /// Apply a signed gateway callback.
    ///
    /// The signature is checked over the raw body before anything is looked up.
    pub async fn handle_callback(&self, body: &[u8], signature: Option<&str>) -> AppResult<Payment> {
        let signature = signature
            .ok_or_else(|| AppError::Unauthorized("Missing gateway signature".to_string()))?;
        if !gateway::verify_signature(&self.gateway.secret, body, signature) {
            warn!("Rejected gateway callback with a bad signature");
            return Err(AppError::Unauthorized("Invalid gateway signature".to_string()));
        }

        let payload: CallbackPayload = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Malformed callback body: {}", e)))?;

        let payment = self
            .payment_repo
            .find_by_reference(&payload.reference)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No payment with reference {}", payload.reference))
            })?;

        if payment.is_completed() {
            return Ok(payment);
        }

        if payload.is_success() && payload.amount == payment.amount {
            return match self.complete_once(&payment).await? {
                Completion::Completed(completed) => {
                    self.on_completed(&completed, None).await;
                    Ok(completed)
                }
                Completion::Superseded(failed) => Ok(failed),
                Completion::Stale => self.load(payment.id).await,
            };
        }

        if payload.is_success() {
            warn!(
                "Callback amount {} does not match payment {} amount {}",
                payload.amount, payment.id, payment.amount
            );
        }

        match self.payment_repo.fail(payment.id).await? {
            Some(failed) => {
                info!("Payment {} failed ({})", failed.id, payload.status);
                Ok(failed)
            }
            None => self.load(payment.id).await,
        }
    }

    /// Store a receipt for the payer's own pending payment
    pub async fn submit_receipt(
        &self,
        payment_id: Uuid,
        user: &User,
        file_name: &str,
        bytes: &[u8],
    ) -> AppResult<Payment> {
        let payment = self.load(payment_id).await?;
        if payment.user_id != user.id {
            return Err(AppError::Forbidden("This is not your payment".to_string()));
        }
        if payment.method_enum() != PaymentMethod::Manual {
            return Err(AppError::BusinessLogic(
                "Receipts can only be attached to manual payments".to_string(),
            ));
        }
        if !matches!(
            payment.status_enum(),
            PaymentStatus::Pending | PaymentStatus::AwaitingConfirmation
        ) {
            return Err(AppError::BusinessLogic(format!(
                "Payment is {}, receipts can only be added while it is pending",
                payment.status
            )));
        }

        let receipt_path = self.uploads.save("receipts", file_name, bytes).await?;
        let updated = self
            .payment_repo
            .attach_receipt(payment_id, &receipt_path)
            .await?
            .ok_or_else(|| AppError::BusinessLogic("Payment is no longer pending".to_string()))?;

        let kameti = load_kameti(&self.kameti_repo, payment.kameti_id).await?;
        let message = format!(
            "{} uploaded a receipt for round {} of {}",
            user.full_name, payment.round, kameti.name
        );
        self.notifications
            .notify_user(
                kameti.admin_id,
                NewNotification {
                    kind: NotificationKind::Payment,
                    title: "Receipt awaiting confirmation",
                    message: &message,
                    reference_id: Some(payment.id),
                },
            )
            .await;

        Ok(updated)
    }

    /// Kameti admin accepts a manual receipt
    pub async fn confirm(&self, payment_id: Uuid, user: &User) -> AppResult<Payment> {
        let payment = self.load_for_review(payment_id, user).await?;

        match self.complete_once(&payment).await? {
            Completion::Completed(completed) => {
                info!("Payment {} confirmed by {}", completed.id, user.id);
                self.on_completed(&completed, Some(user.id)).await;
                Ok(completed)
            }
            Completion::Superseded(_) => Err(AppError::Conflict(format!(
                "Round {} was already paid by another payment; this receipt was marked failed",
                payment.round
            ))),
            Completion::Stale => Err(AppError::BusinessLogic(
                "Payment is no longer awaiting review".to_string(),
            )),
        }
    }

    /// Kameti admin turns down a manual receipt
    pub async fn reject(&self, payment_id: Uuid, user: &User) -> AppResult<Payment> {
        let payment = self.load_for_review(payment_id, user).await?;

        let failed = self
            .payment_repo
            .fail(payment.id)
            .await?
            .ok_or_else(|| AppError::BusinessLogic("Payment is no longer awaiting review".to_string()))?;

        let message = format!(
            "Your receipt for round {} was rejected. Please pay again.",
            failed.round
        );
        self.notifications
            .notify_user(
                failed.user_id,
                NewNotification {
                    kind: NotificationKind::Payment,
                    title: "Receipt rejected",
                    message: &message,
                    reference_id: Some(failed.id),
                },
            )
            .await;

        info!("Payment {} rejected by {}", failed.id, user.id);
        Ok(failed)
    }

    pub async fn list(&self, kameti_id: Uuid, user: &User, round: Option<i32>) -> AppResult<Vec<Payment>> {
        load_kameti(&self.kameti_repo, kameti_id).await?;
        require_member(&self.member_repo, kameti_id, user).await?;
        Ok(self.payment_repo.find_by_kameti(kameti_id, round).await?)
    }

    /// A payment is visible to its payer, the kameti admin and platform admins
    pub async fn get(&self, payment_id: Uuid, user: &User) -> AppResult<Payment> {
        let payment = self.load(payment_id).await?;
        if payment.user_id == user.id || user.is_admin() {
            return Ok(payment);
        }

        let kameti = load_kameti(&self.kameti_repo, payment.kameti_id).await?;
        require_kameti_admin(&kameti, user)?;
        Ok(payment)
    }

    async fn load(&self, payment_id: Uuid) -> AppResult<Payment> {
        self.payment_repo
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))
    }

    async fn load_for_review(&self, payment_id: Uuid, user: &User) -> AppResult<Payment> {
        let payment = self.load(payment_id).await?;
        let kameti = load_kameti(&self.kameti_repo, payment.kameti_id).await?;
        require_kameti_admin(&kameti, user)?;

        if payment.status_enum() != PaymentStatus::AwaitingConfirmation {
            return Err(AppError::BusinessLogic(format!(
                "Payment is {}, only receipts awaiting confirmation can be reviewed",
                payment.status
            )));
        }
        Ok(payment)
    }

    /// Complete `payment` unless its round is already covered for that member.
    ///
    /// Only one completed payment may exist per (kameti, user, round). An extra
    /// one is failed rather than left pending, and the payer is told to ask for
    /// a refund.
    async fn complete_once(&self, payment: &Payment) -> AppResult<Completion> {
        let already_paid = self
            .payment_repo
            .has_completed(payment.kameti_id, payment.user_id, payment.round)
            .await?;

        if !already_paid {
            let now = chrono::Utc::now().naive_utc();
            match self.payment_repo.complete(payment.id, now).await {
                Ok(Some(completed)) => return Ok(Completion::Completed(completed)),
                Ok(None) => return Ok(Completion::Stale),
                // Lost a race with another payment for the same round
                Err(RepositoryError::Duplicate(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            "Payment {} duplicates a completed round {} contribution in kameti {}",
            payment.id, payment.round, payment.kameti_id
        );
        let Some(failed) = self.payment_repo.fail(payment.id).await? else {
            return Ok(Completion::Stale);
        };

        let message = format!(
            "You already paid for round {}. The extra payment of {} was not applied; ask the kameti admin for a refund.",
            failed.round, failed.amount
        );
        self.notifications
            .notify_user(
                failed.user_id,
                NewNotification {
                    kind: NotificationKind::Payment,
                    title: "Duplicate payment",
                    message: &message,
                    reference_id: Some(failed.id),
                },
            )
            .await;

        Ok(Completion::Superseded(failed))
    }

    async fn on_completed(&self, payment: &Payment, confirmed_by: Option<Uuid>) {
        if let Err(e) = self.audit.log_payment_completed(payment, confirmed_by).await {
            warn!("Failed to audit payment {}: {}", payment.id, e);
        }

        let message = format!("Your contribution for round {} has been received", payment.round);
        self.notifications
            .notify_user(
                payment.user_id,
                NewNotification {
                    kind: NotificationKind::Payment,
                    title: "Payment received",
                    message: &message,
                    reference_id: Some(payment.id),
                },
            )
            .await;

        match self.kameti_repo.find_by_id(payment.kameti_id).await {
            Ok(Some(kameti)) if kameti.admin_id != payment.user_id => {
                let message = format!(
                    "A round {} contribution of {} was received for {}",
                    payment.round, payment.amount, kameti.name
                );
                self.notifications
                    .notify_user(
                        kameti.admin_id,
                        NewNotification {
                            kind: NotificationKind::Payment,
                            title: "Contribution received",
                            message: &message,
                            reference_id: Some(payment.id),
                        },
                    )
                    .await;
            }
            Ok(_) => {}
            Err(e) => warn!("Could not load kameti {}: {}", payment.kameti_id, e),
        }

        if self.auto_release {
            if let Err(e) = self.payouts.try_auto_release(payment.kameti_id).await {
                warn!("Auto-release for kameti {} failed: {}", payment.kameti_id, e);
            }
        }
    }
}
