use crate::error::{AppError, AppResult};
use crate::models::{Kameti, NotificationKind, Payout, User};
use crate::repositories::{
    KametiMemberRepository, KametiRepository, NewNotification, PayoutRepository, ReleaseOutcome,
};
use crate::rotation::{PayoutReadiness, RoundAdvance};
use crate::services::access::{load_kameti, require_kameti_admin, require_member};
use crate::services::{AuditTrailService, NotificationService};
use crate::websocket::WebSocketServer;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Releases round payouts and moves the rotation forward
pub struct PayoutService {
    kameti_repo: Arc<KametiRepository>,
    member_repo: Arc<KametiMemberRepository>,
    payout_repo: Arc<PayoutRepository>,
    notifications: Arc<NotificationService>,
    ws_server: Arc<WebSocketServer>,
    audit: Arc<AuditTrailService>,
}

impl PayoutService {
    pub fn new(
        kameti_repo: Arc<KametiRepository>,
        member_repo: Arc<KametiMemberRepository>,
        payout_repo: Arc<PayoutRepository>,
        notifications: Arc<NotificationService>,
        ws_server: Arc<WebSocketServer>,
        audit: Arc<AuditTrailService>,
    ) -> Self {
        Self {
            kameti_repo,
            member_repo,
            payout_repo,
            notifications,
            ws_server,
            audit,
        }
    }

    /// Admin-triggered release of the current round
    pub async fn release(&self, kameti_id: Uuid, user: &User) -> AppResult<Payout> {
        let kameti = load_kameti(&self.kameti_repo, kameti_id).await?;
        require_kameti_admin(&kameti, user)?;

        match self.payout_repo.release_round(kameti_id, Some(user.id)).await? {
            ReleaseOutcome::Released {
                payout,
                kameti,
                advance,
            } => {
                self.after_release(&payout, &kameti, advance).await;
                Ok(payout)
            }
            ReleaseOutcome::NotReady(readiness) => Err(not_ready_error(&readiness)),
        }
    }

    /// Release without an actor once the last contribution lands.
    ///
    /// Returns `None` when the round is not ready yet.
    pub async fn try_auto_release(&self, kameti_id: Uuid) -> AppResult<Option<Payout>> {
        match self.payout_repo.release_round(kameti_id, None).await? {
            ReleaseOutcome::Released {
                payout,
                kameti,
                advance,
            } => {
                info!("Auto-released round {} of kameti {}", payout.round, kameti_id);
                self.after_release(&payout, &kameti, advance).await;
                Ok(Some(payout))
            }
            ReleaseOutcome::NotReady(readiness) => {
                debug!(
                    "Auto-release skipped for kameti {}: {} outstanding",
                    kameti_id,
                    readiness.outstanding.len()
                );
                Ok(None)
            }
        }
    }

    pub async fn list(&self, kameti_id: Uuid, user: &User) -> AppResult<Vec<Payout>> {
        load_kameti(&self.kameti_repo, kameti_id).await?;
        require_member(&self.member_repo, kameti_id, user).await?;
        Ok(self.payout_repo.find_by_kameti(kameti_id).await?)
    }

    async fn after_release(&self, payout: &Payout, kameti: &Kameti, advance: RoundAdvance) {
        let message = match advance {
            RoundAdvance::Next(next) => format!(
                "Round {} payout of {} has been released. Round {} is now open.",
                payout.round, payout.amount, next
            ),
            RoundAdvance::Completed => format!(
                "Final payout of {} has been released. {} is complete.",
                payout.amount, kameti.name
            ),
        };

        self.notifications
            .notify_kameti(
                kameti.id,
                NewNotification {
                    kind: NotificationKind::Payout,
                    title: "Payout released",
                    message: &message,
                    reference_id: Some(payout.id),
                },
                None,
            )
            .await;

        self.ws_server
            .broadcast_payout_released(kameti.id, payout.round, payout.recipient_id, payout.amount)
            .await;
        self.ws_server
            .broadcast_kameti_updated(kameti.id, &kameti.status, kameti.current_round)
            .await;

        if let Err(e) = self.audit.log_payout_released(payout).await {
            warn!("Failed to audit payout {}: {}", payout.id, e);
        }
    }
}

fn not_ready_error(readiness: &PayoutReadiness) -> AppError {
    if readiness.outstanding.is_empty() {
        return AppError::BusinessLogic(format!(
            "Round {} has no recipient awaiting a payout",
            readiness.round
        ));
    }

    let outstanding: Vec<String> = readiness.outstanding.iter().map(Uuid::to_string).collect();
    AppError::BusinessLogic(format!(
        "Round {} is not ready for payout; waiting on: {}",
        readiness.round,
        outstanding.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_error_lists_outstanding_members() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let readiness = PayoutReadiness {
            round: 2,
            paid: vec![],
            outstanding: vec![a, b],
            recipient: Some(a),
            ready: false,
        };

        let err = not_ready_error(&readiness);
        let message = err.public_message();
        assert!(matches!(err, AppError::BusinessLogic(_)));
        assert!(message.contains(&a.to_string()));
        assert!(message.contains(&b.to_string()));
    }
}
