use crate::error::{AppError, AppResult};
use crate::models::{Dispute, DisputeStatus, NotificationKind, User};
use crate::repositories::{DisputeRepository, KametiMemberRepository, KametiRepository, NewNotification};
use crate::services::access::{load_kameti, require_member};
use crate::services::{AuditTrailService, NotificationService};
use crate::uploads::UploadStore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_SUBJECT_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 5000;

/// A complaint as submitted by a member
#[derive(Debug, Clone)]
pub struct NewDispute<'a> {
    pub respondent_id: Option<Uuid>,
    pub subject: &'a str,
    pub description: &'a str,
}

/// Service for raising and moderating disputes
pub struct DisputeService {
    dispute_repo: Arc<DisputeRepository>,
    kameti_repo: Arc<KametiRepository>,
    member_repo: Arc<KametiMemberRepository>,
    uploads: UploadStore,
    notifications: Arc<NotificationService>,
    audit: Arc<AuditTrailService>,
}

impl DisputeService {
    pub fn new(
        dispute_repo: Arc<DisputeRepository>,
        kameti_repo: Arc<KametiRepository>,
        member_repo: Arc<KametiMemberRepository>,
        uploads: UploadStore,
        notifications: Arc<NotificationService>,
        audit: Arc<AuditTrailService>,
    ) -> Self {
        Self {
            dispute_repo,
            kameti_repo,
            member_repo,
            uploads,
            notifications,
            audit,
        }
    }

    pub async fn raise(&self, kameti_id: Uuid, user: &User, form: NewDispute<'_>) -> AppResult<Dispute> {
        let kameti = load_kameti(&self.kameti_repo, kameti_id).await?;
        if !self.member_repo.is_member(kameti_id, user.id).await? {
            return Err(AppError::Forbidden("Only members can raise disputes".to_string()));
        }

        let subject = validate_subject(form.subject)?;
        let description = validate_description(form.description)?;

        if let Some(respondent_id) = form.respondent_id {
            if respondent_id == user.id {
                return Err(AppError::Validation(
                    "You cannot raise a dispute against yourself".to_string(),
                ));
            }
            if !self.member_repo.is_member(kameti_id, respondent_id).await? {
                return Err(AppError::Validation(
                    "The respondent must be a member of this kameti".to_string(),
                ));
            }
        }

        let dispute = self
            .dispute_repo
            .create(kameti_id, user.id, form.respondent_id, subject, description)
            .await?;

        let message = format!("A dispute was raised in {}: {}", kameti.name, dispute.subject);
        if kameti.admin_id != user.id {
            self.notifications
                .notify_user(
                    kameti.admin_id,
                    NewNotification {
                        kind: NotificationKind::Dispute,
                        title: "New dispute",
                        message: &message,
                        reference_id: Some(dispute.id),
                    },
                )
                .await;
        }
        if let Some(respondent_id) = dispute.respondent_id.filter(|id| *id != kameti.admin_id) {
            self.notifications
                .notify_user(
                    respondent_id,
                    NewNotification {
                        kind: NotificationKind::Dispute,
                        title: "A dispute names you",
                        message: &message,
                        reference_id: Some(dispute.id),
                    },
                )
                .await;
        }

        info!("Dispute {} raised in kameti {} by {}", dispute.id, kameti_id, user.id);
        Ok(dispute)
    }

    pub async fn list(&self, kameti_id: Uuid, user: &User) -> AppResult<Vec<Dispute>> {
        load_kameti(&self.kameti_repo, kameti_id).await?;
        require_member(&self.member_repo, kameti_id, user).await?;
        Ok(self.dispute_repo.find_by_kameti(kameti_id).await?)
    }

    pub async fn get(&self, dispute_id: Uuid, user: &User) -> AppResult<Dispute> {
        let dispute = self.load(dispute_id).await?;
        require_member(&self.member_repo, dispute.kameti_id, user).await?;
        Ok(dispute)
    }

    /// Raiser edits their own open dispute
    pub async fn edit(
        &self,
        dispute_id: Uuid,
        user: &User,
        subject: Option<&str>,
        description: Option<&str>,
    ) -> AppResult<Dispute> {
        let dispute = self.load(dispute_id).await?;
        require_raiser(&dispute, user)?;
        if !dispute.is_open() {
            return Err(AppError::BusinessLogic(format!(
                "Dispute is {}, only open disputes can be edited",
                dispute.status
            )));
        }

        let subject = subject.map(validate_subject).transpose()?;
        let description = description.map(validate_description).transpose()?;

        Ok(self
            .dispute_repo
            .update_content(dispute_id, subject, description)
            .await?)
    }

    /// Raiser withdraws an open dispute
    pub async fn delete(&self, dispute_id: Uuid, user: &User) -> AppResult<()> {
        let dispute = self.load(dispute_id).await?;
        require_raiser(&dispute, user)?;

        if !self.dispute_repo.delete_open(dispute_id).await? {
            return Err(AppError::BusinessLogic(
                "Only open disputes can be deleted".to_string(),
            ));
        }

        info!("Dispute {} withdrawn by {}", dispute_id, user.id);
        Ok(())
    }

    /// Kameti admin or platform admin moves a dispute along
    pub async fn update_status(
        &self,
        dispute_id: Uuid,
        user: &User,
        next: DisputeStatus,
        resolution: Option<&str>,
    ) -> AppResult<Dispute> {
        let dispute = self.load(dispute_id).await?;
        let kameti = load_kameti(&self.kameti_repo, dispute.kameti_id).await?;
        if !kameti.is_admin(user.id) && !user.is_admin() {
            return Err(AppError::Forbidden(
                "Only the kameti admin or a platform admin can moderate disputes".to_string(),
            ));
        }

        let current = dispute.status_enum();
        let resolution = check_transition(current, next, resolution)?;

        let updated = self
            .dispute_repo
            .update_status(dispute_id, current, next, resolution)
            .await?;

        let message = format!(
            "Your dispute \"{}\" is now {}",
            updated.subject,
            next.as_str().replace('_', " ")
        );
        self.notifications
            .notify_user(
                updated.raised_by,
                NewNotification {
                    kind: NotificationKind::Dispute,
                    title: "Dispute updated",
                    message: &message,
                    reference_id: Some(updated.id),
                },
            )
            .await;

        if next.is_terminal() {
            if let Err(e) = self.audit.log_dispute_closed(&updated, user.id).await {
                warn!("Failed to audit dispute {}: {}", updated.id, e);
            }
        }

        info!("Dispute {} moved {} -> {}", dispute_id, current.as_str(), next.as_str());
        Ok(updated)
    }

    /// Raiser attaches evidence while the dispute is still being handled
    pub async fn attach_evidence(
        &self,
        dispute_id: Uuid,
        user: &User,
        file_name: &str,
        bytes: &[u8],
    ) -> AppResult<Dispute> {
        let dispute = self.load(dispute_id).await?;
        require_raiser(&dispute, user)?;
        if dispute.status_enum().is_terminal() {
            return Err(AppError::BusinessLogic(
                "Evidence cannot be added to a closed dispute".to_string(),
            ));
        }

        let path = self.uploads.save("evidence", file_name, bytes).await?;
        Ok(self.dispute_repo.set_evidence(dispute_id, &path).await?)
    }

    async fn load(&self, dispute_id: Uuid) -> AppResult<Dispute> {
        self.dispute_repo
            .find_by_id(dispute_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Dispute {} not found", dispute_id)))
    }
}

fn require_raiser(dispute: &Dispute, user: &User) -> AppResult<()> {
    if dispute.raised_by == user.id {
        Ok(())
    } else {
        Err(AppError::Forbidden("Only the member who raised this dispute can do this".to_string()))
    }
}

/// Validate a moderation step; terminal statuses need a resolution text
fn check_transition<'a>(
    current: DisputeStatus,
    next: DisputeStatus,
    resolution: Option<&'a str>,
) -> AppResult<Option<&'a str>> {
    if !current.can_transition_to(next) {
        return Err(AppError::BusinessLogic(format!(
            "Cannot move a dispute from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let resolution = resolution.map(str::trim).filter(|r| !r.is_empty());
    if next.is_terminal() && resolution.is_none() {
        return Err(AppError::Validation(
            "A resolution is required to close a dispute".to_string(),
        ));
    }

    Ok(resolution)
}

fn validate_subject(subject: &str) -> AppResult<&str> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(AppError::Validation("subject is required".to_string()));
    }
    if subject.chars().count() > MAX_SUBJECT_LEN {
        return Err(AppError::Validation(format!(
            "subject must be at most {} characters",
            MAX_SUBJECT_LEN
        )));
    }
    Ok(subject)
}

fn validate_description(description: &str) -> AppResult<&str> {
    let description = description.trim();
    if description.is_empty() {
        return Err(AppError::Validation("description is required".to_string()));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(AppError::Validation(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use DisputeStatus::*;

        assert!(check_transition(Open, UnderReview, None).is_ok());
        assert_eq!(
            check_transition(Open, Resolved, Some(" refunded ")).unwrap(),
            Some("refunded")
        );
        assert!(check_transition(UnderReview, Rejected, Some("no evidence")).is_ok());

        assert!(matches!(
            check_transition(Resolved, Open, None),
            Err(AppError::BusinessLogic(_))
        ));
        assert!(matches!(
            check_transition(UnderReview, UnderReview, None),
            Err(AppError::BusinessLogic(_))
        ));
    }

    #[test]
    fn test_closing_requires_resolution() {
        assert!(matches!(
            check_transition(DisputeStatus::Open, DisputeStatus::Resolved, None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            check_transition(DisputeStatus::Open, DisputeStatus::Rejected, Some("   ")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_subject_and_description() {
        assert!(validate_subject("Late payout").is_ok());
        assert!(validate_subject(" ").is_err());
        assert!(validate_subject(&"s".repeat(201)).is_err());
        assert!(validate_description("").is_err());
    }
}
