use crate::error::{AppError, AppResult, RepositoryError};
use crate::models::{
    Frequency, Kameti, KametiMember, KametiStatus, MemberWithUser, NotificationKind, User,
};
use crate::repositories::{
    KametiChanges, KametiMemberRepository, KametiRepository, NewNotification, PayoutRepository,
};
use crate::rotation::{schedule, PayoutReadiness, RoundWindow};
use crate::services::access::{load_kameti, require_kameti_admin, require_member, validate_amount};
use crate::services::notification_service::page_size;
use crate::services::NotificationService;
use crate::websocket::WebSocketServer;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const MAX_NAME_LEN: usize = 120;
const MAX_DESCRIPTION_LEN: usize = 2000;
const MIN_MEMBERS: i32 = 2;
const MAX_MEMBERS: i32 = 50;

/// Fields for a new kameti
#[derive(Debug, Clone)]
pub struct NewKameti<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub contribution_amount: Decimal,
    pub frequency: Frequency,
    pub max_members: i32,
}

/// A kameti with its roster and, once running, the current round's dates
#[derive(Debug, Clone, Serialize)]
pub struct KametiDetail {
    pub kameti: Kameti,
    pub members: Vec<MemberWithUser>,
    pub current_window: Option<RoundWindow>,
}

/// Readiness of the round in progress
#[derive(Debug, Clone, Serialize)]
pub struct RoundStatus {
    pub readiness: PayoutReadiness,
    pub window: Option<RoundWindow>,
    pub payout_amount: Decimal,
}

/// Service for creating and running kametis
pub struct KametiService {
    kameti_repo: Arc<KametiRepository>,
    member_repo: Arc<KametiMemberRepository>,
    payout_repo: Arc<PayoutRepository>,
    notifications: Arc<NotificationService>,
    ws_server: Arc<WebSocketServer>,
}

impl KametiService {
    pub fn new(
        kameti_repo: Arc<KametiRepository>,
        member_repo: Arc<KametiMemberRepository>,
        payout_repo: Arc<PayoutRepository>,
        notifications: Arc<NotificationService>,
        ws_server: Arc<WebSocketServer>,
    ) -> Self {
        Self {
            kameti_repo,
            member_repo,
            payout_repo,
            notifications,
            ws_server,
        }
    }

    /// Create a kameti; the creator becomes its admin and first member
    pub async fn create(&self, user: &User, form: NewKameti<'_>) -> AppResult<Kameti> {
        let name = validate_name(form.name)?;
        let description = validate_description(form.description)?;
        validate_contribution(form.contribution_amount)?;
        validate_max_members(form.max_members)?;

        let kameti = self
            .kameti_repo
            .create_with_admin(
                name,
                description,
                form.contribution_amount,
                form.frequency,
                form.max_members,
                user.id,
            )
            .await?;

        info!("Created kameti {} ({}) by {}", kameti.name, kameti.id, user.id);
        Ok(kameti)
    }

    /// Kametis still accepting members
    pub async fn list_open(&self, limit: Option<i64>, offset: Option<i64>) -> AppResult<Vec<Kameti>> {
        let limit = page_size(limit)?;
        let offset = offset.unwrap_or(0).max(0);
        Ok(self
            .kameti_repo
            .find_by_status(KametiStatus::Pending, limit, offset)
            .await?)
    }

    pub async fn list_mine(&self, user: &User) -> AppResult<Vec<Kameti>> {
        Ok(self.kameti_repo.find_by_member(user.id).await?)
    }

    /// Pending kametis are public; running ones only to their members
    pub async fn get(&self, kameti_id: Uuid, user: &User) -> AppResult<KametiDetail> {
        let kameti = load_kameti(&self.kameti_repo, kameti_id).await?;
        if !kameti.is_pending() {
            require_member(&self.member_repo, kameti_id, user).await?;
        }

        let members = self.member_repo.find_with_users(kameti_id).await?;
        let current_window = current_window(&kameti);

        Ok(KametiDetail {
            kameti,
            members,
            current_window,
        })
    }

    pub async fn update(
        &self,
        kameti_id: Uuid,
        user: &User,
        changes: KametiChanges<'_>,
    ) -> AppResult<Kameti> {
        let kameti = load_kameti(&self.kameti_repo, kameti_id).await?;
        require_kameti_admin(&kameti, user)?;

        let changes = KametiChanges {
            name: changes.name.map(validate_name).transpose()?,
            description: validate_description(changes.description)?,
            contribution_amount: changes.contribution_amount,
            max_members: changes.max_members,
        };
        if let Some(amount) = changes.contribution_amount {
            validate_contribution(amount)?;
        }
        if let Some(max_members) = changes.max_members {
            validate_max_members(max_members)?;
        }

        let updated = self.kameti_repo.update_details(kameti_id, &changes).await?;
        info!("Updated kameti {}", kameti_id);
        Ok(updated)
    }

    pub async fn join(&self, kameti_id: Uuid, user: &User) -> AppResult<KametiMember> {
        let kameti = load_kameti(&self.kameti_repo, kameti_id).await?;

        let member = self
            .kameti_repo
            .join(kameti_id, user.id)
            .await
            .map_err(|e| match e {
                RepositoryError::Duplicate(_) => {
                    AppError::Conflict("You are already a member of this kameti".to_string())
                }
                other => other.into(),
            })?;

        let message = format!("{} joined {}", user.full_name, kameti.name);
        self.notifications
            .notify_user(
                kameti.admin_id,
                NewNotification {
                    kind: NotificationKind::Kameti,
                    title: "New member",
                    message: &message,
                    reference_id: Some(kameti_id),
                },
            )
            .await;

        info!("User {} joined kameti {}", user.id, kameti_id);
        Ok(member)
    }

    pub async fn leave(&self, kameti_id: Uuid, user: &User) -> AppResult<()> {
        let kameti = load_kameti(&self.kameti_repo, kameti_id).await?;
        if kameti.is_admin(user.id) {
            return Err(AppError::BusinessLogic(
                "The kameti admin cannot leave; cancel the kameti instead".to_string(),
            ));
        }
        if !self.member_repo.is_member(kameti_id, user.id).await? {
            return Err(AppError::NotFound("You are not a member of this kameti".to_string()));
        }

        self.member_repo.leave_pending(kameti_id, user.id).await?;
        info!("User {} left kameti {}", user.id, kameti_id);
        Ok(())
    }

    /// Fix the payout order and open round 1
    pub async fn start(&self, kameti_id: Uuid, user: &User) -> AppResult<Kameti> {
        let kameti = load_kameti(&self.kameti_repo, kameti_id).await?;
        require_kameti_admin(&kameti, user)?;

        let today = chrono::Utc::now().date_naive();
        let started = self.kameti_repo.start(kameti_id, today).await?;

        let message = format!(
            "{} has started with {} rounds. Round 1 contributions of {} are now due.",
            started.name, started.total_rounds, started.contribution_amount
        );
        self.notifications
            .notify_kameti(
                kameti_id,
                NewNotification {
                    kind: NotificationKind::Kameti,
                    title: "Kameti started",
                    message: &message,
                    reference_id: Some(kameti_id),
                },
                None,
            )
            .await;
        self.ws_server
            .broadcast_kameti_updated(kameti_id, &started.status, started.current_round)
            .await;

        info!("Kameti {} started with {} members", kameti_id, started.total_rounds);
        Ok(started)
    }

    pub async fn cancel(&self, kameti_id: Uuid, user: &User) -> AppResult<Kameti> {
        let kameti = load_kameti(&self.kameti_repo, kameti_id).await?;
        require_kameti_admin(&kameti, user)?;

        let cancelled = self.kameti_repo.cancel(kameti_id).await?;

        let message = format!("{} was cancelled by its admin", cancelled.name);
        self.notifications
            .notify_kameti(
                kameti_id,
                NewNotification {
                    kind: NotificationKind::Kameti,
                    title: "Kameti cancelled",
                    message: &message,
                    reference_id: Some(kameti_id),
                },
                Some(user.id),
            )
            .await;

        info!("Kameti {} cancelled", kameti_id);
        Ok(cancelled)
    }

    /// Who has paid for the current round and whether the pot can go out
    pub async fn round_status(&self, kameti_id: Uuid, user: &User) -> AppResult<RoundStatus> {
        let kameti = load_kameti(&self.kameti_repo, kameti_id).await?;
        require_member(&self.member_repo, kameti_id, user).await?;

        if !kameti.is_active() {
            return Err(AppError::BusinessLogic(format!(
                "Kameti is {}, readiness applies to active kametis",
                kameti.status
            )));
        }

        let readiness = self.payout_repo.readiness(&kameti).await?;
        Ok(RoundStatus {
            readiness,
            window: current_window(&kameti),
            payout_amount: kameti.payout_amount(),
        })
    }
}

fn current_window(kameti: &Kameti) -> Option<RoundWindow> {
    let start = kameti.start_date?;
    if !kameti.is_active() {
        return None;
    }
    schedule::round_window(start, kameti.frequency_enum(), kameti.current_round)
}

fn validate_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name)
}

fn validate_description(description: Option<&str>) -> AppResult<Option<&str>> {
    match description.map(str::trim) {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => Err(AppError::Validation(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        ))),
        other => Ok(other),
    }
}

fn validate_contribution(amount: Decimal) -> AppResult<()> {
    validate_amount("contribution_amount", amount)
}

fn validate_max_members(max_members: i32) -> AppResult<()> {
    if !(MIN_MEMBERS..=MAX_MEMBERS).contains(&max_members) {
        return Err(AppError::Validation(format!(
            "max_members must be between {} and {}",
            MIN_MEMBERS, MAX_MEMBERS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contribution_validation() {
        assert!(validate_contribution(Decimal::new(5000, 2)).is_ok());
        assert!(validate_contribution(Decimal::new(50000, 3)).is_ok()); // 50.000
        assert!(validate_contribution(Decimal::ZERO).is_err());
        assert!(validate_contribution(Decimal::new(-1, 0)).is_err());
        assert!(validate_contribution(Decimal::new(1001, 3)).is_err());
    }

    #[test]
    fn test_max_members_bounds() {
        assert!(validate_max_members(1).is_err());
        assert!(validate_max_members(2).is_ok());
        assert!(validate_max_members(50).is_ok());
        assert!(validate_max_members(51).is_err());
    }

    #[test]
    fn test_name_validation() {
        assert_eq!(validate_name("  Office Kameti ").unwrap(), "Office Kameti");
        assert!(validate_name("").is_err());
        assert!(validate_name(&"k".repeat(121)).is_err());
    }
}
