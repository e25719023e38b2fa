use crate::error::{AppError, AppResult};
use crate::models::Notification;
use crate::repositories::{NewNotification, NotificationRepository};
use crate::websocket::WebSocketServer;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Stores notifications and pushes them to connected clients.
///
/// Delivery is best effort: a failed insert is logged and never fails the
/// action that triggered it.
pub struct NotificationService {
    repo: Arc<NotificationRepository>,
    ws_server: Arc<WebSocketServer>,
}

impl NotificationService {
    pub fn new(repo: Arc<NotificationRepository>, ws_server: Arc<WebSocketServer>) -> Self {
        Self { repo, ws_server }
    }

    /// Notify one user
    pub async fn notify_user(&self, user_id: Uuid, note: NewNotification<'_>) {
        match self.repo.create(user_id, &note, None).await {
            Ok(Some(notification)) => self.ws_server.push_notification(&notification).await,
            Ok(None) => {}
            Err(e) => warn!("Failed to notify user {}: {}", user_id, e),
        }
    }

    /// Notify one user at most once per `dedupe_key`; returns whether anything was sent
    pub async fn notify_user_once(
        &self,
        user_id: Uuid,
        note: NewNotification<'_>,
        dedupe_key: &str,
    ) -> AppResult<bool> {
        match self.repo.create(user_id, &note, Some(dedupe_key)).await? {
            Some(notification) => {
                self.ws_server.push_notification(&notification).await;
                Ok(true)
            }
            None => {
                debug!("Skipping duplicate notification {}", dedupe_key);
                Ok(false)
            }
        }
    }

    /// Notify every member of a kameti, optionally skipping the user who acted
    pub async fn notify_kameti(&self, kameti_id: Uuid, note: NewNotification<'_>, exclude: Option<Uuid>) {
        match self.repo.create_for_kameti_members(kameti_id, &note, exclude).await {
            Ok(notifications) => {
                for notification in &notifications {
                    self.ws_server.push_notification(notification).await;
                }
            }
            Err(e) => warn!("Failed to notify members of kameti {}: {}", kameti_id, e),
        }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: Option<i64>,
    ) -> AppResult<Vec<Notification>> {
        let limit = page_size(limit)?;
        Ok(self.repo.list(user_id, unread_only, limit).await?)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> AppResult<i64> {
        Ok(self.repo.unread_count(user_id).await?)
    }

    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> AppResult<Notification> {
        self.repo
            .mark_read(id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> AppResult<u64> {
        Ok(self.repo.mark_all_read(user_id).await?)
    }
}

/// Validate the requested page size, defaulting when absent
pub fn page_size(limit: Option<i64>) -> AppResult<i64> {
    match limit {
        None => Ok(DEFAULT_PAGE_SIZE),
        Some(n) if (1..=MAX_PAGE_SIZE).contains(&n) => Ok(n),
        Some(n) => Err(AppError::Validation(format!(
            "limit must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, n
        ))),
    }
}
