use crate::error::RepoResult;
use crate::models::{Notification, NotificationKind};
use sqlx::PgPool;
use uuid::Uuid;

/// Content of a notification before it is addressed to anyone
#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub kind: NotificationKind,
    pub title: &'a str,
    pub message: &'a str,
    pub reference_id: Option<Uuid>,
}

/// Repository for the notification inbox
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one notification.
    ///
    /// With a `dedupe_key` that already exists nothing is written and `None` comes back.
    pub async fn create(
        &self,
        user_id: Uuid,
        note: &NewNotification<'_>,
        dedupe_key: Option<&str>,
    ) -> RepoResult<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, kind, title, message, reference_id, dedupe_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (dedupe_key) DO NOTHING
            RETURNING id, user_id, kind, title, message, reference_id, dedupe_key, is_read, created_at
            "#,
        )
        .bind(user_id)
        .bind(note.kind.as_str())
        .bind(note.title)
        .bind(note.message)
        .bind(note.reference_id)
        .bind(dedupe_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(notification)
    }

    /// Same notification for every member of a kameti, optionally skipping one user
    pub async fn create_for_kameti_members(
        &self,
        kameti_id: Uuid,
        note: &NewNotification<'_>,
        exclude: Option<Uuid>,
    ) -> RepoResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, kind, title, message, reference_id)
            SELECT m.user_id, $2, $3, $4, $5
            FROM kameti_members m
            WHERE m.kameti_id = $1 AND ($6::UUID IS NULL OR m.user_id <> $6)
            RETURNING id, user_id, kind, title, message, reference_id, dedupe_key, is_read, created_at
            "#,
        )
        .bind(kameti_id)
        .bind(note.kind.as_str())
        .bind(note.title)
        .bind(note.message)
        .bind(note.reference_id)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    /// Newest first
    pub async fn list(&self, user_id: Uuid, unread_only: bool, limit: i64) -> RepoResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, kind, title, message, reference_id, dedupe_key, is_read, created_at
            FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> RepoResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Mark one of the user's notifications read; `None` if it is not theirs
    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET is_read = TRUE
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, kind, title, message, reference_id, dedupe_key, is_read, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(notification)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> RepoResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
