use crate::error::{RepoResult, RepositoryError};
use crate::models::{KametiMember, MemberWithUser};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for kameti membership data access
pub struct KametiMemberRepository {
    pool: PgPool,
}

impl KametiMemberRepository {
    /// Create a new KametiMemberRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Leave a kameti that has not started yet
    pub async fn leave_pending(&self, kameti_id: Uuid, user_id: Uuid) -> RepoResult<()> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM kameti_members m
            USING kametis k
            WHERE m.kameti_id = k.id
              AND m.kameti_id = $1
              AND m.user_id = $2
              AND k.status = 'pending'
              AND m.role <> 'admin'
            "#,
        )
        .bind(kameti_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(RepositoryError::BusinessRule(
                "Only non-admin members of a pending kameti can leave".to_string(),
            ));
        }

        Ok(())
    }

    /// Find all members of a kameti in payout order (unassigned last, then join order)
    pub async fn find_by_kameti(&self, kameti_id: Uuid) -> RepoResult<Vec<KametiMember>> {
        let members = sqlx::query_as::<_, KametiMember>(
            r#"
            SELECT kameti_id, user_id, role, payout_position, has_received_payout, joined_at
            FROM kameti_members
            WHERE kameti_id = $1
            ORDER BY payout_position ASC NULLS LAST, joined_at ASC
            "#,
        )
        .bind(kameti_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    /// Members with display names, for the kameti detail view
    pub async fn find_with_users(&self, kameti_id: Uuid) -> RepoResult<Vec<MemberWithUser>> {
        let members = sqlx::query_as::<_, MemberWithUser>(
            r#"
            SELECT m.user_id, u.full_name, m.role, m.payout_position,
                   m.has_received_payout, m.joined_at
            FROM kameti_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.kameti_id = $1
            ORDER BY m.payout_position ASC NULLS LAST, m.joined_at ASC
            "#,
        )
        .bind(kameti_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    /// Check if a user is a member of a kameti
    pub async fn is_member(&self, kameti_id: Uuid, user_id: Uuid) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM kameti_members
                WHERE kameti_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(kameti_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Whether two users belong to at least one common kameti
    pub async fn share_kameti(&self, user_a: Uuid, user_b: Uuid) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM kameti_members a
                JOIN kameti_members b ON b.kameti_id = a.kameti_id
                WHERE a.user_id = $1 AND b.user_id = $2
            )
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
