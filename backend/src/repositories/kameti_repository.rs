use crate::error::{RepoResult, RepositoryError};
use crate::models::{Frequency, Kameti, KametiMember, KametiStatus, MemberRole};
use crate::rotation;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Fields that may change while a kameti is still pending
#[derive(Debug, Default, Clone)]
pub struct KametiChanges<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub contribution_amount: Option<Decimal>,
    pub max_members: Option<i32>,
}

/// Repository for kameti data access
pub struct KametiRepository {
    pool: PgPool,
}

impl KametiRepository {
    /// Create a new KametiRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new kameti and enrol its creator as admin
    pub async fn create_with_admin(
        &self,
        name: &str,
        description: Option<&str>,
        contribution_amount: Decimal,
        frequency: Frequency,
        max_members: i32,
        admin_id: Uuid,
    ) -> RepoResult<Kameti> {
        let mut tx = self.pool.begin().await?;

        let kameti = sqlx::query_as::<_, Kameti>(
            r#"
            INSERT INTO kametis (name, description, contribution_amount, frequency, max_members, admin_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, description, contribution_amount, frequency, max_members,
                      total_rounds, current_round, status, admin_id, start_date, created_at
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(contribution_amount)
        .bind(frequency.as_str())
        .bind(max_members)
        .bind(admin_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO kameti_members (kameti_id, user_id, role)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(kameti.id)
        .bind(admin_id)
        .bind(MemberRole::Admin.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(kameti)
    }

    /// Find a kameti by UUID
    pub async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Kameti>> {
        let kameti = sqlx::query_as::<_, Kameti>(
            r#"
            SELECT id, name, description, contribution_amount, frequency, max_members,
                   total_rounds, current_round, status, admin_id, start_date, created_at
            FROM kametis
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(kameti)
    }

    /// List kametis in a given status, newest first
    pub async fn find_by_status(
        &self,
        status: KametiStatus,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Kameti>> {
        let kametis = sqlx::query_as::<_, Kameti>(
            r#"
            SELECT id, name, description, contribution_amount, frequency, max_members,
                   total_rounds, current_round, status, admin_id, start_date, created_at
            FROM kametis
            WHERE status = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(kametis)
    }

    /// All kametis a user belongs to
    pub async fn find_by_member(&self, user_id: Uuid) -> RepoResult<Vec<Kameti>> {
        let kametis = sqlx::query_as::<_, Kameti>(
            r#"
            SELECT k.id, k.name, k.description, k.contribution_amount, k.frequency, k.max_members,
                   k.total_rounds, k.current_round, k.status, k.admin_id, k.start_date, k.created_at
            FROM kametis k
            JOIN kameti_members m ON m.kameti_id = k.id
            WHERE m.user_id = $1
            ORDER BY k.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(kametis)
    }

    /// Apply edits to a pending kameti
    pub async fn update_details(&self, id: Uuid, changes: &KametiChanges<'_>) -> RepoResult<Kameti> {
        let mut tx = self.pool.begin().await?;
        let kameti = lock_kameti(&mut tx, id).await?;

        if !kameti.is_pending() {
            return Err(RepositoryError::BusinessRule(
                "Only pending kametis can be edited".to_string(),
            ));
        }

        if let Some(max_members) = changes.max_members {
            let count = count_members(&mut tx, id).await?;
            if i64::from(max_members) < count {
                return Err(RepositoryError::InvalidInput(format!(
                    "max_members cannot be below the current member count ({})",
                    count
                )));
            }
        }

        let updated = sqlx::query_as::<_, Kameti>(
            r#"
            UPDATE kametis
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                contribution_amount = COALESCE($4, contribution_amount),
                max_members = COALESCE($5, max_members)
            WHERE id = $1
            RETURNING id, name, description, contribution_amount, frequency, max_members,
                      total_rounds, current_round, status, admin_id, start_date, created_at
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.contribution_amount)
        .bind(changes.max_members)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    /// Cancel a kameti that has not started yet
    pub async fn cancel(&self, id: Uuid) -> RepoResult<Kameti> {
        let updated = sqlx::query_as::<_, Kameti>(
            r#"
            UPDATE kametis
            SET status = 'cancelled'
            WHERE id = $1 AND status = 'pending'
            RETURNING id, name, description, contribution_amount, frequency, max_members,
                      total_rounds, current_round, status, admin_id, start_date, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            RepositoryError::BusinessRule("Only pending kametis can be cancelled".to_string())
        })
    }

    /// Enrol a user, respecting status and capacity
    pub async fn join(&self, kameti_id: Uuid, user_id: Uuid) -> RepoResult<KametiMember> {
        let mut tx = self.pool.begin().await?;
        let kameti = lock_kameti(&mut tx, kameti_id).await?;

        if !kameti.is_pending() {
            return Err(RepositoryError::BusinessRule(
                "This kameti is no longer accepting members".to_string(),
            ));
        }

        // Existing members get the duplicate error even when the kameti is full
        let already_member: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM kameti_members WHERE kameti_id = $1 AND user_id = $2)",
        )
        .bind(kameti_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_member {
            return Err(RepositoryError::Duplicate(format!(
                "User {} is already a member of kameti {}",
                user_id, kameti_id
            )));
        }

        let count = count_members(&mut tx, kameti_id).await?;
        if count >= i64::from(kameti.max_members) {
            return Err(RepositoryError::BusinessRule("This kameti is full".to_string()));
        }

        // A concurrent join still surfaces as a unique violation
        let member = sqlx::query_as::<_, KametiMember>(
            r#"
            INSERT INTO kameti_members (kameti_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING kameti_id, user_id, role, payout_position, has_received_payout, joined_at
            "#,
        )
        .bind(kameti_id)
        .bind(user_id)
        .bind(MemberRole::Member.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(member)
    }

    /// Start the rotation: fix payout order and open round 1
    pub async fn start(&self, id: Uuid, start_date: NaiveDate) -> RepoResult<Kameti> {
        let mut tx = self.pool.begin().await?;
        let kameti = lock_kameti(&mut tx, id).await?;

        if !kameti.is_pending() {
            return Err(RepositoryError::BusinessRule(
                "Only pending kametis can be started".to_string(),
            ));
        }

        let members: Vec<(Uuid, NaiveDateTime)> = sqlx::query_as(
            r#"
            SELECT user_id, joined_at
            FROM kameti_members
            WHERE kameti_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        if members.len() < 2 {
            return Err(RepositoryError::BusinessRule(
                "A kameti needs at least 2 members to start".to_string(),
            ));
        }

        for (user_id, position) in rotation::assign_positions(&members) {
            sqlx::query(
                r#"
                UPDATE kameti_members
                SET payout_position = $3
                WHERE kameti_id = $1 AND user_id = $2
                "#,
            )
            .bind(id)
            .bind(user_id)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        let started = sqlx::query_as::<_, Kameti>(
            r#"
            UPDATE kametis
            SET status = 'active',
                total_rounds = $2,
                current_round = 1,
                start_date = $3
            WHERE id = $1
            RETURNING id, name, description, contribution_amount, frequency, max_members,
                      total_rounds, current_round, status, admin_id, start_date, created_at
            "#,
        )
        .bind(id)
        .bind(members.len() as i32)
        .bind(start_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(started)
    }
}

/// `SELECT ... FOR UPDATE` on a kameti row inside a transaction
pub(crate) async fn lock_kameti(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> RepoResult<Kameti> {
    sqlx::query_as::<_, Kameti>(
        r#"
        SELECT id, name, description, contribution_amount, frequency, max_members,
               total_rounds, current_round, status, admin_id, start_date, created_at
        FROM kametis
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| RepositoryError::NotFound(format!("Kameti {} not found", id)))
}

async fn count_members(tx: &mut Transaction<'_, Postgres>, kameti_id: Uuid) -> RepoResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kameti_members WHERE kameti_id = $1")
        .bind(kameti_id)
        .fetch_one(&mut **tx)
        .await?;

    Ok(count)
}
