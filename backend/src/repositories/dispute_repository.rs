use crate::error::{RepoResult, RepositoryError};
use crate::models::{Dispute, DisputeStatus};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for disputes
pub struct DisputeRepository {
    pool: PgPool,
}

impl DisputeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        kameti_id: Uuid,
        raised_by: Uuid,
        respondent_id: Option<Uuid>,
        subject: &str,
        description: &str,
    ) -> RepoResult<Dispute> {
        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            INSERT INTO disputes (kameti_id, raised_by, respondent_id, subject, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, kameti_id, raised_by, respondent_id, subject, description, status,
                      resolution, evidence_path, created_at, updated_at, resolved_at
            "#,
        )
        .bind(kameti_id)
        .bind(raised_by)
        .bind(respondent_id)
        .bind(subject)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        Ok(dispute)
    }

    pub async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Dispute>> {
        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            SELECT id, kameti_id, raised_by, respondent_id, subject, description, status,
                   resolution, evidence_path, created_at, updated_at, resolved_at
            FROM disputes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(dispute)
    }

    pub async fn find_by_kameti(&self, kameti_id: Uuid) -> RepoResult<Vec<Dispute>> {
        let disputes = sqlx::query_as::<_, Dispute>(
            r#"
            SELECT id, kameti_id, raised_by, respondent_id, subject, description, status,
                   resolution, evidence_path, created_at, updated_at, resolved_at
            FROM disputes
            WHERE kameti_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(kameti_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(disputes)
    }

    /// Edit subject/description; only matches while the dispute is still open
    pub async fn update_content(
        &self,
        id: Uuid,
        subject: Option<&str>,
        description: Option<&str>,
    ) -> RepoResult<Dispute> {
        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET subject = COALESCE($2, subject),
                description = COALESCE($3, description),
                updated_at = (NOW() AT TIME ZONE 'utc')
            WHERE id = $1 AND status = 'open'
            RETURNING id, kameti_id, raised_by, respondent_id, subject, description, status,
                      resolution, evidence_path, created_at, updated_at, resolved_at
            "#,
        )
        .bind(id)
        .bind(subject)
        .bind(description)
        .fetch_optional(&self.pool)
        .await?;

        dispute.ok_or_else(|| {
            RepositoryError::BusinessRule("Only open disputes can be edited".to_string())
        })
    }

    /// Move a dispute to `next`, guarded on the status the caller observed
    pub async fn update_status(
        &self,
        id: Uuid,
        expected: DisputeStatus,
        next: DisputeStatus,
        resolution: Option<&str>,
    ) -> RepoResult<Dispute> {
        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET status = $3,
                resolution = COALESCE($4, resolution),
                updated_at = (NOW() AT TIME ZONE 'utc'),
                resolved_at = CASE WHEN $5 THEN (NOW() AT TIME ZONE 'utc') ELSE resolved_at END
            WHERE id = $1 AND status = $2
            RETURNING id, kameti_id, raised_by, respondent_id, subject, description, status,
                      resolution, evidence_path, created_at, updated_at, resolved_at
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(resolution)
        .bind(next.is_terminal())
        .fetch_optional(&self.pool)
        .await?;

        dispute.ok_or_else(|| {
            RepositoryError::BusinessRule("Dispute status changed concurrently".to_string())
        })
    }

    pub async fn set_evidence(&self, id: Uuid, evidence_path: &str) -> RepoResult<Dispute> {
        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET evidence_path = $2,
                updated_at = (NOW() AT TIME ZONE 'utc')
            WHERE id = $1 AND status IN ('open', 'under_review')
            RETURNING id, kameti_id, raised_by, respondent_id, subject, description, status,
                      resolution, evidence_path, created_at, updated_at, resolved_at
            "#,
        )
        .bind(id)
        .bind(evidence_path)
        .fetch_optional(&self.pool)
        .await?;

        dispute.ok_or_else(|| {
            RepositoryError::BusinessRule("Evidence cannot be added to a closed dispute".to_string())
        })
    }

    /// Delete an open dispute; returns false if nothing matched
    pub async fn delete_open(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM disputes WHERE id = $1 AND status = 'open'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Disputes resolved against the user as respondent
    pub async fn count_lost_by_user(&self, user_id: Uuid) -> RepoResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM disputes WHERE respondent_id = $1 AND status = 'resolved'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
