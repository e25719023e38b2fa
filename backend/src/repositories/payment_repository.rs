//! Repository for contribution payments

use crate::error::RepoResult;
use crate::models::{Payment, PaymentMethod};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// A completed contribution with the schedule of its kameti, as used by risk scoring
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompletedContribution {
    pub kameti_id: Uuid,
    pub round: i32,
    pub paid_at: NaiveDateTime,
    pub start_date: Option<NaiveDate>,
    pub frequency: String,
}

pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending payment
    pub async fn create(
        &self,
        kameti_id: Uuid,
        user_id: Uuid,
        round: i32,
        amount: Decimal,
        method: PaymentMethod,
    ) -> RepoResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (kameti_id, user_id, round, amount, method)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, kameti_id, user_id, round, amount, method, status,
                      gateway_reference, receipt_path, created_at, paid_at
            "#,
        )
        .bind(kameti_id)
        .bind(user_id)
        .bind(round)
        .bind(amount)
        .bind(method.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Remember the gateway's checkout reference for a payment
    pub async fn set_gateway_reference(&self, id: Uuid, reference: &str) -> RepoResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET gateway_reference = $2
            WHERE id = $1
            RETURNING id, kameti_id, user_id, round, amount, method, status,
                      gateway_reference, receipt_path, created_at, paid_at
            "#,
        )
        .bind(id)
        .bind(reference)
        .fetch_one(&self.pool)
        .await?;

        Ok(payment)
    }

    pub async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, kameti_id, user_id, round, amount, method, status,
                   gateway_reference, receipt_path, created_at, paid_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    pub async fn find_by_reference(&self, reference: &str) -> RepoResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, kameti_id, user_id, round, amount, method, status,
                   gateway_reference, receipt_path, created_at, paid_at
            FROM payments
            WHERE gateway_reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Payments of a kameti, optionally limited to one round
    pub async fn find_by_kameti(&self, kameti_id: Uuid, round: Option<i32>) -> RepoResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, kameti_id, user_id, round, amount, method, status,
                   gateway_reference, receipt_path, created_at, paid_at
            FROM payments
            WHERE kameti_id = $1 AND ($2::INTEGER IS NULL OR round = $2)
            ORDER BY round DESC, created_at DESC
            "#,
        )
        .bind(kameti_id)
        .bind(round)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Whether the user already has a completed payment for the round
    pub async fn has_completed(&self, kameti_id: Uuid, user_id: Uuid, round: i32) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM payments
                WHERE kameti_id = $1 AND user_id = $2 AND round = $3 AND status = 'completed'
            )
            "#,
        )
        .bind(kameti_id)
        .bind(user_id)
        .bind(round)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Mark a pending or awaiting payment as completed.
    ///
    /// Returns `None` when the payment was not in a completable state.
    pub async fn complete(&self, id: Uuid, paid_at: NaiveDateTime) -> RepoResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'completed', paid_at = $2
            WHERE id = $1 AND status IN ('pending', 'awaiting_confirmation')
            RETURNING id, kameti_id, user_id, round, amount, method, status,
                      gateway_reference, receipt_path, created_at, paid_at
            "#,
        )
        .bind(id)
        .bind(paid_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Mark a pending or awaiting payment as failed
    pub async fn fail(&self, id: Uuid) -> RepoResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'failed'
            WHERE id = $1 AND status IN ('pending', 'awaiting_confirmation')
            RETURNING id, kameti_id, user_id, round, amount, method, status,
                      gateway_reference, receipt_path, created_at, paid_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Attach an uploaded receipt and hand the payment to the kameti admin
    pub async fn attach_receipt(&self, id: Uuid, receipt_path: &str) -> RepoResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET receipt_path = $2, status = 'awaiting_confirmation'
            WHERE id = $1 AND status IN ('pending', 'awaiting_confirmation')
            RETURNING id, kameti_id, user_id, round, amount, method, status,
                      gateway_reference, receipt_path, created_at, paid_at
            "#,
        )
        .bind(id)
        .bind(receipt_path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Members of a kameti without a completed payment for the round
    pub async fn unpaid_members(&self, kameti_id: Uuid, round: i32) -> RepoResult<Vec<Uuid>> {
        let unpaid: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT m.user_id
            FROM kameti_members m
            WHERE m.kameti_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM payments p
                  WHERE p.kameti_id = m.kameti_id
                    AND p.user_id = m.user_id
                    AND p.round = $2
                    AND p.status = 'completed'
              )
            "#,
        )
        .bind(kameti_id)
        .bind(round)
        .fetch_all(&self.pool)
        .await?;

        Ok(unpaid)
    }

    /// Every completed contribution a user has made
    pub async fn completed_by_user(&self, user_id: Uuid) -> RepoResult<Vec<CompletedContribution>> {
        let rows = sqlx::query_as::<_, CompletedContribution>(
            r#"
            SELECT p.kameti_id, p.round, p.paid_at, k.start_date, k.frequency
            FROM payments p
            JOIN kametis k ON k.id = p.kameti_id
            WHERE p.user_id = $1 AND p.status = 'completed' AND p.paid_at IS NOT NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Users holding a completed payment for a round.
///
/// Takes a connection so payout release can run it inside its transaction.
pub(crate) async fn completed_payers(
    conn: &mut PgConnection,
    kameti_id: Uuid,
    round: i32,
) -> RepoResult<Vec<Uuid>> {
    let payers: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT user_id
        FROM payments
        WHERE kameti_id = $1 AND round = $2 AND status = 'completed'
        "#,
    )
    .bind(kameti_id)
    .bind(round)
    .fetch_all(&mut *conn)
    .await?;

    Ok(payers)
}
