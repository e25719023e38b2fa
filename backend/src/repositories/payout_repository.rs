//! Payout release: the one place a round closes

use crate::error::{RepoResult, RepositoryError};
use crate::models::{Kameti, Payout};
use crate::repositories::kameti_repository::lock_kameti;
use crate::repositories::payment_repository::completed_payers;
use crate::rotation::{self, PayoutReadiness, RotationMember, RoundAdvance};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a release attempt
#[derive(Debug, Clone)]
pub enum ReleaseOutcome {
    /// Payout written and the rotation moved on
    Released {
        payout: Payout,
        kameti: Kameti,
        advance: RoundAdvance,
    },
    /// Someone has not paid yet, or the recipient is missing
    NotReady(PayoutReadiness),
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    user_id: Uuid,
    payout_position: Option<i32>,
    has_received_payout: bool,
}

impl From<MemberRow> for RotationMember {
    fn from(row: MemberRow) -> Self {
        RotationMember {
            user_id: row.user_id,
            payout_position: row.payout_position,
            has_received_payout: row.has_received_payout,
        }
    }
}

/// Roster and payers for `round`, read through whatever connection the caller holds
async fn round_readiness(
    conn: &mut PgConnection,
    kameti_id: Uuid,
    round: i32,
) -> RepoResult<PayoutReadiness> {
    let members = sqlx::query_as::<_, MemberRow>(
        r#"
        SELECT user_id, payout_position, has_received_payout
        FROM kameti_members
        WHERE kameti_id = $1
        ORDER BY payout_position NULLS LAST, joined_at
        "#,
    )
    .bind(kameti_id)
    .fetch_all(&mut *conn)
    .await?;

    let payers = completed_payers(conn, kameti_id, round).await?;

    let members: Vec<RotationMember> = members.into_iter().map(Into::into).collect();
    Ok(rotation::payout_readiness(round, &members, &payers))
}

pub struct PayoutRepository {
    pool: PgPool,
}

impl PayoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Readiness of the kameti's current round, without locking
    pub async fn readiness(&self, kameti: &Kameti) -> RepoResult<PayoutReadiness> {
        let mut conn = self.pool.acquire().await?;
        round_readiness(&mut *conn, kameti.id, kameti.current_round).await
    }

    /// Release the current round's pot and advance the rotation.
    ///
    /// Runs in one transaction with the kameti row locked, so two concurrent
    /// releases cannot pay the same round twice.
    pub async fn release_round(
        &self,
        kameti_id: Uuid,
        released_by: Option<Uuid>,
    ) -> RepoResult<ReleaseOutcome> {
        let mut tx = self.pool.begin().await?;
        let kameti = lock_kameti(&mut tx, kameti_id).await?;

        if !kameti.is_active() {
            return Err(RepositoryError::BusinessRule(format!(
                "Kameti is {}, payouts need an active kameti",
                kameti.status
            )));
        }

        let round = kameti.current_round;
        let readiness = round_readiness(&mut *tx, kameti_id, round).await?;

        let recipient = match (readiness.ready, readiness.recipient) {
            (true, Some(recipient)) => recipient,
            _ => {
                debug!(
                    "Round {} of kameti {} not ready: {} outstanding",
                    round,
                    kameti_id,
                    readiness.outstanding.len()
                );
                return Ok(ReleaseOutcome::NotReady(readiness));
            }
        };

        let advance = rotation::advance_round(round, kameti.total_rounds)
            .map_err(|e| RepositoryError::BusinessRule(e.to_string()))?;

        let payout = sqlx::query_as::<_, Payout>(
            r#"
            INSERT INTO payouts (kameti_id, round, recipient_id, amount, released_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, kameti_id, round, recipient_id, amount, released_by, released_at
            "#,
        )
        .bind(kameti_id)
        .bind(round)
        .bind(recipient)
        .bind(kameti.payout_amount())
        .bind(released_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE kameti_members
            SET has_received_payout = TRUE
            WHERE kameti_id = $1 AND user_id = $2
            "#,
        )
        .bind(kameti_id)
        .bind(recipient)
        .execute(&mut *tx)
        .await?;

        let kameti = match advance {
            RoundAdvance::Next(next) => {
                sqlx::query_as::<_, Kameti>(
                    r#"
                    UPDATE kametis SET current_round = $2
                    WHERE id = $1
                    RETURNING id, name, description, contribution_amount, frequency, max_members,
                              total_rounds, current_round, status, admin_id, start_date, created_at
                    "#,
                )
                .bind(kameti_id)
                .bind(next)
                .fetch_one(&mut *tx)
                .await?
            }
            RoundAdvance::Completed => {
                sqlx::query_as::<_, Kameti>(
                    r#"
                    UPDATE kametis SET status = 'completed'
                    WHERE id = $1
                    RETURNING id, name, description, contribution_amount, frequency, max_members,
                              total_rounds, current_round, status, admin_id, start_date, created_at
                    "#,
                )
                .bind(kameti_id)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;

        info!(
            "Released round {} of kameti {} to {} ({})",
            round, kameti_id, recipient, payout.amount
        );

        Ok(ReleaseOutcome::Released {
            payout,
            kameti,
            advance,
        })
    }

    pub async fn find_by_kameti(&self, kameti_id: Uuid) -> RepoResult<Vec<Payout>> {
        let payouts = sqlx::query_as::<_, Payout>(
            r#"
            SELECT id, kameti_id, round, recipient_id, amount, released_by, released_at
            FROM payouts
            WHERE kameti_id = $1
            ORDER BY round
            "#,
        )
        .bind(kameti_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payouts)
    }
}
