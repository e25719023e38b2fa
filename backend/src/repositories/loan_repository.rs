//! Loans and pledges

use crate::error::{RepoResult, RepositoryError};
use crate::models::{Loan, LoanStatus, Pledge};
use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Repository for loan data access
pub struct LoanRepository {
    pool: PgPool,
}

impl LoanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        borrower_id: Uuid,
        amount: Decimal,
        interest_rate: Decimal,
        term_days: i32,
        purpose: &str,
    ) -> RepoResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (borrower_id, amount, interest_rate, term_days, purpose)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, borrower_id, amount, interest_rate, term_days, purpose, status,
                      funded_amount, repaid_amount, created_at, funded_at, due_at
            "#,
        )
        .bind(borrower_id)
        .bind(amount)
        .bind(interest_rate)
        .bind(term_days)
        .bind(purpose)
        .fetch_one(&self.pool)
        .await?;

        Ok(loan)
    }

    pub async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, borrower_id, amount, interest_rate, term_days, purpose, status,
                   funded_amount, repaid_amount, created_at, funded_at, due_at
            FROM loans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(loan)
    }

    /// Loans still collecting pledges, newest first
    pub async fn find_open(&self, limit: i64, offset: i64) -> RepoResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, borrower_id, amount, interest_rate, term_days, purpose, status,
                   funded_amount, repaid_amount, created_at, funded_at, due_at
            FROM loans
            WHERE status = 'open'
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    pub async fn find_by_borrower(&self, borrower_id: Uuid) -> RepoResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, borrower_id, amount, interest_rate, term_days, purpose, status,
                   funded_amount, repaid_amount, created_at, funded_at, due_at
            FROM loans
            WHERE borrower_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(borrower_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    /// Loans the user has an active pledge on
    pub async fn find_pledged_by(&self, lender_id: Uuid) -> RepoResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT l.id, l.borrower_id, l.amount, l.interest_rate, l.term_days, l.purpose, l.status,
                   l.funded_amount, l.repaid_amount, l.created_at, l.funded_at, l.due_at
            FROM loans l
            WHERE EXISTS (
                SELECT 1 FROM pledges p
                WHERE p.loan_id = l.id AND p.lender_id = $1 AND p.status = 'active'
            )
            ORDER BY l.created_at DESC
            "#,
        )
        .bind(lender_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    /// Whether the borrower already has an open or funded loan
    pub async fn has_active_by_borrower(&self, borrower_id: Uuid) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM loans
                WHERE borrower_id = $1 AND status IN ('open', 'funded')
            )
            "#,
        )
        .bind(borrower_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    pub async fn count_by_status(&self, borrower_id: Uuid, status: LoanStatus) -> RepoResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE borrower_id = $1 AND status = $2")
                .bind(borrower_id)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    pub async fn find_pledges(&self, loan_id: Uuid) -> RepoResult<Vec<Pledge>> {
        let pledges = sqlx::query_as::<_, Pledge>(
            r#"
            SELECT id, loan_id, lender_id, amount, status, created_at
            FROM pledges
            WHERE loan_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(pledges)
    }

    /// Pledge towards an open loan; the pledge that fills it funds the loan
    pub async fn add_pledge(
        &self,
        loan_id: Uuid,
        lender_id: Uuid,
        amount: Decimal,
        now: NaiveDateTime,
    ) -> RepoResult<(Loan, Pledge)> {
        let mut tx = self.pool.begin().await?;
        let loan = lock_loan(&mut tx, loan_id).await?;

        if loan.status_enum() != LoanStatus::Open {
            return Err(RepositoryError::BusinessRule(
                "Only open loans accept pledges".to_string(),
            ));
        }

        let remaining = loan.remaining_to_fund();
        if amount > remaining {
            return Err(RepositoryError::InvalidInput(format!(
                "Pledge exceeds the remaining amount ({})",
                remaining
            )));
        }

        let pledge = sqlx::query_as::<_, Pledge>(
            r#"
            INSERT INTO pledges (loan_id, lender_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, loan_id, lender_id, amount, status, created_at
            "#,
        )
        .bind(loan_id)
        .bind(lender_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        let funded_amount = loan.funded_amount + amount;
        let fully_funded = funded_amount >= loan.amount;
        let (status, funded_at, due_at) = if fully_funded {
            (
                LoanStatus::Funded,
                Some(now),
                Some(now + Duration::days(i64::from(loan.term_days))),
            )
        } else {
            (LoanStatus::Open, None, None)
        };

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET funded_amount = $2, status = $3, funded_at = $4, due_at = $5
            WHERE id = $1
            RETURNING id, borrower_id, amount, interest_rate, term_days, purpose, status,
                      funded_amount, repaid_amount, created_at, funded_at, due_at
            "#,
        )
        .bind(loan_id)
        .bind(funded_amount)
        .bind(status.as_str())
        .bind(funded_at)
        .bind(due_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((loan, pledge))
    }

    /// Apply a repayment to a funded loan
    pub async fn record_repayment(&self, loan_id: Uuid, amount: Decimal) -> RepoResult<Loan> {
        let mut tx = self.pool.begin().await?;
        let loan = lock_loan(&mut tx, loan_id).await?;

        if loan.status_enum() != LoanStatus::Funded {
            return Err(RepositoryError::BusinessRule(
                "Only funded loans can be repaid".to_string(),
            ));
        }

        let outstanding = loan.outstanding();
        if amount > outstanding {
            return Err(RepositoryError::InvalidInput(format!(
                "Repayment exceeds the outstanding amount ({})",
                outstanding
            )));
        }

        let repaid_amount = loan.repaid_amount + amount;
        let status = if repaid_amount >= loan.total_due() {
            LoanStatus::Repaid
        } else {
            LoanStatus::Funded
        };

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET repaid_amount = $2, status = $3
            WHERE id = $1
            RETURNING id, borrower_id, amount, interest_rate, term_days, purpose, status,
                      funded_amount, repaid_amount, created_at, funded_at, due_at
            "#,
        )
        .bind(loan_id)
        .bind(repaid_amount)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(loan)
    }

    /// Withdraw an open loan and release its pledges
    pub async fn cancel(&self, loan_id: Uuid) -> RepoResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = 'cancelled'
            WHERE id = $1 AND status = 'open'
            RETURNING id, borrower_id, amount, interest_rate, term_days, purpose, status,
                      funded_amount, repaid_amount, created_at, funded_at, due_at
            "#,
        )
        .bind(loan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            RepositoryError::BusinessRule("Only open loans can be cancelled".to_string())
        })?;

        sqlx::query("UPDATE pledges SET status = 'cancelled' WHERE loan_id = $1")
            .bind(loan_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(loan)
    }

    /// Default every funded loan whose due date has passed
    pub async fn mark_overdue_defaulted(&self, now: NaiveDateTime) -> RepoResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = 'defaulted'
            WHERE status = 'funded' AND due_at < $1
            RETURNING id, borrower_id, amount, interest_rate, term_days, purpose, status,
                      funded_amount, repaid_amount, created_at, funded_at, due_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }
}

async fn lock_loan(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> RepoResult<Loan> {
    sqlx::query_as::<_, Loan>(
        r#"
        SELECT id, borrower_id, amount, interest_rate, term_days, purpose, status,
               funded_amount, repaid_amount, created_at, funded_at, due_at
        FROM loans
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| RepositoryError::NotFound(format!("Loan {} not found", id)))
}
