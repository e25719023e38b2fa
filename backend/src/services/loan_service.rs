use crate::error::{AppError, AppResult, RepositoryError};
use crate::models::{Loan, LoanStatus, NotificationKind, Pledge, PledgeStatus, User};
use crate::repositories::{LoanRepository, NewNotification};
use crate::risk::RiskTier;
use crate::services::access::validate_amount;
use crate::services::notification_service::page_size;
use crate::services::{AuditTrailService, NotificationService, RiskService};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_TERM_DAYS: i32 = 365;
const MAX_PURPOSE_LEN: usize = 500;

/// A loan request as submitted by the borrower
#[derive(Debug, Clone)]
pub struct NewLoan<'a> {
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub term_days: i32,
    pub purpose: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanDetail {
    pub loan: Loan,
    pub pledges: Vec<Pledge>,
    pub total_due: Decimal,
    pub outstanding: Decimal,
    pub overdue: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MyLoans {
    pub borrowed: Vec<Loan>,
    pub pledged: Vec<Loan>,
}

/// Peer-to-peer lending between members
pub struct LoanService {
    loan_repo: Arc<LoanRepository>,
    risk: Arc<RiskService>,
    notifications: Arc<NotificationService>,
    audit: Arc<AuditTrailService>,
}

impl LoanService {
    pub fn new(
        loan_repo: Arc<LoanRepository>,
        risk: Arc<RiskService>,
        notifications: Arc<NotificationService>,
        audit: Arc<AuditTrailService>,
    ) -> Self {
        Self {
            loan_repo,
            risk,
            notifications,
            audit,
        }
    }

    /// Ask for a loan; high-risk borrowers and borrowers with a live loan are refused
    pub async fn request(&self, user: &User, form: NewLoan<'_>) -> AppResult<Loan> {
        let purpose = validate_request(&form)?;

        let score = self.risk.score_for(user).await?;
        if score.tier == RiskTier::High {
            return Err(AppError::BusinessLogic(format!(
                "Your risk score ({}) is too low to borrow",
                score.score
            )));
        }

        if self.loan_repo.has_active_by_borrower(user.id).await? {
            return Err(live_loan_conflict());
        }

        // The partial unique index catches a concurrent request that passed the check above
        let loan = self
            .loan_repo
            .create(user.id, form.amount, form.interest_rate, form.term_days, purpose)
            .await
            .map_err(|e| match e {
                RepositoryError::Duplicate(_) => live_loan_conflict(),
                other => other.into(),
            })?;

        info!("Loan {} requested by {} for {}", loan.id, user.id, loan.amount);
        Ok(loan)
    }

    pub async fn list_open(&self, limit: Option<i64>, offset: Option<i64>) -> AppResult<Vec<Loan>> {
        let limit = page_size(limit)?;
        Ok(self.loan_repo.find_open(limit, offset.unwrap_or(0).max(0)).await?)
    }

    pub async fn list_mine(&self, user: &User) -> AppResult<MyLoans> {
        Ok(MyLoans {
            borrowed: self.loan_repo.find_by_borrower(user.id).await?,
            pledged: self.loan_repo.find_pledged_by(user.id).await?,
        })
    }

    pub async fn get(&self, loan_id: Uuid) -> AppResult<LoanDetail> {
        let loan = self.load(loan_id).await?;
        let pledges = self.loan_repo.find_pledges(loan_id).await?;
        let now = chrono::Utc::now().naive_utc();
        Ok(LoanDetail {
            total_due: loan.total_due(),
            outstanding: loan.outstanding(),
            overdue: loan.is_overdue(now),
            loan,
            pledges,
        })
    }

    pub async fn pledge(&self, loan_id: Uuid, user: &User, amount: Decimal) -> AppResult<Loan> {
        validate_amount("amount", amount)?;

        let loan = self.load(loan_id).await?;
        if loan.borrower_id == user.id {
            return Err(AppError::BusinessLogic("You cannot fund your own loan".to_string()));
        }

        let now = chrono::Utc::now().naive_utc();
        let (loan, pledge) = self.loan_repo.add_pledge(loan_id, user.id, amount, now).await?;
        info!("Pledge {} of {} on loan {}", pledge.id, amount, loan_id);

        let message = format!("{} pledged {} towards your loan", user.full_name, amount);
        self.notify(loan.borrower_id, "New pledge", &message, loan.id).await;

        if loan.status_enum() == LoanStatus::Funded {
            self.on_funded(&loan).await?;
        }

        Ok(loan)
    }

    pub async fn repay(&self, loan_id: Uuid, user: &User, amount: Decimal) -> AppResult<Loan> {
        validate_amount("amount", amount)?;

        let loan = self.load(loan_id).await?;
        require_borrower(&loan, user)?;

        let loan = self.loan_repo.record_repayment(loan_id, amount).await?;
        if let Err(e) = self.audit.log_loan_repayment(&loan, amount).await {
            warn!("Failed to audit repayment on loan {}: {}", loan.id, e);
        }

        if loan.status_enum() == LoanStatus::Repaid {
            info!("Loan {} fully repaid", loan.id);
            let message = format!("A loan you funded ({}) has been fully repaid", loan.amount);
            for lender in self.lenders(loan.id).await? {
                self.notify(lender, "Loan repaid", &message, loan.id).await;
            }
        }

        Ok(loan)
    }

    pub async fn cancel(&self, loan_id: Uuid, user: &User) -> AppResult<Loan> {
        let loan = self.load(loan_id).await?;
        require_borrower(&loan, user)?;

        let lenders = self.lenders(loan_id).await?;
        let loan = self.loan_repo.cancel(loan_id).await?;

        let message = format!("A loan request you pledged to ({}) was withdrawn", loan.amount);
        for lender in lenders {
            self.notify(lender, "Loan cancelled", &message, loan.id).await;
        }

        info!("Loan {} cancelled", loan.id);
        Ok(loan)
    }

    async fn on_funded(&self, loan: &Loan) -> AppResult<()> {
        info!("Loan {} fully funded", loan.id);
        if let Err(e) = self.audit.log_loan_funded(loan).await {
            warn!("Failed to audit funding of loan {}: {}", loan.id, e);
        }

        let due = loan
            .due_at
            .map(|d| d.date().to_string())
            .unwrap_or_default();
        let message = format!("Your loan of {} is fully funded. Repayment is due by {}", loan.amount, due);
        self.notify(loan.borrower_id, "Loan funded", &message, loan.id).await;

        let message = format!("A loan you pledged to ({}) is now fully funded", loan.amount);
        for lender in self.lenders(loan.id).await? {
            self.notify(lender, "Loan funded", &message, loan.id).await;
        }
        Ok(())
    }

    async fn lenders(&self, loan_id: Uuid) -> AppResult<HashSet<Uuid>> {
        let pledges = self.loan_repo.find_pledges(loan_id).await?;
        Ok(pledges
            .into_iter()
            .filter(|p| p.status == PledgeStatus::Active.as_str())
            .map(|p| p.lender_id)
            .collect())
    }

    async fn notify(&self, user_id: Uuid, title: &str, message: &str, loan_id: Uuid) {
        self.notifications
            .notify_user(
                user_id,
                NewNotification {
                    kind: NotificationKind::Loan,
                    title,
                    message,
                    reference_id: Some(loan_id),
                },
            )
            .await;
    }

    async fn load(&self, loan_id: Uuid) -> AppResult<Loan> {
        self.loan_repo
            .find_by_id(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", loan_id)))
    }
}

fn live_loan_conflict() -> AppError {
    AppError::Conflict("You already have an open or funded loan".to_string())
}

fn require_borrower(loan: &Loan, user: &User) -> AppResult<()> {
    if loan.borrower_id == user.id {
        Ok(())
    } else {
        Err(AppError::Forbidden("Only the borrower can do this".to_string()))
    }
}

fn validate_request<'a>(form: &NewLoan<'a>) -> AppResult<&'a str> {
    validate_amount("amount", form.amount)?;
    if form.interest_rate < Decimal::ZERO || form.interest_rate > Decimal::ONE_HUNDRED {
        return Err(AppError::Validation(
            "interest_rate must be between 0 and 100".to_string(),
        ));
    }
    if form.interest_rate.normalize().scale() > 2 {
        return Err(AppError::Validation(
            "interest_rate cannot have more than 2 decimal places".to_string(),
        ));
    }
    if !(1..=MAX_TERM_DAYS).contains(&form.term_days) {
        return Err(AppError::Validation(format!(
            "term_days must be between 1 and {}",
            MAX_TERM_DAYS
        )));
    }

    let purpose = form.purpose.trim();
    if purpose.is_empty() {
        return Err(AppError::Validation("purpose is required".to_string()));
    }
    if purpose.chars().count() > MAX_PURPOSE_LEN {
        return Err(AppError::Validation(format!(
            "purpose must be at most {} characters",
            MAX_PURPOSE_LEN
        )));
    }
    Ok(purpose)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(amount: i64, rate: i64, term_days: i32) -> NewLoan<'static> {
        NewLoan {
            amount: Decimal::new(amount, 0),
            interest_rate: Decimal::new(rate, 0),
            term_days,
            purpose: " shop stock ",
        }
    }

    #[test]
    fn test_validate_request() {
        assert_eq!(validate_request(&form(1000, 10, 30)).unwrap(), "shop stock");
        assert!(validate_request(&form(1000, 0, 1)).is_ok());
        assert!(validate_request(&form(1000, 100, 365)).is_ok());

        assert!(validate_request(&form(0, 10, 30)).is_err());
        assert!(validate_request(&form(1000, 101, 30)).is_err());
        assert!(validate_request(&form(1000, -1, 30)).is_err());
        assert!(validate_request(&form(1000, 10, 0)).is_err());
        assert!(validate_request(&form(1000, 10, 366)).is_err());
    }

    #[test]
    fn test_sub_cent_amounts_rejected() {
        let mut f = form(1000, 10, 30);
        f.amount = Decimal::new(1099995, 3);
        assert!(validate_request(&f).is_err());

        f.amount = Decimal::new(109999, 2);
        assert!(validate_request(&f).is_ok());
    }

    #[test]
    fn test_purpose_required() {
        let mut f = form(100, 5, 10);
        f.purpose = "   ";
        assert!(validate_request(&f).is_err());
    }
}
