//! Peer-to-peer loan and pledge models

use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Loan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// Collecting pledges
    Open,
    /// Fully pledged, repayment running
    Funded,
    Repaid,
    Defaulted,
    Cancelled,
}

impl LoanStatus {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "open" => Ok(LoanStatus::Open),
            "funded" => Ok(LoanStatus::Funded),
            "repaid" => Ok(LoanStatus::Repaid),
            "defaulted" => Ok(LoanStatus::Defaulted),
            "cancelled" => Ok(LoanStatus::Cancelled),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Open => "open",
            LoanStatus::Funded => "funded",
            LoanStatus::Repaid => "repaid",
            LoanStatus::Defaulted => "defaulted",
            LoanStatus::Cancelled => "cancelled",
        }
    }
}

/// Loan request
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: Uuid,
    pub borrower_id: Uuid,
    pub amount: Decimal,
    pub interest_rate: Decimal, // percent
    pub term_days: i32,
    pub purpose: String,
    pub status: String,
    pub funded_amount: Decimal,
    pub repaid_amount: Decimal,
    pub created_at: NaiveDateTime,
    pub funded_at: Option<NaiveDateTime>,
    pub due_at: Option<NaiveDateTime>,
}

impl Loan {
    pub fn status_enum(&self) -> LoanStatus {
        LoanStatus::from_str(&self.status).unwrap_or(LoanStatus::Open)
    }

    /// Principal plus interest
    pub fn total_due(&self) -> Decimal {
        total_due(self.amount, self.interest_rate)
    }

    /// Amount still needed before the loan is fully pledged
    pub fn remaining_to_fund(&self) -> Decimal {
        (self.amount - self.funded_amount).max(Decimal::ZERO)
    }

    /// Amount the borrower still owes
    pub fn outstanding(&self) -> Decimal {
        (self.total_due() - self.repaid_amount).max(Decimal::ZERO)
    }

    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        self.status_enum() == LoanStatus::Funded && self.due_at.is_some_and(|due| due < now)
    }
}

/// `amount * (1 + rate / 100)`, rounded half-up to cents
pub fn total_due(amount: Decimal, interest_rate: Decimal) -> Decimal {
    let interest = amount * interest_rate / Decimal::ONE_HUNDRED;
    (amount + interest).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Pledge status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PledgeStatus {
    Active,
    Cancelled,
}

impl PledgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PledgeStatus::Active => "active",
            PledgeStatus::Cancelled => "cancelled",
        }
    }
}

/// A lender's commitment towards a loan
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pledge {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub lender_id: Uuid,
    pub amount: Decimal,
    pub status: String,
    pub created_at: NaiveDateTime,
}
