use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kameti lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KametiStatus {
    /// Accepting members, rounds not started
    Pending,
    /// Rounds running
    Active,
    /// Every member has received a payout
    Completed,
    Cancelled,
}

impl KametiStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(KametiStatus::Pending),
            "active" => Ok(KametiStatus::Active),
            "completed" => Ok(KametiStatus::Completed),
            "cancelled" => Ok(KametiStatus::Cancelled),
            _ => Err(format!("Invalid kameti status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            KametiStatus::Pending => "pending",
            KametiStatus::Active => "active",
            KametiStatus::Completed => "completed",
            KametiStatus::Cancelled => "cancelled",
        }
    }
}

impl From<String> for KametiStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(KametiStatus::Pending)
    }
}

/// How often a round comes around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
}

impl Frequency {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            "monthly" => Ok(Frequency::Monthly),
            _ => Err(format!("Invalid frequency: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
        }
    }
}

/// Kameti (rotating savings committee)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Kameti {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub contribution_amount: Decimal,
    pub frequency: String, // Stored as TEXT, use Frequency enum for type safety
    pub max_members: i32,
    pub total_rounds: i32, // 0 until started
    pub current_round: i32, // 1-based once started
    pub status: String, // Stored as TEXT, use KametiStatus enum for type safety
    pub admin_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

impl Kameti {
    /// Get status as an enum
    pub fn status_enum(&self) -> KametiStatus {
        KametiStatus::from_str(&self.status).unwrap_or(KametiStatus::Pending)
    }

    /// Get frequency as an enum
    pub fn frequency_enum(&self) -> Frequency {
        Frequency::from_str(&self.frequency).unwrap_or(Frequency::Monthly)
    }

    pub fn is_pending(&self) -> bool {
        self.status_enum() == KametiStatus::Pending
    }

    pub fn is_active(&self) -> bool {
        self.status_enum() == KametiStatus::Active
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.admin_id == user_id
    }

    /// Pot paid out each round
    pub fn payout_amount(&self) -> Decimal {
        crate::rotation::pool_amount(self.contribution_amount, self.total_rounds as usize)
    }
}
