use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created, waiting on the gateway or a receipt
    Pending,
    /// Receipt uploaded, waiting on the kameti admin
    AwaitingConfirmation,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "awaiting_confirmation" => Ok(PaymentStatus::AwaitingConfirmation),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::AwaitingConfirmation => "awaiting_confirmation",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// How the contribution is being paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Hosted checkout with a signed callback
    Gateway,
    /// Bank transfer with an uploaded receipt
    Manual,
}

impl PaymentMethod {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "gateway" => Ok(PaymentMethod::Gateway),
            "manual" => Ok(PaymentMethod::Manual),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Gateway => "gateway",
            PaymentMethod::Manual => "manual",
        }
    }
}

/// Contribution for one kameti round
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub kameti_id: Uuid,
    pub user_id: Uuid,
    pub round: i32,
    pub amount: Decimal,
    pub method: String,
    pub status: String,
    pub gateway_reference: Option<String>,
    pub receipt_path: Option<String>,
    pub created_at: NaiveDateTime,
    pub paid_at: Option<NaiveDateTime>,
}

impl Payment {
    /// Get status as an enum
    pub fn status_enum(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.status).unwrap_or(PaymentStatus::Pending)
    }

    pub fn method_enum(&self) -> PaymentMethod {
        PaymentMethod::from_str(&self.method).unwrap_or(PaymentMethod::Gateway)
    }

    pub fn is_completed(&self) -> bool {
        self.status_enum() == PaymentStatus::Completed
    }
}
