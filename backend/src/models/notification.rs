use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Kameti,
    Payment,
    Payout,
    Dispute,
    Loan,
    Reminder,
}

impl NotificationKind {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "kameti" => Ok(NotificationKind::Kameti),
            "payment" => Ok(NotificationKind::Payment),
            "payout" => Ok(NotificationKind::Payout),
            "dispute" => Ok(NotificationKind::Dispute),
            "loan" => Ok(NotificationKind::Loan),
            "reminder" => Ok(NotificationKind::Reminder),
            _ => Err(format!("Invalid notification kind: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Kameti => "kameti",
            NotificationKind::Payment => "payment",
            NotificationKind::Payout => "payout",
            NotificationKind::Dispute => "dispute",
            NotificationKind::Loan => "loan",
            NotificationKind::Reminder => "reminder",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub reference_id: Option<Uuid>,
    #[serde(skip_serializing)]
    pub dedupe_key: Option<String>,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}
