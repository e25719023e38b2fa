use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Dispute status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    /// Upheld in favour of the raiser
    Resolved,
    /// Dismissed
    Rejected,
}

impl DisputeStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "open" => Ok(DisputeStatus::Open),
            "under_review" => Ok(DisputeStatus::UnderReview),
            "resolved" => Ok(DisputeStatus::Resolved),
            "rejected" => Ok(DisputeStatus::Rejected),
            _ => Err(format!("Invalid dispute status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::UnderReview => "under_review",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputeStatus::Resolved | DisputeStatus::Rejected)
    }

    /// Whether a moderator may move a dispute from `self` to `next`
    pub fn can_transition_to(&self, next: DisputeStatus) -> bool {
        match (self, next) {
            (DisputeStatus::Open, DisputeStatus::UnderReview) => true,
            (DisputeStatus::Open | DisputeStatus::UnderReview, n) => n.is_terminal(),
            _ => false,
        }
    }
}

/// Complaint raised inside a kameti
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub kameti_id: Uuid,
    pub raised_by: Uuid,
    pub respondent_id: Option<Uuid>,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub resolution: Option<String>,
    pub evidence_path: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

impl Dispute {
    pub fn status_enum(&self) -> DisputeStatus {
        DisputeStatus::from_str(&self.status).unwrap_or(DisputeStatus::Open)
    }

    pub fn is_open(&self) -> bool {
        self.status_enum() == DisputeStatus::Open
    }
}
