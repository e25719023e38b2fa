use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Member role in a kameti
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

impl MemberRole {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(MemberRole::Admin),
            "member" => Ok(MemberRole::Member),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }
}

impl From<String> for MemberRole {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(MemberRole::Member)
    }
}

/// A user's membership in a kameti
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KametiMember {
    pub kameti_id: Uuid,
    pub user_id: Uuid,
    pub role: String, // Stored as TEXT in DB, use MemberRole enum for type safety
    pub payout_position: Option<i32>,
    pub has_received_payout: bool,
    pub joined_at: NaiveDateTime,
}

impl KametiMember {
    /// Get the role as an enum
    pub fn role_enum(&self) -> MemberRole {
        MemberRole::from_str(&self.role).unwrap_or(MemberRole::Member)
    }

    /// Check if member is an admin
    pub fn is_admin(&self) -> bool {
        self.role_enum() == MemberRole::Admin
    }
}

/// Membership joined with the member's display name
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemberWithUser {
    pub user_id: Uuid,
    pub full_name: String,
    pub role: String,
    pub payout_position: Option<i32>,
    pub has_received_payout: bool,
    pub joined_at: NaiveDateTime,
}
