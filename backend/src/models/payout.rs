use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Pot released to one member at the end of a round
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payout {
    pub id: Uuid,
    pub kameti_id: Uuid,
    pub round: i32,
    pub recipient_id: Uuid,
    pub amount: Decimal,
    pub released_by: Option<Uuid>, // None when released automatically
    pub released_at: NaiveDateTime,
}
