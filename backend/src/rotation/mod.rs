//! Payout rotation: readiness checks and round advancement.
//!
//! A kameti with `n` members runs `n` rounds. In every round each member pays
//! the fixed contribution and the member holding that round's payout position
//! receives the whole pot. These functions hold the rules; the payout service
//! applies them inside a database transaction.

pub mod schedule;

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

pub use schedule::{round_due_date, round_opens_on, RoundWindow};

/// Errors from the rotation rules
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RotationError {
    #[error("Round {round} is outside 1..={total_rounds}")]
    RoundOutOfRange { round: i32, total_rounds: i32 },

    #[error("Kameti has no rounds")]
    NoRounds,
}

/// Outcome of closing a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "round", rename_all = "snake_case")]
pub enum RoundAdvance {
    /// Rotation continues with this round
    Next(i32),
    /// Last round paid out, kameti closes
    Completed,
}

/// Minimal view of a member used by the rotation rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationMember {
    pub user_id: Uuid,
    pub payout_position: Option<i32>,
    pub has_received_payout: bool,
}

/// Readiness of one round for payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutReadiness {
    pub round: i32,
    pub paid: Vec<Uuid>,
    pub outstanding: Vec<Uuid>,
    /// Member whose payout position matches the round
    pub recipient: Option<Uuid>,
    pub ready: bool,
}

/// Work out which members have paid for `round` and whether the pot can go out.
///
/// `completed_payers` are the users holding a completed payment for the round;
/// payers who are not members are ignored.
pub fn payout_readiness(
    round: i32,
    members: &[RotationMember],
    completed_payers: &[Uuid],
) -> PayoutReadiness {
    let payers: HashSet<Uuid> = completed_payers.iter().copied().collect();

    let (paid, outstanding): (Vec<&RotationMember>, Vec<&RotationMember>) =
        members.iter().partition(|m| payers.contains(&m.user_id));

    let recipient = members
        .iter()
        .find(|m| m.payout_position == Some(round));

    let ready = !members.is_empty()
        && outstanding.is_empty()
        && recipient.is_some_and(|r| !r.has_received_payout);

    PayoutReadiness {
        round,
        paid: paid.iter().map(|m| m.user_id).collect(),
        outstanding: outstanding.iter().map(|m| m.user_id).collect(),
        recipient: recipient.map(|r| r.user_id),
        ready,
    }
}

/// Move past `current_round` once its payout is released.
pub fn advance_round(current_round: i32, total_rounds: i32) -> Result<RoundAdvance, RotationError> {
    if total_rounds <= 0 {
        return Err(RotationError::NoRounds);
    }
    if current_round < 1 || current_round > total_rounds {
        return Err(RotationError::RoundOutOfRange {
            round: current_round,
            total_rounds,
        });
    }

    if current_round < total_rounds {
        Ok(RoundAdvance::Next(current_round + 1))
    } else {
        Ok(RoundAdvance::Completed)
    }
}

/// Hand out payout positions 1..=n in join order.
///
/// Input pairs are `(user_id, joined_at)`; ties fall back to the user id so the
/// order is stable.
pub fn assign_positions<T: Ord + Copy>(members: &[(Uuid, T)]) -> Vec<(Uuid, i32)> {
    let mut ordered: Vec<(Uuid, T)> = members.to_vec();
    ordered.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    ordered
        .into_iter()
        .zip(1..)
        .map(|((user_id, _), position)| (user_id, position))
        .collect()
}

/// Pot for one round: every member pays the contribution once
pub fn pool_amount(contribution: Decimal, members: usize) -> Decimal {
    contribution * Decimal::from(members as u64)
}
