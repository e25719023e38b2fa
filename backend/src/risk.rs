use serde::{Deserialize, Serialize};

/// Starting point before any history is taken into account
const BASE_SCORE: i64 = 50;

const ON_TIME_POINTS: i64 = 2;
const ON_TIME_CAP: i64 = 30;
const LATE_PENALTY: i64 = 5;
const MISSED_PENALTY: i64 = 10;
const REPAID_POINTS: i64 = 5;
const REPAID_CAP: i64 = 15;
const DEFAULT_PENALTY: i64 = 20;
const DISPUTE_PENALTY: i64 = 8;
const TENURE_BONUS: i64 = 5;
const TENURE_DAYS: i64 = 180;

const LOW_RISK_FLOOR: u8 = 70;
const MEDIUM_RISK_FLOOR: u8 = 40;

/// Risk bucket shown to lenders and used to gate borrowing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }

    fn from_score(score: u8) -> Self {
        if score >= LOW_RISK_FLOOR {
            RiskTier::Low
        } else if score >= MEDIUM_RISK_FLOOR {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }
}

/// Counts pulled from a user's history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskInputs {
    pub payments_on_time: i64,
    pub payments_late: i64,
    pub rounds_missed: i64,
    pub loans_repaid: i64,
    pub loans_defaulted: i64,
    pub disputes_lost: i64,
    pub account_age_days: i64,
}

/// Score in 0..=100, higher is safer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: u8,
    pub tier: RiskTier,
    pub inputs: RiskInputs,
}

/// Score a user's contribution, lending and dispute history.
pub fn score(inputs: RiskInputs) -> RiskScore {
    let on_time = (inputs.payments_on_time.max(0) * ON_TIME_POINTS).min(ON_TIME_CAP);
    let repaid = (inputs.loans_repaid.max(0) * REPAID_POINTS).min(REPAID_CAP);
    let tenure = if inputs.account_age_days >= TENURE_DAYS {
        TENURE_BONUS
    } else {
        0
    };

    let penalties = inputs.payments_late.max(0) * LATE_PENALTY
        + inputs.rounds_missed.max(0) * MISSED_PENALTY
        + inputs.loans_defaulted.max(0) * DEFAULT_PENALTY
        + inputs.disputes_lost.max(0) * DISPUTE_PENALTY;

    let raw = BASE_SCORE + on_time + repaid + tenure - penalties;
    let score = raw.clamp(0, 100) as u8;

    RiskScore {
        score,
        tier: RiskTier::from_score(score),
        inputs,
    }
}
