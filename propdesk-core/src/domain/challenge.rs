use super::ids::ChallengeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Active,
    Closed,
}

/// Settlement cadence of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Settlement {
    /// End of day.
    Eod,
}

/// Prop-trading challenge definition plus its running counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub name: String,
    pub description: String,
    /// Entry fee in governance tokens.
    pub entry_fee: f64,
    pub initial_balance: f64,
    pub max_contracts: u32,
    pub max_positions: usize,
    pub max_drawdown: f64,
    pub settlement: Settlement,
    pub reward_token: String,
    pub target_profit_pct: f64,
    pub duration_days: u32,

    pub participants: u32,
    /// Entry fees collected so far.
    pub total_pool: f64,
    pub status: ChallengeStatus,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    pub fn is_active(&self) -> bool {
        self.status == ChallengeStatus::Active
    }
}
