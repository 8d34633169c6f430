//! Participation account: one per (user, challenge).

use super::ids::{AccountKey, ChallengeId, ParticipantId, UserId, WalletId};
use super::trade::{Trade, TradeStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Ended,
}

/// Virtual trading account created when a user joins a challenge.
///
/// At every settlement point `current_balance` equals the initial balance,
/// minus the margin held by live trades, plus the net P&L of closed trades.
/// A cumulative-liquidation reset breaks the identity on purpose by restoring
/// the initial balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub challenge_id: ChallengeId,
    pub participant_id: ParticipantId,
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub joined_at: DateTime<Utc>,

    pub initial_balance: f64,
    pub current_balance: f64,
    pub daily_pnl: f64,
    pub daily_locked: bool,
    #[serde(default)]
    pub last_daily_reset: Option<NaiveDate>,
    /// Set when a cumulative liquidation could not burn tokens.
    #[serde(default)]
    pub trading_blocked: bool,

    pub trades: Vec<Trade>,

    pub max_contracts: u32,
    pub max_positions: usize,
    pub max_drawdown: f64,

    pub status: AccountStatus,
    #[serde(default)]
    pub last_eod: Option<DateTime<Utc>>,
}

impl Account {
    pub fn key(&self) -> AccountKey {
        AccountKey::new(self.challenge_id.clone(), self.participant_id.clone())
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Total P&L since the initial balance.
    pub fn cumulative_pnl(&self) -> f64 {
        self.current_balance - self.initial_balance
    }

    pub fn drawdown(&self) -> f64 {
        self.initial_balance - self.current_balance
    }

    /// Profit vs. the initial balance, as a percentage.
    pub fn profit_pct(&self) -> f64 {
        if self.initial_balance == 0.0 {
            return 0.0;
        }
        self.cumulative_pnl() / self.initial_balance * 100.0
    }

    pub fn open_positions(&self) -> usize {
        self.trades.iter().filter(|t| t.is_open()).count()
    }

    pub fn live_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.is_live()).count()
    }

    /// Open trades with their insertion index.
    pub fn open_trades(&self) -> impl Iterator<Item = (usize, &Trade)> {
        self.trades.iter().enumerate().filter(|(_, t)| t.is_open())
    }

    /// Closed trades, most recent first.
    pub fn history(&self) -> Vec<&Trade> {
        self.trades
            .iter()
            .rev()
            .filter(|t| t.status == TradeStatus::Closed)
            .collect()
    }

    pub fn reserved_margin(&self) -> f64 {
        self.trades
            .iter()
            .filter(|t| t.is_live())
            .map(|t| t.margin)
            .sum()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.trades.iter().filter_map(|t| t.pnl).sum()
    }
}
