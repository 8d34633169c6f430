//! Append-only audit records: liquidations and token transfers.

use super::ids::{ChallengeId, ParticipantId, UserId, WalletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidationReason {
    CumulativeLoss,
}

/// One entry of `liquidation_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub challenge_id: ChallengeId,
    pub participant_id: ParticipantId,
    pub tokens_burned: f64,
    pub reason: LiquidationReason,
    /// Cumulative P&L at the moment of liquidation (negative).
    pub loss_amount: f64,
    pub remaining_tokens: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    ChallengeEntry,
}

/// One entry of `transactions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub token: String,
    pub kind: TransactionKind,
    pub challenge_id: Option<ChallengeId>,
    pub timestamp: DateTime<Utc>,
}
