//! Challenge and participation lifecycle.
//!
//! Pure transitions over in-memory documents. The desk loads the documents,
//! applies one of these, and commits every touched document in one batch.

use crate::config::{ChallengeDefaults, TokenConfig};
use crate::domain::{
    new_document_id, Account, AccountStatus, Challenge, ChallengeId, ChallengeStatus, ParticipantId,
    TransactionKind, TransactionRecord, UserId, Wallet,
};
use crate::error::{LifecycleError, TradeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// A fresh challenge stamped with the configured defaults.
pub fn new_challenge(
    defaults: &ChallengeDefaults,
    name: impl Into<String>,
    description: Option<&str>,
    now: DateTime<Utc>,
) -> Challenge {
    Challenge {
        id: ChallengeId::new(new_document_id("prop_challenges")),
        name: name.into(),
        description: description.map_or_else(|| defaults.description.clone(), str::to_string),
        entry_fee: defaults.entry_fee,
        initial_balance: defaults.initial_balance,
        max_contracts: defaults.max_contracts,
        max_positions: defaults.max_positions,
        max_drawdown: defaults.max_drawdown,
        settlement: defaults.settlement,
        reward_token: defaults.reward_token.clone(),
        target_profit_pct: defaults.target_profit_pct,
        duration_days: defaults.duration_days,
        participants: 0,
        total_pool: 0.0,
        status: ChallengeStatus::Active,
        created_at: now,
    }
}

/// Pooled system wallet that receives entry fees.
pub fn new_pool_wallet(tokens: &TokenConfig) -> Wallet {
    Wallet::new(tokens.pool_wallet.as_str().into(), "system".into(), "Prop trading pool")
}

/// Everything one join produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    pub account: Account,
    pub transaction: TransactionRecord,
}

/// Move the entry fee from `wallet` to `pool`, bump the challenge counters
/// and seed a participation account from the challenge limits.
///
/// On error nothing has been mutated.
pub fn enroll(
    challenge: &mut Challenge,
    wallet: &mut Wallet,
    pool: &mut Wallet,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Enrollment, LifecycleError> {
    if !challenge.is_active() {
        return Err(LifecycleError::ChallengeInactive(challenge.id.to_string()));
    }
    let fee = challenge.entry_fee;
    let available = wallet.balance(token);
    if available < fee {
        return Err(LifecycleError::InsufficientEntryFee { required: fee, available });
    }

    wallet.debit(token, fee)?;
    pool.credit(token, fee)?;
    challenge.participants += 1;
    challenge.total_pool += fee;

    let account = Account {
        challenge_id: challenge.id.clone(),
        participant_id: ParticipantId::new(new_document_id("participants")),
        user_id: wallet.owner.clone(),
        wallet_id: wallet.id.clone(),
        joined_at: now,
        initial_balance: challenge.initial_balance,
        current_balance: challenge.initial_balance,
        daily_pnl: 0.0,
        daily_locked: false,
        last_daily_reset: Some(now.date_naive()),
        trading_blocked: false,
        trades: Vec::new(),
        max_contracts: challenge.max_contracts,
        max_positions: challenge.max_positions,
        max_drawdown: challenge.max_drawdown,
        status: AccountStatus::Active,
        last_eod: Some(now),
    };
    let transaction = TransactionRecord {
        from: wallet.owner.to_string(),
        to: format!("system:{}", pool.id),
        amount: fee,
        token: token.to_string(),
        kind: TransactionKind::ChallengeEntry,
        challenge_id: Some(challenge.id.clone()),
        timestamp: now,
    };
    info!(
        challenge = %challenge.id,
        user = %account.user_id,
        participant = %account.participant_id,
        fee,
        "joined challenge"
    );
    Ok(Enrollment { account, transaction })
}

/// Confirmation summary shown before joining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPreview {
    pub challenge: String,
    pub initial_balance: f64,
    pub max_contracts: u32,
    pub max_positions: usize,
    pub max_drawdown: f64,
    pub reward_token: String,
    pub entry_fee: f64,
    pub token: String,
    pub token_balance: f64,
}

impl JoinPreview {
    pub fn of(challenge: &Challenge, token: &str, token_balance: f64) -> Self {
        Self {
            challenge: challenge.name.clone(),
            initial_balance: challenge.initial_balance,
            max_contracts: challenge.max_contracts,
            max_positions: challenge.max_positions,
            max_drawdown: challenge.max_drawdown,
            reward_token: challenge.reward_token.clone(),
            entry_fee: challenge.entry_fee,
            token: token.to_string(),
            token_balance,
        }
    }
}

impl fmt::Display for JoinPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "join {}", self.challenge)?;
        writeln!(f, "  virtual balance: ${:.2}", self.initial_balance)?;
        writeln!(f, "  max contracts:   {}", self.max_contracts)?;
        writeln!(f, "  max positions:   {}", self.max_positions)?;
        writeln!(f, "  max drawdown:    ${:.2}", self.max_drawdown)?;
        writeln!(f, "  reward:          {}", self.reward_token)?;
        writeln!(
            f,
            "  entry fee:       {} {} (wallet holds {})",
            self.entry_fee, self.token, self.token_balance
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EodReport {
    pub total_pnl: f64,
    /// Positive total P&L qualifies for a reward-token payout.
    pub reward_eligible: bool,
    pub at: DateTime<Utc>,
}

/// End-of-day snapshot: `daily_pnl` takes the total P&L whatever its sign.
pub fn process_end_of_day(account: &mut Account, now: DateTime<Utc>) -> EodReport {
    let total_pnl = account.cumulative_pnl();
    account.last_eod = Some(now);
    account.daily_pnl = total_pnl;
    let report = EodReport { total_pnl, reward_eligible: total_pnl > 0.0, at: now };
    info!(account = %account.key(), total_pnl, reward_eligible = report.reward_eligible, "end of day processed");
    report
}

/// Leave a challenge. Refused while any trade is open or pending.
pub fn exit_challenge(account: &mut Account) -> Result<(), TradeError> {
    if account.status == AccountStatus::Ended {
        return Err(TradeError::AccountEnded);
    }
    let live = account.live_trades();
    if live > 0 {
        return Err(TradeError::OpenPositionsRemain(live));
    }
    account.status = AccountStatus::Ended;
    info!(account = %account.key(), balance = account.current_balance, "left challenge");
    Ok(())
}

/// Participation of `user` among `accounts`: the first active one.
pub fn pick_participation<'a>(
    accounts: impl IntoIterator<Item = &'a Account>,
    user: &UserId,
) -> Option<&'a Account> {
    accounts
        .into_iter()
        .find(|a| &a.user_id == user && a.is_active())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(tokens: f64) -> Wallet {
        Wallet::new("w1".into(), "alice".into(), "main").with_balance("CRNY", tokens)
    }

    #[test]
    fn enroll_moves_fee_and_seeds_account() {
        let now = Utc::now();
        let mut challenge = new_challenge(&ChallengeDefaults::default(), "NQ 100K", None, now);
        let mut w = wallet(5.0);
        let mut pool = new_pool_wallet(&TokenConfig::default());

        let e = enroll(&mut challenge, &mut w, &mut pool, "CRNY", now).unwrap();
        assert_eq!(w.balance("CRNY"), 4.0);
        assert_eq!(pool.balance("CRNY"), 1.0);
        assert_eq!(challenge.participants, 1);
        assert_eq!(challenge.total_pool, 1.0);
        assert_eq!(e.account.current_balance, 100_000.0);
        assert_eq!(e.account.max_contracts, 7);
        assert_eq!(e.transaction.to, "system:prop_trading");
        assert_eq!(e.transaction.kind, TransactionKind::ChallengeEntry);
    }

    #[test]
    fn enroll_rejects_short_wallet_untouched() {
        let now = Utc::now();
        let mut challenge = new_challenge(&ChallengeDefaults::default(), "NQ", None, now);
        challenge.entry_fee = 3.0;
        let mut w = wallet(2.5);
        let mut pool = new_pool_wallet(&TokenConfig::default());
        let err = enroll(&mut challenge, &mut w, &mut pool, "CRNY", now).unwrap_err();
        assert!(matches!(err, LifecycleError::InsufficientEntryFee { .. }));
        assert_eq!(w.balance("CRNY"), 2.5);
        assert_eq!(challenge.participants, 0);
    }

    #[test]
    fn eod_snapshots_total_pnl() {
        let now = Utc::now();
        let mut challenge = new_challenge(&ChallengeDefaults::default(), "NQ", None, now);
        let mut w = wallet(5.0);
        let mut pool = new_pool_wallet(&TokenConfig::default());
        let mut account = enroll(&mut challenge, &mut w, &mut pool, "CRNY", now).unwrap().account;
        account.current_balance = 99_250.0;
        account.daily_pnl = -20.0;

        let report = process_end_of_day(&mut account, now);
        assert_eq!(report.total_pnl, -750.0);
        assert!(!report.reward_eligible);
        assert_eq!(account.daily_pnl, -750.0);
        assert_eq!(account.last_eod, Some(now));
    }
}
