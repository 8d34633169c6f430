//! Risk governor: daily loss lock, cumulative liquidation with token burn.
//!
//! After every close the settlement pass runs in a fixed order:
//! apply realized P&L → daily-limit check → cumulative-liquidation check.

use crate::config::RiskConfig;
use crate::domain::{Account, AccountStatus, LiquidationReason, LiquidationRecord, Wallet};
use crate::error::TradeError;
use crate::slots::calculate_slots;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Risk transitions reported to the caller of a settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RiskEvent {
    DailyLimitBreached {
        daily_pnl: f64,
        limit: f64,
    },
    CumulativeLiquidation {
        record: LiquidationRecord,
        /// Slot count recomputed from the post-burn wallet balance.
        slots: u32,
    },
    /// Liquidation was due but the wallet could not cover the burn.
    InsufficientTokenBlock {
        required: f64,
        available: f64,
        cumulative_pnl: f64,
    },
}

/// Result of `check_cumulative_liquidation`.
#[derive(Debug, Clone, PartialEq)]
pub enum LiquidationOutcome {
    NotTriggered,
    Liquidated { record: LiquidationRecord, slots: u32 },
    Blocked { required: f64, available: f64 },
}

impl LiquidationOutcome {
    /// True for both a burn and a block.
    pub fn triggered(&self) -> bool {
        !matches!(self, LiquidationOutcome::NotTriggered)
    }
}

/// Everything one settlement pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    /// Net realized P&L fed to the daily check (margin excluded).
    pub net_pnl: f64,
    pub events: Vec<RiskEvent>,
}

impl SettlementReport {
    /// The pass breached the daily loss limit.
    pub fn daily_locked(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, RiskEvent::DailyLimitBreached { .. }))
    }

    /// Audit record of the burn, if one happened.
    pub fn liquidation(&self) -> Option<&LiquidationRecord> {
        self.events.iter().find_map(|e| match e {
            RiskEvent::CumulativeLiquidation { record, .. } => Some(record),
            _ => None,
        })
    }

    /// Liquidation was due but could not burn.
    pub fn blocked(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, RiskEvent::InsufficientTokenBlock { .. }))
    }
}

/// Stateless rule set applied to one account at a time.
#[derive(Debug, Clone)]
pub struct RiskGovernor {
    config: RiskConfig,
    governance_token: String,
}

impl RiskGovernor {
    /// Governor enforcing `config`, burning `governance_token` on liquidation.
    pub fn new(config: RiskConfig, governance_token: impl Into<String>) -> Self {
        Self { config, governance_token: governance_token.into() }
    }

    /// Limits, burn and fee in force.
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Token debited by a liquidation burn.
    pub fn governance_token(&self) -> &str {
        &self.governance_token
    }

    /// Reset the daily counters when the UTC date has rolled over.
    ///
    /// Returns true if a reset happened. Idempotent within one day.
    pub fn check_daily_reset(&self, account: &mut Account, today: NaiveDate) -> bool {
        if account.last_daily_reset == Some(today) {
            return false;
        }
        account.daily_pnl = 0.0;
        account.daily_locked = false;
        account.last_daily_reset = Some(today);
        info!(account = %account.key(), %today, "daily loss counters reset");
        true
    }

    /// Add net realized P&L to the day and lock the account on breach.
    ///
    /// Once locked, later wins the same day do not unlock it.
    pub fn apply_realized_pnl(&self, account: &mut Account, amount: f64) -> Option<RiskEvent> {
        account.daily_pnl += amount;
        if account.daily_pnl <= self.config.daily_loss_limit {
            let newly_locked = !account.daily_locked;
            account.daily_locked = true;
            if newly_locked {
                warn!(
                    account = %account.key(),
                    daily_pnl = account.daily_pnl,
                    limit = self.config.daily_loss_limit,
                    "daily loss limit breached, trading locked until next UTC day"
                );
            }
            return Some(RiskEvent::DailyLimitBreached {
                daily_pnl: account.daily_pnl,
                limit: self.config.daily_loss_limit,
            });
        }
        None
    }

    /// Burn tokens and reset the account once cumulative P&L breaches the limit.
    ///
    /// Without enough tokens the account is marked `trading_blocked` instead.
    /// A blocked account whose cumulative P&L is back above the limit is
    /// unblocked.
    pub fn check_cumulative_liquidation(
        &self,
        account: &mut Account,
        wallet: &mut Wallet,
        now: DateTime<Utc>,
    ) -> LiquidationOutcome {
        let cumulative_pnl = account.cumulative_pnl();
        if cumulative_pnl > self.config.cumulative_loss_limit {
            // released margin can lift a blocked account back above the limit
            if account.trading_blocked {
                account.trading_blocked = false;
                info!(
                    account = %account.key(),
                    cumulative_pnl,
                    "cumulative P&L back above the limit, trading unblocked"
                );
            }
            return LiquidationOutcome::NotTriggered;
        }

        let burn = self.config.burn_on_liquidation;
        let remaining = match wallet.debit(&self.governance_token, burn) {
            Ok(remaining) => remaining,
            Err(_) => {
                let available = wallet.balance(&self.governance_token);
                account.trading_blocked = true;
                warn!(
                    account = %account.key(),
                    cumulative_pnl,
                    required = burn,
                    available,
                    "cumulative loss limit reached without tokens to burn, trading blocked"
                );
                return LiquidationOutcome::Blocked { required: burn, available };
            }
        };

        let record = LiquidationRecord {
            user_id: account.user_id.clone(),
            wallet_id: account.wallet_id.clone(),
            challenge_id: account.challenge_id.clone(),
            participant_id: account.participant_id.clone(),
            tokens_burned: burn,
            reason: LiquidationReason::CumulativeLoss,
            loss_amount: cumulative_pnl,
            remaining_tokens: remaining,
            timestamp: now,
        };

        account.current_balance = account.initial_balance;
        account.daily_pnl = 0.0;
        account.daily_locked = false;
        account.trading_blocked = false;

        let slots = calculate_slots(remaining);
        warn!(
            account = %account.key(),
            loss = cumulative_pnl,
            burned = burn,
            remaining,
            slots,
            "cumulative liquidation: tokens burned, account reset"
        );
        LiquidationOutcome::Liquidated { record, slots }
    }

    /// Run the full post-close settlement pass for `net_pnl`.
    pub fn settle(
        &self,
        account: &mut Account,
        wallet: &mut Wallet,
        net_pnl: f64,
        now: DateTime<Utc>,
    ) -> SettlementReport {
        let mut report = SettlementReport { net_pnl, events: Vec::new() };

        if let Some(event) = self.apply_realized_pnl(account, net_pnl) {
            report.events.push(event);
        }

        match self.check_cumulative_liquidation(account, wallet, now) {
            LiquidationOutcome::NotTriggered => {}
            LiquidationOutcome::Liquidated { record, slots } => {
                report.events.push(RiskEvent::CumulativeLiquidation { record, slots });
            }
            LiquidationOutcome::Blocked { required, available } => {
                report.events.push(RiskEvent::InsufficientTokenBlock {
                    required,
                    available,
                    cumulative_pnl: account.cumulative_pnl(),
                });
            }
        }
        report
    }

    /// Trading-enablement predicate for buttons and pre-checks.
    pub fn trading_enabled(&self, account: &Account, token_balance: f64) -> bool {
        self.ensure_can_trade(account, token_balance).is_ok()
    }

    /// Gate every order entry; returns the slot count on success.
    ///
    /// The insufficient-token block outranks the daily lock.
    pub fn ensure_can_trade(&self, account: &Account, token_balance: f64) -> Result<u32, TradeError> {
        if account.status == AccountStatus::Ended {
            return Err(TradeError::AccountEnded);
        }
        if account.trading_blocked {
            return Err(TradeError::TradingBlocked {
                required: self.config.burn_on_liquidation,
                available: token_balance,
            });
        }
        if account.daily_locked {
            return Err(TradeError::DailyLocked);
        }
        match calculate_slots(token_balance) {
            0 => Err(TradeError::NoSlots),
            slots => Ok(slots),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor() -> RiskGovernor {
        RiskGovernor::new(RiskConfig::default(), "CRNY")
    }

    fn account(current: f64) -> Account {
        Account {
            challenge_id: "c".into(),
            participant_id: "p".into(),
            user_id: "u".into(),
            wallet_id: "w".into(),
            joined_at: Utc::now(),
            initial_balance: 100_000.0,
            current_balance: current,
            daily_pnl: 0.0,
            daily_locked: false,
            last_daily_reset: None,
            trading_blocked: false,
            trades: Vec::new(),
            max_contracts: 7,
            max_positions: 20,
            max_drawdown: 3_000.0,
            status: AccountStatus::Active,
            last_eod: None,
        }
    }

    fn wallet(tokens: f64) -> Wallet {
        Wallet::new("w".into(), "u".into(), "main").with_balance("CRNY", tokens)
    }

    #[test]
    fn daily_lock_is_sticky_for_the_day() {
        let g = governor();
        let mut a = account(100_000.0);
        a.daily_pnl = -40.0;
        assert!(g.apply_realized_pnl(&mut a, -61.0).is_some());
        assert!(a.daily_locked);
        assert_eq!(a.daily_pnl, -101.0);

        assert!(g.apply_realized_pnl(&mut a, 500.0).is_none());
        assert!(a.daily_locked, "a later win must not unlock");
    }

    #[test]
    fn exactly_at_limit_locks() {
        let g = governor();
        let mut a = account(100_000.0);
        assert!(g.apply_realized_pnl(&mut a, -100.0).is_some());
        assert!(a.daily_locked);
    }

    #[test]
    fn cumulative_above_threshold_is_noop() {
        let g = governor();
        let mut a = account(98_000.01);
        let mut w = wallet(5.0);
        let outcome = g.check_cumulative_liquidation(&mut a, &mut w, Utc::now());
        assert!(!outcome.triggered());
        assert_eq!(w.balance("CRNY"), 5.0);
    }

    #[test]
    fn liquidation_resets_even_after_same_pass_daily_lock() {
        let g = governor();
        let mut a = account(100_000.0 - 1_950.0);
        let mut w = wallet(5.0);
        a.current_balance -= 110.0;
        let report = g.settle(&mut a, &mut w, -110.0, Utc::now());

        assert!(report.daily_locked());
        let record = report.liquidation().expect("liquidated");
        assert_eq!(record.loss_amount, -2_060.0);
        assert_eq!(record.remaining_tokens, 4.0);
        assert_eq!(a.current_balance, 100_000.0);
        assert_eq!(a.daily_pnl, 0.0);
        assert!(!a.daily_locked);
    }

    #[test]
    fn insufficient_tokens_block_without_reset() {
        let g = governor();
        let mut a = account(97_000.0);
        let mut w = wallet(0.5);
        let report = g.settle(&mut a, &mut w, -10.0, Utc::now());
        assert!(report.blocked());
        assert!(a.trading_blocked);
        assert_eq!(a.current_balance, 97_000.0);
        assert!(matches!(
            g.ensure_can_trade(&a, 0.5),
            Err(TradeError::TradingBlocked { .. })
        ));
    }

    #[test]
    fn recovered_cumulative_pnl_lifts_the_block() {
        let g = governor();
        let mut a = account(97_000.0);
        a.trading_blocked = true;
        let mut w = wallet(0.5);

        // margin of a still-open trade returns to the balance
        a.current_balance = 98_500.0;
        let outcome = g.check_cumulative_liquidation(&mut a, &mut w, Utc::now());
        assert_eq!(outcome, LiquidationOutcome::NotTriggered);
        assert!(!a.trading_blocked);
        assert_eq!(w.balance("CRNY"), 0.5);
    }

    #[test]
    fn block_outranks_daily_lock() {
        let g = governor();
        let mut a = account(97_000.0);
        a.daily_locked = true;
        a.trading_blocked = true;
        assert_eq!(
            g.ensure_can_trade(&a, 0.5),
            Err(TradeError::TradingBlocked { required: 1.0, available: 0.5 })
        );
    }

    #[test]
    fn daily_reset_idempotent() {
        let g = governor();
        let mut a = account(100_000.0);
        let today = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert!(g.check_daily_reset(&mut a, today));
        a.daily_pnl = -150.0;
        a.daily_locked = true;
        assert!(!g.check_daily_reset(&mut a, today));
        assert_eq!(a.daily_pnl, -150.0);
        assert!(a.daily_locked);
    }

    #[test]
    fn enablement_predicate() {
        let g = governor();
        let mut a = account(100_000.0);
        assert!(g.trading_enabled(&a, 1.0));
        assert!(!g.trading_enabled(&a, 0.0));
        a.daily_locked = true;
        assert!(!g.trading_enabled(&a, 100.0));
    }
}
