use super::governor::RiskGovernor;
use crate::domain::Account;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaugeLevel {
    Normal,
    /// At least 80% of the limit used.
    Warning,
    Breached,
}

impl GaugeLevel {
    fn from_pct(pct: f64) -> Self {
        if pct >= 100.0 {
            GaugeLevel::Breached
        } else if pct >= 80.0 {
            GaugeLevel::Warning
        } else {
            GaugeLevel::Normal
        }
    }
}

/// Loss usage of one limit. Gains count as 0% used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitUsage {
    pub pnl: f64,
    pub limit: f64,
    pub used_pct: f64,
    pub level: GaugeLevel,
}

impl LimitUsage {
    pub fn new(pnl: f64, limit: f64) -> Self {
        let loss = (-pnl).max(0.0);
        let used_pct = if limit == 0.0 {
            100.0
        } else {
            (loss / limit.abs() * 100.0).min(100.0)
        };
        Self { pnl, limit, used_pct, level: GaugeLevel::from_pct(used_pct) }
    }
}

/// Risk panel snapshot for one account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskGauge {
    pub daily: LimitUsage,
    pub cumulative: LimitUsage,
    pub daily_locked: bool,
    pub trading_blocked: bool,
    pub trading_enabled: bool,
}

impl RiskGauge {
    pub fn compute(governor: &RiskGovernor, account: &Account, token_balance: f64) -> Self {
        let config = governor.config();
        Self {
            daily: LimitUsage::new(account.daily_pnl, config.daily_loss_limit),
            cumulative: LimitUsage::new(account.cumulative_pnl(), config.cumulative_loss_limit),
            daily_locked: account.daily_locked,
            trading_blocked: account.trading_blocked,
            trading_enabled: governor.trading_enabled(account, token_balance),
        }
    }
}
