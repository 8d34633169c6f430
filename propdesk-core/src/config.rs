//! Desk configuration: risk constants, instruments, feed, triggers, challenge defaults.
//!
//! Every section has a default so a partial (or empty) TOML file is valid.

use crate::domain::{InstrumentSpec, InstrumentTable, Settlement};
use crate::feed::stream::{NQ_AGGREGATES, STREAM_URL};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level desk configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeskConfig {
    pub risk: RiskConfig,
    pub tokens: TokenConfig,
    pub instruments: Vec<InstrumentSpec>,
    pub feed: FeedConfig,
    pub triggers: TriggerConfig,
    pub challenge: ChallengeDefaults,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            risk: RiskConfig::default(),
            tokens: TokenConfig::default(),
            instruments: InstrumentTable::default().iter().cloned().collect(),
            feed: FeedConfig::default(),
            triggers: TriggerConfig::default(),
            challenge: ChallengeDefaults::default(),
        }
    }
}

impl DeskConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: DeskConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn instrument_table(&self) -> InstrumentTable {
        InstrumentTable::new(self.instruments.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let risk = &self.risk;
        if risk.daily_loss_limit >= 0.0 {
            return Err(ConfigError::Invalid("risk.daily_loss_limit must be negative".into()));
        }
        if risk.cumulative_loss_limit >= 0.0 {
            return Err(ConfigError::Invalid(
                "risk.cumulative_loss_limit must be negative".into(),
            ));
        }
        if risk.burn_on_liquidation < 0.0 || risk.fee_per_contract < 0.0 {
            return Err(ConfigError::Invalid(
                "risk.burn_on_liquidation and risk.fee_per_contract must be >= 0".into(),
            ));
        }

        if self.instruments.is_empty() {
            return Err(ConfigError::Invalid("at least one instrument is required".into()));
        }
        let mut seen = HashSet::new();
        for spec in &self.instruments {
            if !seen.insert(spec.symbol.to_ascii_uppercase()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate instrument symbol '{}'",
                    spec.symbol
                )));
            }
            if spec.multiplier <= 0.0 || spec.margin_per_contract <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "instrument '{}' needs positive multiplier and margin",
                    spec.symbol
                )));
            }
        }

        let feed = &self.feed;
        if !(feed.band_low < feed.baseline_price && feed.baseline_price < feed.band_high) {
            return Err(ConfigError::Invalid(format!(
                "feed.baseline_price {} must lie inside ({}, {})",
                feed.baseline_price, feed.band_low, feed.band_high
            )));
        }
        if feed.poll_interval_secs == 0 || feed.simulated_interval_secs == 0 {
            return Err(ConfigError::Invalid("feed intervals must be > 0".into()));
        }
        if !(feed.stream_url.starts_with("ws://") || feed.stream_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "feed.stream_url '{}' must be a ws:// or wss:// URL",
                feed.stream_url
            )));
        }
        Ok(())
    }
}

/// Loss limits, liquidation burn and fees. Limits are negative dollar thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub daily_loss_limit: f64,
    pub cumulative_loss_limit: f64,
    /// Governance tokens burned on a cumulative liquidation.
    pub burn_on_liquidation: f64,
    /// Round-trip fee charged per contract at close.
    pub fee_per_contract: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: -100.0,
            cumulative_loss_limit: -2_000.0,
            burn_on_liquidation: 1.0,
            fee_per_contract: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TokenConfig {
    /// Token whose holding drives slots, pays entry fees and is burned.
    pub governance: String,
    pub reward: String,
    /// Id of the pooled system wallet under `system_wallets`.
    pub pool_wallet: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            governance: "CRNY".into(),
            reward: "CRFN".into(),
            pool_wallet: "prop_trading".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    /// Poll the public quote endpoint.
    Quote,
    /// Consume pushed aggregate frames.
    Stream,
    /// No external source; random walk only.
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    pub mode: FeedMode,
    pub quote_symbol: String,
    pub poll_interval_secs: u64,
    pub simulated_interval_secs: u64,
    pub baseline_price: f64,
    /// Full width of one random-walk step (moves by up to ±step/2).
    pub walk_step: f64,
    pub band_low: f64,
    pub band_high: f64,
    pub seed: Option<u64>,
    /// Websocket endpoint for `stream` mode.
    pub stream_url: String,
    pub stream_subscription: String,
    /// Environment variable holding the stream API key.
    pub stream_api_key_env: String,
    /// Seconds between reconnect attempts; 0 disables reconnecting.
    pub stream_reconnect_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            mode: FeedMode::Quote,
            quote_symbol: "NQ=F".into(),
            poll_interval_secs: 60,
            simulated_interval_secs: 5,
            baseline_price: 20_500.0,
            walk_step: 100.0,
            band_low: 19_000.0,
            band_high: 21_000.0,
            seed: None,
            stream_url: STREAM_URL.into(),
            stream_subscription: NQ_AGGREGATES.into(),
            stream_api_key_env: "POLYGON_API_KEY".into(),
            stream_reconnect_secs: 5,
        }
    }
}

impl FeedConfig {
    /// Refresh cadence for the configured mode.
    pub fn interval(&self) -> std::time::Duration {
        let secs = match self.mode {
            FeedMode::Simulated => self.simulated_interval_secs,
            FeedMode::Quote | FeedMode::Stream => self.poll_interval_secs,
        };
        std::time::Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TriggerConfig {
    /// Close positions automatically when SL/TP is hit on a tick.
    pub auto_close: bool,
    pub quick_stop_points: f64,
    pub quick_target_points: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            auto_close: false,
            quick_stop_points: 50.0,
            quick_target_points: 100.0,
        }
    }
}

/// Parameters stamped onto newly created challenges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChallengeDefaults {
    pub description: String,
    pub entry_fee: f64,
    pub initial_balance: f64,
    pub max_contracts: u32,
    pub max_positions: usize,
    pub max_drawdown: f64,
    pub settlement: Settlement,
    pub reward_token: String,
    pub target_profit_pct: f64,
    pub duration_days: u32,
}

impl Default for ChallengeDefaults {
    fn default() -> Self {
        Self {
            description: "100K account trading NQ futures".into(),
            entry_fee: 1.0,
            initial_balance: 100_000.0,
            max_contracts: 7,
            max_positions: 20,
            max_drawdown: 3_000.0,
            settlement: Settlement::Eod,
            reward_token: "CRFN".into(),
            target_profit_pct: 10.0,
            duration_days: 30,
        }
    }
}
