//! Daily and cumulative loss enforcement.

pub mod gauge;
pub mod governor;

pub use gauge::{GaugeLevel, LimitUsage, RiskGauge};
pub use governor::{LiquidationOutcome, RiskEvent, RiskGovernor, SettlementReport};
