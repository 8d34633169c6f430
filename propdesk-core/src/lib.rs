//! PropDesk Core: risk and position engine for simulated futures prop-trading
//! challenges.
//!
//! - Slot allocator mapping governance-token holdings to contract size
//! - Risk governor with daily loss lock and cumulative liquidation with token burn
//! - Position ledger with margin accounting, P&L realization and SL/TP evaluation
//! - Price feed adapter (quote polling, aggregate stream, simulated fallback)
//! - Challenge lifecycle and a store-backed trading desk that serializes
//!   every operation per account

pub mod clock;
pub mod config;
pub mod desk;
pub mod domain;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod lifecycle;
pub mod risk;
pub mod slots;
pub mod store;

pub use config::DeskConfig;
pub use desk::TradingDesk;
pub use error::{DeskError, LifecycleError, TradeError};
