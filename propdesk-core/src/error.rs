//! Error taxonomy shared by the ledger, the desk service and the lifecycle.

use crate::domain::{OrderKind, TradeStatus, WalletError};
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which account limit an order would break.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LimitViolation {
    TooManyContracts { requested: u32, max: u32 },
    TooManyPositions { open: usize, max: usize },
    DrawdownReached { drawdown: f64, max: f64 },
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitViolation::TooManyContracts { requested, max } => {
                write!(f, "{requested} contracts exceeds the maximum of {max}")
            }
            LimitViolation::TooManyPositions { open, max } => {
                write!(f, "{open} open positions, maximum is {max}")
            }
            LimitViolation::DrawdownReached { drawdown, max } => {
                write!(f, "drawdown ${drawdown:.2} reached the ${max:.2} limit")
            }
        }
    }
}

/// Rejections raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeError {
    #[error("trading is locked for the rest of the day (daily loss limit reached)")]
    DailyLocked,

    #[error("no slots: hold governance tokens to trade")]
    NoSlots,

    #[error("insufficient margin: need ${required:.2}, have ${available:.2}")]
    InsufficientMargin { required: f64, available: f64 },

    #[error("limit exceeded: {0}")]
    LimitExceeded(LimitViolation),

    #[error(
        "trading blocked: cumulative liquidation needs {required} tokens to burn, wallet holds {available}"
    )]
    TradingBlocked { required: f64, available: f64 },

    #[error("account has ended")]
    AccountEnded,

    #[error("unknown instrument '{0}'")]
    UnknownInstrument(String),

    #[error("{0} order requires a price level")]
    MissingPriceLevel(OrderKind),

    #[error("{field} must be a finite number, got {value}")]
    NonFiniteLevel { field: &'static str, value: f64 },

    #[error("no current price available")]
    PriceUnavailable,

    #[error("trade #{0} does not exist")]
    TradeNotFound(usize),

    #[error("trade #{index} is {status}, not open")]
    TradeNotOpen { index: usize, status: TradeStatus },

    #[error("trade #{index} is {status}, not pending")]
    TradeNotPending { index: usize, status: TradeStatus },

    #[error("no open positions")]
    NoOpenPositions,

    #[error("{0} open or pending trades remain")]
    OpenPositionsRemain(usize),
}

/// Challenge join / exit failures.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("challenge '{0}' not found")]
    ChallengeNotFound(String),

    #[error("challenge '{0}' is not active")]
    ChallengeInactive(String),

    #[error("insufficient tokens for entry fee: need {required}, have {available}")]
    InsufficientEntryFee { required: f64, available: f64 },

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),
}

/// Umbrella error returned by desk operations.
#[derive(Debug, Error)]
pub enum DeskError {
    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("account '{0}' not found")]
    AccountNotFound(String),

    #[error("wallet '{0}' not found")]
    WalletNotFound(String),
}

impl DeskError {
    /// True for validation failures that left state untouched.
    pub fn is_validation(&self) -> bool {
        matches!(self, DeskError::Trade(_))
    }
}
