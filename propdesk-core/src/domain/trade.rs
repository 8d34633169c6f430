//! Trade — one futures order/position owned by a participation account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for longs, -1 for shorts.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
            OrderKind::Stop => write!(f, "STOP"),
            OrderKind::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    /// Non-market order recorded but never matched.
    Pending,
    Open,
    Closed,
    /// Pending order withdrawn; margin returned, no fee.
    Cancelled,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "pending"),
            TradeStatus::Open => write!(f, "open"),
            TradeStatus::Closed => write!(f, "closed"),
            TradeStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Stop-loss / take-profit hit flags for one trade at one price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerFlags {
    pub sl_hit: bool,
    pub tp_hit: bool,
}

impl TriggerFlags {
    pub fn any(&self) -> bool {
        self.sl_hit || self.tp_hit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub instrument: String,
    pub side: Side,
    pub order_kind: OrderKind,

    // ── Size ──
    /// Contract count, always equal to the slot count at entry.
    pub contracts: u32,
    pub tokens_at_entry: u64,
    pub slots_at_entry: u32,

    // ── Entry ──
    pub entry_price: f64,
    /// Stop trigger of a STOP_LIMIT order (entry_price holds the limit).
    #[serde(default)]
    pub stop_price: Option<f64>,
    pub multiplier: f64,
    pub margin: f64,
    pub fee: f64,
    pub opened_at: DateTime<Utc>,

    // ── Bracket ──
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,

    // ── Exit ──
    pub status: TradeStatus,
    pub exit_price: Option<f64>,
    /// Net realized P&L (after fee), set on close.
    pub pnl: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Holds reserved margin (open or pending).
    pub fn is_live(&self) -> bool {
        matches!(self.status, TradeStatus::Open | TradeStatus::Pending)
    }

    /// Favourable price distance from entry (positive when in profit).
    pub fn price_diff(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.side.sign()
    }

    /// Unrealized P&L before fees.
    pub fn gross_pnl(&self, price: f64) -> f64 {
        self.price_diff(price) * self.multiplier * self.contracts as f64
    }

    pub fn net_pnl(&self, price: f64) -> f64 {
        self.gross_pnl(price) - self.fee
    }

    /// Evaluate the monotone SL/TP trigger conditions at `price`.
    ///
    /// BUY: stop hit at or below the stop, target hit at or above the target.
    /// SELL: both comparisons invert.
    pub fn triggers(&self, price: f64) -> TriggerFlags {
        let sl_hit = self.stop_loss.is_some_and(|sl| match self.side {
            Side::Buy => price <= sl,
            Side::Sell => price >= sl,
        });
        let tp_hit = self.take_profit.is_some_and(|tp| match self.side {
            Side::Buy => price >= tp,
            Side::Sell => price <= tp,
        });
        TriggerFlags { sl_hit, tp_hit }
    }

    pub fn is_winner(&self) -> bool {
        self.pnl.is_some_and(|p| p > 0.0)
    }
}
