//! Read-only projections of an account for display and confirmation prompts.

use crate::domain::{Account, OrderKind, Side, Trade, TradeStatus, TriggerFlags};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One open position marked at the current price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub index: usize,
    pub instrument: String,
    pub side: Side,
    pub order_kind: OrderKind,
    pub contracts: u32,
    pub entry_price: f64,
    pub current_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Unrealized P&L before fees.
    pub gross_pnl: f64,
    /// Gross P&L as a percentage of the reserved margin.
    pub pnl_pct_of_margin: f64,
    pub triggers: TriggerFlags,
}

impl PositionView {
    pub fn mark(index: usize, trade: &Trade, price: f64) -> Self {
        let gross_pnl = trade.gross_pnl(price);
        let pnl_pct_of_margin = if trade.margin > 0.0 {
            gross_pnl / trade.margin * 100.0
        } else {
            0.0
        };
        Self {
            index,
            instrument: trade.instrument.clone(),
            side: trade.side,
            order_kind: trade.order_kind,
            contracts: trade.contracts,
            entry_price: trade.entry_price,
            current_price: price,
            stop_loss: trade.stop_loss,
            take_profit: trade.take_profit,
            gross_pnl,
            pnl_pct_of_margin,
            triggers: trade.triggers(price),
        }
    }
}

/// Balance panel of the trading dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub balance: f64,
    pub initial_balance: f64,
    pub profit_pct: f64,
    pub daily_pnl: f64,
    pub cumulative_pnl: f64,
    pub open_positions: usize,
    pub pending_orders: usize,
}

impl AccountSummary {
    pub fn of(account: &Account) -> Self {
        Self {
            balance: account.current_balance,
            initial_balance: account.initial_balance,
            profit_pct: account.profit_pct(),
            daily_pnl: account.daily_pnl,
            cumulative_pnl: account.cumulative_pnl(),
            open_positions: account.open_positions(),
            pending_orders: account
                .trades
                .iter()
                .filter(|t| t.status == TradeStatus::Pending)
                .count(),
        }
    }
}

/// Confirmation summary shown before an order is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPreview {
    pub instrument: String,
    pub side: Side,
    pub tokens: u64,
    pub slots: u32,
    pub contracts: u32,
    pub order: String,
    /// Known for priced orders; MARKET previews use the current price if any.
    pub entry_price: Option<f64>,
    pub margin: f64,
    pub dollars_per_point: f64,
    pub fee: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl fmt::Display for OpenPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} x {}", self.side, self.instrument, self.contracts)?;
        writeln!(f, "  slots:     {} ({} tokens)", self.slots, self.tokens)?;
        writeln!(f, "  order:     {}", self.order)?;
        if let Some(entry) = self.entry_price {
            writeln!(f, "  entry:     {entry:.2}")?;
        }
        writeln!(f, "  margin:    ${:.2}", self.margin)?;
        writeln!(f, "  per point: ${:.2}", self.dollars_per_point)?;
        writeln!(f, "  fee:       ${:.2}", self.fee)?;
        if let Some(sl) = self.stop_loss {
            writeln!(f, "  stop:      {sl:.2}")?;
        }
        if let Some(tp) = self.take_profit {
            writeln!(f, "  target:    {tp:.2}")?;
        }
        Ok(())
    }
}

/// Confirmation summary shown before a position is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosePreview {
    pub index: usize,
    pub instrument: String,
    pub side: Side,
    pub contracts: u32,
    pub entry_price: f64,
    pub current_price: f64,
    pub gross_pnl: f64,
    pub fee: f64,
    pub net_pnl: f64,
}

impl ClosePreview {
    pub fn of(index: usize, trade: &Trade, price: f64) -> Self {
        Self {
            index,
            instrument: trade.instrument.clone(),
            side: trade.side,
            contracts: trade.contracts,
            entry_price: trade.entry_price,
            current_price: price,
            gross_pnl: trade.gross_pnl(price),
            fee: trade.fee,
            net_pnl: trade.net_pnl(price),
        }
    }
}

impl fmt::Display for ClosePreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "close #{} {} {} x {}",
            self.index, self.side, self.instrument, self.contracts
        )?;
        writeln!(f, "  entry:   {:.2}", self.entry_price)?;
        writeln!(f, "  current: {:.2}", self.current_price)?;
        writeln!(f, "  gross:   {:+.2}", self.gross_pnl)?;
        writeln!(f, "  fee:     -{:.2}", self.fee)?;
        writeln!(f, "  net:     {:+.2}", self.net_pnl)
    }
}
