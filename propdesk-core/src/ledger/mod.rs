//! Position ledger: order entry, margin accounting, P&L realization and
//! SL/TP evaluation for one participation account.
//!
//! The ledger mutates an in-memory [`Account`] only. Loading, locking and
//! persisting are the desk's job.

mod order;
mod views;

pub use order::OrderRequest;
use order::finite_opt;
pub use views::{AccountSummary, ClosePreview, OpenPreview, PositionView};

use crate::domain::{
    Account, AccountStatus, InstrumentTable, OrderKind, Trade, TradeStatus, TriggerFlags, Wallet,
};
use crate::error::{LimitViolation, TradeError};
use crate::risk::{RiskGovernor, SettlementReport};
use crate::slots::whole_tokens;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One trade realized by a close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub index: usize,
    pub exit_price: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
}

/// Result of a single or bulk close: the trades realized and the one
/// settlement pass run over their aggregate net P&L.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseOutcome {
    pub closed: Vec<ClosedTrade>,
    pub total_net_pnl: f64,
    pub settlement: SettlementReport,
}

#[derive(Debug, Clone)]
pub struct PositionLedger {
    instruments: InstrumentTable,
    governor: RiskGovernor,
}

impl PositionLedger {
    pub fn new(instruments: InstrumentTable, governor: RiskGovernor) -> Self {
        Self { instruments, governor }
    }

    pub fn instruments(&self) -> &InstrumentTable {
        &self.instruments
    }

    pub fn governor(&self) -> &RiskGovernor {
        &self.governor
    }

    /// Contract, position-count and drawdown limits for an order of
    /// `contracts`. Exposed on its own so callers can pre-validate.
    pub fn check_limits(&self, account: &Account, contracts: u32) -> Result<(), LimitViolation> {
        if contracts > account.max_contracts {
            return Err(LimitViolation::TooManyContracts {
                requested: contracts,
                max: account.max_contracts,
            });
        }
        let open = account.open_positions();
        if open >= account.max_positions {
            return Err(LimitViolation::TooManyPositions { open, max: account.max_positions });
        }
        let drawdown = account.drawdown();
        if drawdown >= account.max_drawdown {
            return Err(LimitViolation::DrawdownReached { drawdown, max: account.max_drawdown });
        }
        Ok(())
    }

    /// Run every entry check and build the trade without touching the account.
    fn build_trade(
        &self,
        account: &Account,
        token_balance: f64,
        request: &OrderRequest,
        market_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Trade, TradeError> {
        let slots = self.governor.ensure_can_trade(account, token_balance)?;
        let contracts = slots;

        let spec = self
            .instruments
            .get(&request.instrument)
            .ok_or_else(|| TradeError::UnknownInstrument(request.instrument.clone()))?;
        let margin = spec.required_margin(contracts);
        if margin > account.current_balance {
            return Err(TradeError::InsufficientMargin {
                required: margin,
                available: account.current_balance,
            });
        }

        self.check_limits(account, contracts)
            .map_err(TradeError::LimitExceeded)?;

        let entry_price = request.entry_price(market_price)?;
        request.check_bracket()?;
        let (stop_loss, take_profit) = request.bracket_levels(entry_price);
        let status = match request.kind {
            OrderKind::Market => TradeStatus::Open,
            _ => TradeStatus::Pending,
        };

        Ok(Trade {
            instrument: spec.symbol.clone(),
            side: request.side,
            order_kind: request.kind,
            contracts,
            tokens_at_entry: whole_tokens(token_balance),
            slots_at_entry: slots,
            entry_price,
            stop_price: match request.kind {
                OrderKind::StopLimit => request.stop_price,
                _ => None,
            },
            multiplier: spec.multiplier,
            margin,
            fee: self.governor.config().fee_per_contract * contracts as f64,
            opened_at: now,
            stop_loss,
            take_profit,
            status,
            exit_price: None,
            pnl: None,
            closed_at: None,
        })
    }

    /// Open a trade sized by the current token holding.
    ///
    /// Returns the index of the new trade. On error the account is unchanged.
    pub fn open_trade(
        &self,
        account: &mut Account,
        token_balance: f64,
        request: &OrderRequest,
        market_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<usize, TradeError> {
        let trade = self.build_trade(account, token_balance, request, market_price, now)?;
        account.current_balance -= trade.margin;
        info!(
            account = %account.key(),
            side = %trade.side,
            instrument = %trade.instrument,
            kind = %trade.order_kind,
            contracts = trade.contracts,
            entry = trade.entry_price,
            margin = trade.margin,
            status = %trade.status,
            "trade opened"
        );
        account.trades.push(trade);
        Ok(account.trades.len() - 1)
    }

    pub fn preview_open(
        &self,
        account: &Account,
        token_balance: f64,
        request: &OrderRequest,
        market_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<OpenPreview, TradeError> {
        let trade = self.build_trade(account, token_balance, request, market_price, now)?;
        Ok(OpenPreview {
            instrument: trade.instrument.clone(),
            side: trade.side,
            tokens: trade.tokens_at_entry,
            slots: trade.slots_at_entry,
            contracts: trade.contracts,
            order: request.describe(),
            entry_price: Some(trade.entry_price),
            margin: trade.margin,
            dollars_per_point: trade.multiplier * trade.contracts as f64,
            fee: trade.fee,
            stop_loss: trade.stop_loss,
            take_profit: trade.take_profit,
        })
    }

    fn ensure_active(account: &Account) -> Result<(), TradeError> {
        match account.status {
            AccountStatus::Active => Ok(()),
            AccountStatus::Ended => Err(TradeError::AccountEnded),
        }
    }

    fn open_trade_at(account: &Account, index: usize) -> Result<&Trade, TradeError> {
        let trade = account.trades.get(index).ok_or(TradeError::TradeNotFound(index))?;
        if !trade.is_open() {
            return Err(TradeError::TradeNotOpen { index, status: trade.status });
        }
        Ok(trade)
    }

    fn checked_price(price: f64) -> Result<f64, TradeError> {
        if price.is_finite() {
            Ok(price)
        } else {
            Err(TradeError::PriceUnavailable)
        }
    }

    /// Mark an open trade closed at `price` and release its margin. No risk pass.
    fn realize(account: &mut Account, index: usize, price: f64, now: DateTime<Utc>) -> ClosedTrade {
        let trade = &mut account.trades[index];
        let gross_pnl = trade.gross_pnl(price);
        let net_pnl = gross_pnl - trade.fee;
        trade.status = TradeStatus::Closed;
        trade.exit_price = Some(price);
        trade.pnl = Some(net_pnl);
        trade.closed_at = Some(now);
        let released = trade.margin;
        account.current_balance += released + net_pnl;
        debug!(account = %account.key(), index, price, net_pnl, "trade realized");
        ClosedTrade { index, exit_price: price, gross_pnl, net_pnl }
    }

    /// Close one open trade at `price` and run the settlement pass.
    pub fn close_position(
        &self,
        account: &mut Account,
        wallet: &mut Wallet,
        index: usize,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<CloseOutcome, TradeError> {
        Self::ensure_active(account)?;
        Self::open_trade_at(account, index)?;
        let price = Self::checked_price(price)?;

        let closed = Self::realize(account, index, price, now);
        let settlement = self.governor.settle(account, wallet, closed.net_pnl, now);
        info!(
            account = %account.key(),
            index,
            exit = price,
            net_pnl = closed.net_pnl,
            balance = account.current_balance,
            "position closed"
        );
        Ok(CloseOutcome { closed: vec![closed], total_net_pnl: closed.net_pnl, settlement })
    }

    /// Close every open trade in insertion order at one price, then run a
    /// single settlement pass over the aggregate net P&L.
    pub fn close_all_open_positions(
        &self,
        account: &mut Account,
        wallet: &mut Wallet,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<CloseOutcome, TradeError> {
        Self::ensure_active(account)?;
        let indices: Vec<usize> = account.open_trades().map(|(i, _)| i).collect();
        if indices.is_empty() {
            return Err(TradeError::NoOpenPositions);
        }
        let price = Self::checked_price(price)?;

        let closed: Vec<ClosedTrade> = indices
            .into_iter()
            .map(|index| Self::realize(account, index, price, now))
            .collect();
        let total_net_pnl: f64 = closed.iter().map(|c| c.net_pnl).sum();
        let settlement = self.governor.settle(account, wallet, total_net_pnl, now);
        info!(
            account = %account.key(),
            count = closed.len(),
            total_net_pnl,
            balance = account.current_balance,
            "all positions closed"
        );
        Ok(CloseOutcome { closed, total_net_pnl, settlement })
    }

    pub fn preview_close(
        &self,
        account: &Account,
        index: usize,
        price: f64,
    ) -> Result<ClosePreview, TradeError> {
        Self::ensure_active(account)?;
        let trade = Self::open_trade_at(account, index)?;
        let price = Self::checked_price(price)?;
        Ok(ClosePreview::of(index, trade, price))
    }

    /// SL/TP flags of every open trade at `price`. Read-only.
    pub fn evaluate_triggers(&self, account: &Account, price: f64) -> Vec<(usize, TriggerFlags)> {
        account
            .open_trades()
            .map(|(index, trade)| (index, trade.triggers(price)))
            .collect()
    }

    /// Open positions marked at `price`.
    pub fn positions(&self, account: &Account, price: f64) -> Vec<PositionView> {
        account
            .open_trades()
            .map(|(index, trade)| PositionView::mark(index, trade, price))
            .collect()
    }

    /// Replace both bracket levels of an open trade. `None` removes a level.
    /// Levels must be finite but are not checked against the current price.
    pub fn modify_position(
        &self,
        account: &mut Account,
        index: usize,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<(), TradeError> {
        Self::ensure_active(account)?;
        Self::open_trade_at(account, index)?;
        finite_opt("stop_loss", stop_loss)?;
        finite_opt("take_profit", take_profit)?;
        let trade = &mut account.trades[index];
        trade.stop_loss = stop_loss;
        trade.take_profit = take_profit;
        info!(account = %account.key(), index, ?stop_loss, ?take_profit, "bracket modified");
        Ok(())
    }

    /// Withdraw a pending order and return its margin. Returns the released margin.
    pub fn cancel_order(
        &self,
        account: &mut Account,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<f64, TradeError> {
        Self::ensure_active(account)?;
        let trade = account.trades.get_mut(index).ok_or(TradeError::TradeNotFound(index))?;
        if trade.status != TradeStatus::Pending {
            return Err(TradeError::TradeNotPending { index, status: trade.status });
        }
        trade.status = TradeStatus::Cancelled;
        trade.closed_at = Some(now);
        let released = trade.margin;
        account.current_balance += released;
        info!(account = %account.key(), index, released, "pending order cancelled");
        Ok(released)
    }
}
