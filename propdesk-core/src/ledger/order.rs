use crate::config::TriggerConfig;
use crate::domain::{OrderKind, Side};
use crate::error::TradeError;
use serde::{Deserialize, Serialize};

/// Caller-side description of an order. The contract count is never part of
/// it: size always comes from the slot table at the moment of entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub side: Side,
    pub instrument: String,
    pub kind: OrderKind,
    /// Limit level for LIMIT and STOP_LIMIT orders.
    pub limit_price: Option<f64>,
    /// Trigger level for STOP and STOP_LIMIT orders.
    pub stop_price: Option<f64>,
    /// Stop-loss distance from entry, in points.
    pub sl_points: Option<f64>,
    /// Take-profit distance from entry, in points.
    pub tp_points: Option<f64>,
}

impl OrderRequest {
    pub fn market(side: Side, instrument: impl Into<String>) -> Self {
        Self {
            side,
            instrument: instrument.into(),
            kind: OrderKind::Market,
            limit_price: None,
            stop_price: None,
            sl_points: None,
            tp_points: None,
        }
    }

    pub fn limit(side: Side, instrument: impl Into<String>, price: f64) -> Self {
        Self {
            kind: OrderKind::Limit,
            limit_price: Some(price),
            ..Self::market(side, instrument)
        }
    }

    pub fn stop(side: Side, instrument: impl Into<String>, trigger: f64) -> Self {
        Self {
            kind: OrderKind::Stop,
            stop_price: Some(trigger),
            ..Self::market(side, instrument)
        }
    }

    pub fn stop_limit(side: Side, instrument: impl Into<String>, trigger: f64, limit: f64) -> Self {
        Self {
            kind: OrderKind::StopLimit,
            stop_price: Some(trigger),
            limit_price: Some(limit),
            ..Self::market(side, instrument)
        }
    }

    /// One-click market order with the configured default bracket.
    pub fn quick(side: Side, instrument: impl Into<String>, triggers: &TriggerConfig) -> Self {
        Self::market(side, instrument)
            .with_bracket(Some(triggers.quick_stop_points), Some(triggers.quick_target_points))
    }

    pub fn with_bracket(mut self, sl_points: Option<f64>, tp_points: Option<f64>) -> Self {
        self.sl_points = sl_points;
        self.tp_points = tp_points;
        self
    }

    /// Entry price for this order kind. MARKET takes the live price; the
    /// others take the caller's levels and never consult the feed.
    pub fn entry_price(&self, market_price: Option<f64>) -> Result<f64, TradeError> {
        match self.kind {
            OrderKind::Market => market_price
                .filter(|p| p.is_finite())
                .ok_or(TradeError::PriceUnavailable),
            OrderKind::Limit => {
                let limit = self.limit_price.ok_or(TradeError::MissingPriceLevel(self.kind))?;
                finite("limit_price", limit)
            }
            OrderKind::StopLimit => match (self.limit_price, self.stop_price) {
                (Some(limit), Some(stop)) => {
                    finite("stop_price", stop)?;
                    finite("limit_price", limit)
                }
                _ => Err(TradeError::MissingPriceLevel(self.kind)),
            },
            OrderKind::Stop => {
                let stop = self.stop_price.ok_or(TradeError::MissingPriceLevel(self.kind))?;
                finite("stop_price", stop)
            }
        }
    }

    /// Reject NaN or infinite bracket distances.
    pub fn check_bracket(&self) -> Result<(), TradeError> {
        finite_opt("sl_points", self.sl_points)?;
        finite_opt("tp_points", self.tp_points)?;
        Ok(())
    }

    /// Absolute SL/TP levels around `entry`. Shorts mirror longs.
    pub fn bracket_levels(&self, entry: f64) -> (Option<f64>, Option<f64>) {
        let sign = self.side.sign();
        let stop_loss = self.sl_points.map(|pts| entry - sign * pts);
        let take_profit = self.tp_points.map(|pts| entry + sign * pts);
        (stop_loss, take_profit)
    }

    /// Short human description, e.g. `LIMIT @ 20450.00`.
    pub fn describe(&self) -> String {
        match (self.kind, self.limit_price, self.stop_price) {
            (OrderKind::Market, _, _) => "MARKET".to_string(),
            (OrderKind::Limit, Some(limit), _) => format!("LIMIT @ {limit:.2}"),
            (OrderKind::Stop, _, Some(stop)) => format!("STOP @ {stop:.2}"),
            (OrderKind::StopLimit, Some(limit), Some(stop)) => {
                format!("STOP {stop:.2} / LIMIT {limit:.2}")
            }
            (kind, _, _) => kind.to_string(),
        }
    }
}

pub(crate) fn finite(field: &'static str, value: f64) -> Result<f64, TradeError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TradeError::NonFiniteLevel { field, value })
    }
}

pub(crate) fn finite_opt(field: &'static str, value: Option<f64>) -> Result<(), TradeError> {
    match value {
        Some(v) => finite(field, v).map(|_| ()),
        None => Ok(()),
    }
}
