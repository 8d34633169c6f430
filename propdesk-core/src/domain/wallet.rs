use super::ids::{UserId, WalletId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WalletError {
    #[error("insufficient {token}: need {required}, have {available}")]
    Insufficient {
        token: String,
        required: f64,
        available: f64,
    },

    #[error("invalid amount {0}")]
    InvalidAmount(f64),
}

/// Off-chain token balances for one wallet.
///
/// Debits and credits are plain field updates; nothing here settles on chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner: UserId,
    pub name: String,
    #[serde(default)]
    pub balances: BTreeMap<String, f64>,
}

impl Wallet {
    pub fn new(id: WalletId, owner: UserId, name: impl Into<String>) -> Self {
        Self { id, owner, name: name.into(), balances: BTreeMap::new() }
    }

    pub fn with_balance(mut self, token: &str, amount: f64) -> Self {
        self.balances.insert(token.to_string(), amount);
        self
    }

    pub fn balance(&self, token: &str) -> f64 {
        self.balances.get(token).copied().unwrap_or(0.0)
    }

    pub fn credit(&mut self, token: &str, amount: f64) -> Result<f64, WalletError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        let entry = self.balances.entry(token.to_string()).or_insert(0.0);
        *entry += amount;
        Ok(*entry)
    }

    /// Debit `amount`; refuses to go negative.
    pub fn debit(&mut self, token: &str, amount: f64) -> Result<f64, WalletError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        let available = self.balance(token);
        if available < amount {
            return Err(WalletError::Insufficient {
                token: token.to_string(),
                required: amount,
                available,
            });
        }
        let remaining = available - amount;
        self.balances.insert(token.to_string(), remaining);
        Ok(remaining)
    }
}
