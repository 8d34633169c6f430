//! Slot allocation: governance-token holding → contract count.
//!
//! The tier table is static, ordered, inclusive on both ends and exhaustive
//! over `[1, ∞)`. Every trade is sized from it, and nothing else decides how
//! many contracts an order carries.

use serde::{Deserialize, Serialize};

/// One tier of the slot table. `max == None` marks the open-ended top tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTier {
    pub min: u64,
    pub max: Option<u64>,
    pub slots: u32,
}

impl SlotTier {
    const fn bounded(min: u64, max: u64, slots: u32) -> Self {
        Self { min, max: Some(max), slots }
    }

    pub fn contains(&self, balance: u64) -> bool {
        balance >= self.min && self.max.map_or(true, |max| balance <= max)
    }
}

pub const SLOT_TIERS: [SlotTier; 9] = [
    SlotTier::bounded(1, 4, 1),
    SlotTier::bounded(5, 6, 2),
    SlotTier::bounded(7, 9, 3),
    SlotTier::bounded(10, 14, 4),
    SlotTier::bounded(15, 20, 5),
    SlotTier::bounded(21, 30, 10),
    SlotTier::bounded(31, 50, 20),
    SlotTier::bounded(51, 69, 50),
    SlotTier { min: 70, max: None, slots: 70 },
];

/// Whole tokens counted for slot purposes (floor; non-positive and NaN → 0).
pub fn whole_tokens(token_balance: f64) -> u64 {
    if token_balance.is_nan() || token_balance <= 0.0 {
        return 0;
    }
    // `as` saturates for values above u64::MAX
    token_balance.floor() as u64
}

/// Map a governance-token balance to its slot count.
pub fn calculate_slots(token_balance: f64) -> u32 {
    let balance = whole_tokens(token_balance);
    if balance == 0 {
        return 0;
    }
    SLOT_TIERS
        .iter()
        .find(|tier| tier.contains(balance))
        .map_or(0, |tier| tier.slots)
}

/// Slot panel state for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatus {
    pub tokens: u64,
    pub slots: u32,
    /// Contracts the next order would carry (== slots).
    pub contracts: u32,
    pub active: bool,
}

impl SlotStatus {
    pub fn from_balance(token_balance: f64) -> Self {
        let slots = calculate_slots(token_balance);
        Self {
            tokens: whole_tokens(token_balance),
            slots,
            contracts: slots,
            active: slots > 0,
        }
    }
}
