use serde::{Deserialize, Serialize};

/// Contract specification for one tradable futures instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSpec {
    /// Symbol used on orders and trades (e.g. `NQ`).
    pub symbol: String,
    /// Symbol used by the quote source (e.g. `NQ=F`).
    pub quote_symbol: String,
    /// Currency value of one full price point per contract.
    pub multiplier: f64,
    /// Margin reserved per contract while a trade is live.
    pub margin_per_contract: f64,
    pub tick_size: f64,
}

impl InstrumentSpec {
    pub fn new(
        symbol: impl Into<String>,
        quote_symbol: impl Into<String>,
        multiplier: f64,
        margin_per_contract: f64,
        tick_size: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            quote_symbol: quote_symbol.into(),
            multiplier,
            margin_per_contract,
            tick_size,
        }
    }

    /// E-mini Nasdaq-100: $20 per point, $15,000 margin.
    pub fn nq() -> Self {
        Self::new("NQ", "NQ=F", 20.0, 15_000.0, 0.25)
    }

    /// Micro E-mini Nasdaq-100: $2 per point, $1,500 margin.
    pub fn mnq() -> Self {
        Self::new("MNQ", "MNQ=F", 2.0, 1_500.0, 0.25)
    }

    /// Currency value of one tick per contract.
    pub fn tick_value(&self) -> f64 {
        self.multiplier * self.tick_size
    }

    pub fn required_margin(&self, contracts: u32) -> f64 {
        self.margin_per_contract * contracts as f64
    }
}

/// Lookup of instrument specs keyed by symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentTable {
    specs: Vec<InstrumentSpec>,
}

impl InstrumentTable {
    pub fn new(specs: Vec<InstrumentSpec>) -> Self {
        Self { specs }
    }

    /// Case-insensitive lookup by order symbol.
    pub fn get(&self, symbol: &str) -> Option<&InstrumentSpec> {
        self.specs
            .iter()
            .find(|s| s.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.symbol.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstrumentSpec> {
        self.specs.iter()
    }
}

impl Default for InstrumentTable {
    fn default() -> Self {
        Self::new(vec![InstrumentSpec::nq(), InstrumentSpec::mnq()])
    }
}
