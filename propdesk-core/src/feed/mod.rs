//! Price feed adapter.
//!
//! A single [`PriceCell`] holds the current price. [`FeedAdapter::refresh`]
//! updates it from the configured [`PriceFeed`] and degrades to a simulated
//! price on any failure, so readers never see an undefined price once the
//! first refresh has run.

pub mod circuit_breaker;
pub mod quote;
pub mod stream;
mod walk;

pub use circuit_breaker::CircuitBreaker;
pub use quote::YahooQuoteFeed;
pub use stream::{spawn_line_reader, spawn_socket_reader, AggregateStreamFeed, StreamEndpoint};
pub use walk::RandomWalk;

use crate::config::{FeedConfig, FeedMode};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by quote source (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("unexpected response: {0}")]
    ResponseFormat(String),

    #[error("quote source blocked (circuit breaker open)")]
    CircuitOpen,

    #[error("stream transport disconnected")]
    Disconnected,

    #[error("no price in response")]
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Synchronous read of the current price.
pub trait PriceSource: Send + Sync {
    fn current_price(&self) -> Option<f64>;
}

/// Lock-free current-price scalar. Unset until the first write.
#[derive(Debug)]
pub struct PriceCell {
    bits: AtomicU64,
}

impl PriceCell {
    pub fn new() -> Self {
        Self { bits: AtomicU64::new(f64::NAN.to_bits()) }
    }

    pub fn with_price(price: f64) -> Self {
        let cell = Self::new();
        cell.set(price);
        cell
    }

    pub fn get(&self) -> Option<f64> {
        let price = f64::from_bits(self.bits.load(Ordering::Acquire));
        (!price.is_nan()).then_some(price)
    }

    pub fn set(&self, price: f64) {
        self.bits.store(price.to_bits(), Ordering::Release);
    }
}

impl Default for PriceCell {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceSource for PriceCell {
    fn current_price(&self) -> Option<f64> {
        self.get()
    }
}

/// An external price source behind the adapter.
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &str;

    fn fetch_price(&self) -> Result<f64, FeedError>;

    /// False while the source is known to refuse requests.
    fn is_available(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceOrigin {
    Live,
    /// First fallback: no price had been established yet.
    Baseline,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub price: f64,
    pub origin: PriceOrigin,
}

pub struct FeedAdapter {
    source: Option<Box<dyn PriceFeed>>,
    cell: Arc<PriceCell>,
    walk: RandomWalk,
    baseline: f64,
    interval: Duration,
}

impl FeedAdapter {
    pub fn new(source: Option<Box<dyn PriceFeed>>, config: &FeedConfig) -> Self {
        Self {
            source,
            cell: Arc::new(PriceCell::new()),
            walk: RandomWalk::from_config(config),
            baseline: config.baseline_price,
            interval: config.interval(),
        }
    }

    /// Adapter for the configured mode.
    ///
    /// `stream` mode connects the websocket reader with the API key named by
    /// `stream_api_key_env`. Without a key it runs on the simulated fallback.
    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        let source: Option<Box<dyn PriceFeed>> = match config.mode {
            FeedMode::Quote => Some(Box::new(YahooQuoteFeed::new(
                config.quote_symbol.clone(),
                Arc::new(CircuitBreaker::for_quotes()),
            )?)),
            FeedMode::Stream => match std::env::var(&config.stream_api_key_env) {
                Ok(api_key) if !api_key.trim().is_empty() => {
                    let (frames, _reader) =
                        spawn_socket_reader(StreamEndpoint::from_config(config, api_key));
                    Some(Box::new(AggregateStreamFeed::new(frames)))
                }
                _ => {
                    warn!(
                        env = %config.stream_api_key_env,
                        "no stream API key set, using simulated prices"
                    );
                    None
                }
            },
            FeedMode::Simulated => None,
        };
        Ok(Self::new(source, config))
    }

    pub fn cell(&self) -> Arc<PriceCell> {
        Arc::clone(&self.cell)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn source_name(&self) -> &str {
        self.source.as_ref().map_or("simulated", |s| s.name())
    }

    fn fallback(&self) -> PriceUpdate {
        match self.cell.get() {
            None => PriceUpdate { price: self.baseline, origin: PriceOrigin::Baseline },
            Some(current) => PriceUpdate {
                price: self.walk.next(current),
                origin: PriceOrigin::Simulated,
            },
        }
    }

    /// Pull one price and publish it to the cell.
    pub fn refresh(&self) -> PriceUpdate {
        let update = match &self.source {
            Some(source) if source.is_available() => match source.fetch_price() {
                Ok(price) => PriceUpdate { price, origin: PriceOrigin::Live },
                Err(e) => {
                    warn!(source = source.name(), error = %e, "price fetch failed, using simulated price");
                    self.fallback()
                }
            },
            Some(source) => {
                debug!(source = source.name(), "price source unavailable, using simulated price");
                self.fallback()
            }
            None => self.fallback(),
        };
        self.cell.set(update.price);
        update
    }
}

impl PriceSource for FeedAdapter {
    fn current_price(&self) -> Option<f64> {
        self.cell.get()
    }
}

/// Refresh `adapter` every `interval` on a background thread until `stop`
/// is raised. The first refresh happens immediately.
pub fn spawn_poller(
    adapter: Arc<FeedAdapter>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    const SLICE: Duration = Duration::from_millis(100);
    thread::spawn(move || {
        info!(source = adapter.source_name(), ?interval, "price poller started");
        while !stop.load(Ordering::Relaxed) {
            adapter.refresh();
            let mut waited = Duration::ZERO;
            while waited < interval && !stop.load(Ordering::Relaxed) {
                let nap = SLICE.min(interval - waited);
                thread::sleep(nap);
                waited += nap;
            }
        }
        info!("price poller stopped");
    })
}

/// Synthetic 5-minute candles around `baseline`, the last one at `end`.
pub fn synthetic_history(baseline: f64, count: usize, end: DateTime<Utc>, seed: Option<u64>) -> Vec<Candle> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let round = |v: f64| (v * 100.0).round() / 100.0;
    (0..count)
        .map(|i| {
            let open = baseline + (rng.gen::<f64>() - 0.5) * 200.0;
            let close = open + (rng.gen::<f64>() - 0.5) * 50.0;
            let high = open.max(close) + rng.gen::<f64>() * 20.0;
            let low = open.min(close) - rng.gen::<f64>() * 20.0;
            let back = (count - 1 - i) as i64;
            Candle {
                time: end - ChronoDuration::minutes(5 * back),
                open: round(open),
                high: round(high),
                low: round(low),
                close: round(close),
                volume: rng.gen::<f64>() * 1_000.0 + 500.0,
            }
        })
        .collect()
}
