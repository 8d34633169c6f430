use crate::config::FeedConfig;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bounded random walk used when no live price is available.
#[derive(Debug)]
pub struct RandomWalk {
    rng: Mutex<StdRng>,
    step: f64,
    low: f64,
    high: f64,
}

impl RandomWalk {
    pub fn new(step: f64, low: f64, high: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng: Mutex::new(rng), step, low, high }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(config.walk_step, config.band_low, config.band_high, config.seed)
    }

    /// Move `current` by up to ±step/2, clamped to the band.
    pub fn next(&self, current: f64) -> f64 {
        let r: f64 = self.rng.lock().gen();
        (current + (r - 0.5) * self.step).clamp(self.low, self.high)
    }
}
