//! Circuit breaker for the quote endpoint.
//!
//! HTTP 403 trips the breaker at once; repeated 429s or server errors trip it
//! after a threshold. While open, polls skip the network and the adapter
//! serves the simulated fallback.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests go through.
    Closed,
    /// Requests are skipped until the cooldown has elapsed.
    Open { tripped_at: Instant },
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
}

/// Shared by every poll of one quote source.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    /// Closed breaker that stays open for `cooldown` once tripped.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner { state: BreakerState::Closed, consecutive_failures: 0 }),
            cooldown,
            failure_threshold: 3,
        }
    }

    /// Five-minute cooldown, trips after 3 consecutive failures.
    pub fn for_quotes() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }

    /// Whether a request may go out now. An expired cooldown closes the
    /// breaker and clears the failure count.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open { tripped_at } if tripped_at.elapsed() >= self.cooldown => {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                true
            }
            BreakerState::Open { .. } => false,
        }
    }

    /// A good response clears the consecutive-failure count.
    pub fn record_success(&self) {
        self.inner.lock().consecutive_failures = 0;
    }

    /// Count a retryable failure (timeout, 429, 5xx); opens at the threshold.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
            inner.state = BreakerState::Open { tripped_at: Instant::now() };
        }
    }

    /// Open immediately, regardless of the failure count. Used for 403.
    pub fn trip(&self) {
        self.inner.lock().state = BreakerState::Open { tripped_at: Instant::now() };
    }

    /// Time until the breaker closes again; zero when closed.
    pub fn remaining_cooldown(&self) -> Duration {
        match self.inner.lock().state {
            BreakerState::Closed => Duration::ZERO,
            BreakerState::Open { tripped_at } => self.cooldown.saturating_sub(tripped_at.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures() {
        let cb = CircuitBreaker::new(Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_allowed());
        cb.record_failure();
        assert!(!cb.is_allowed());
        assert!(cb.remaining_cooldown() > Duration::ZERO);
    }

    #[test]
    fn success_resets_counter() {
        let cb = CircuitBreaker::new(Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.is_allowed());
    }

    #[test]
    fn trip_opens_without_failures() {
        let cb = CircuitBreaker::new(Duration::from_secs(60));
        assert_eq!(cb.remaining_cooldown(), Duration::ZERO);
        cb.trip();
        assert!(!cb.is_allowed());
        cb.record_success();
        assert!(!cb.is_allowed(), "a success does not close an open breaker");
    }

    #[test]
    fn expires_after_cooldown() {
        let cb = CircuitBreaker::new(Duration::from_millis(10));
        cb.trip();
        assert!(!cb.is_allowed());
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.is_allowed());
        assert_eq!(cb.remaining_cooldown(), Duration::ZERO);
    }
}
