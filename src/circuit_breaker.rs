//! Run-scoped quota circuit breaker for the completion provider
//!
//! Unlike a self-healing breaker there is no half-open state: the first
//! rate-limit signal trips it and it stays tripped for the rest of the run.
//! Every later classification short-circuits without calling the provider.
//! A new run gets a new breaker, so tripping never leaks across runs.
//!
//! # States
//!
//! - **Closed**: requests go to the provider
//! - **Tripped**: the provider reported a rate limit; requests are skipped
//!
//! # Usage
//!
//! ```
//! use gmail_autoreply::circuit_breaker::{CircuitState, QuotaBreaker};
//! use gmail_autoreply::config::CircuitBreakerConfig;
//!
//! let breaker = QuotaBreaker::new(CircuitBreakerConfig { enabled: true });
//! assert!(breaker.allows_request());
//!
//! breaker.trip();
//! assert_eq!(breaker.state(), CircuitState::Tripped);
//! assert!(!breaker.allows_request());
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::CircuitBreakerConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Quota exhausted for the rest of the run
    Tripped,
}

#[derive(Debug)]
struct BreakerInner {
    enabled: bool,
    quota_exceeded: AtomicBool,
    /// Rate-limit signals seen, including ones after the trip
    signals: AtomicU32,
    /// Calls skipped because the breaker was tripped
    short_circuited: AtomicU32,
}

/// Shared handle to one run's quota flag
///
/// Cloning shares the flag. The flag is single-writer/multi-reader; the
/// release store in [`QuotaBreaker::trip`] happens-before any acquire load in
/// [`QuotaBreaker::allows_request`] that observes it.
#[derive(Debug, Clone)]
pub struct QuotaBreaker {
    inner: Arc<BreakerInner>,
}

impl QuotaBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(BreakerInner {
                enabled: config.enabled,
                quota_exceeded: AtomicBool::new(false),
                signals: AtomicU32::new(0),
                short_circuited: AtomicU32::new(0),
            }),
        }
    }

    /// Whether a provider call may be made
    pub fn allows_request(&self) -> bool {
        !self.inner.quota_exceeded.load(Ordering::Acquire)
    }

    /// Record that a call was skipped because the breaker is tripped
    pub fn record_short_circuit(&self) {
        self.inner.short_circuited.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rate-limit signal from the provider
    ///
    /// Returns true if this call tripped the breaker.
    pub fn trip(&self) -> bool {
        self.inner.signals.fetch_add(1, Ordering::Relaxed);

        if !self.inner.enabled {
            debug!("Quota breaker disabled, ignoring rate-limit signal");
            return false;
        }

        let was_tripped = self.inner.quota_exceeded.swap(true, Ordering::AcqRel);
        if !was_tripped {
            warn!("Quota breaker tripped: remaining messages in this run will skip the provider");
        }
        !was_tripped
    }

    pub fn state(&self) -> CircuitState {
        if self.allows_request() {
            CircuitState::Closed
        } else {
            CircuitState::Tripped
        }
    }

    pub fn stats(&self) -> BreakerStats {
        BreakerStats {
            state: self.state(),
            rate_limit_signals: self.inner.signals.load(Ordering::Relaxed),
            short_circuited: self.inner.short_circuited.load(Ordering::Relaxed),
        }
    }
}

impl Default for QuotaBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// Breaker statistics for the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub rate_limit_signals: u32,
    pub short_circuited: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> QuotaBreaker {
        QuotaBreaker::new(CircuitBreakerConfig { enabled: true })
    }

    #[test]
    fn test_starts_closed() {
        let breaker = enabled();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allows_request());
    }

    #[test]
    fn test_trip_is_permanent() {
        let breaker = enabled();
        assert!(breaker.trip());

        for _ in 0..5 {
            assert!(!breaker.allows_request());
        }
        assert_eq!(breaker.state(), CircuitState::Tripped);
    }

    #[test]
    fn test_only_first_signal_trips() {
        let breaker = enabled();
        assert!(breaker.trip());
        assert!(!breaker.trip());
        assert!(!breaker.trip());

        let stats = breaker.stats();
        assert_eq!(stats.rate_limit_signals, 3);
        assert_eq!(stats.state, CircuitState::Tripped);
    }

    #[test]
    fn test_clones_share_state() {
        let breaker = enabled();
        let observer = breaker.clone();

        breaker.trip();
        assert!(!observer.allows_request());
    }

    #[test]
    fn test_independent_breakers_do_not_share_state() {
        let first = enabled();
        let second = enabled();

        first.trip();
        assert!(second.allows_request());
    }

    #[test]
    fn test_disabled_breaker_never_trips() {
        let breaker = QuotaBreaker::new(CircuitBreakerConfig { enabled: false });
        assert!(!breaker.trip());
        assert!(breaker.allows_request());
        assert_eq!(breaker.stats().rate_limit_signals, 1);
    }

    #[test]
    fn test_short_circuit_counter() {
        let breaker = enabled();
        breaker.trip();
        breaker.record_short_circuit();
        breaker.record_short_circuit();
        assert_eq!(breaker.stats().short_circuited, 2);
    }

    #[tokio::test]
    async fn test_trip_visible_across_tasks() {
        let breaker = enabled();
        let writer = breaker.clone();

        tokio::spawn(async move {
            writer.trip();
        })
        .await
        .unwrap();

        assert!(!breaker.allows_request());
    }
}
