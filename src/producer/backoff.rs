//! Exponential backoff state machine used by the flush scheduler.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::config::BackoffPolicy;

const MIN_SLEEP_MS: u64 = 10;

/// Tracks consecutive unreachable cycles and produces jittered delays.
pub struct BackoffState {
    policy: BackoffPolicy,
    current: Duration,
    failing: bool,
    rng: StdRng,
}

impl BackoffState {
    /// Create a new state machine from the supplied policy.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current: policy.base,
            failing: false,
            rng: StdRng::from_entropy(),
            policy,
        }
    }

    /// Record a cycle that reached the collector.
    pub fn record_success(&mut self) {
        self.current = self.policy.base;
        self.failing = false;
    }

    /// Calculate the next jittered delay following a connect failure.
    ///
    /// The window doubles on every consecutive failure, up to the cap.
    pub fn next_sleep(&mut self) -> Duration {
        if self.failing {
            self.current = self.current.saturating_mul(2).min(self.policy.cap);
        }
        self.failing = true;

        let max_ms = self.current.as_millis().min(u128::from(u64::MAX)) as u64;
        let sleep_ms = match max_ms {
            0 => MIN_SLEEP_MS,
            1..=MIN_SLEEP_MS => max_ms,
            _ => self.rng.gen_range(MIN_SLEEP_MS..=max_ms),
        };
        Duration::from_millis(sleep_ms)
    }

    /// Upper bound of the current jitter window.
    #[cfg_attr(not(test), expect(dead_code, reason = "inspected by tests only"))]
    pub fn window(&self) -> Duration {
        self.current
    }
}
