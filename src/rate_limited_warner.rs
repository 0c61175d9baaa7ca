use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default interval between rate-limited warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Helper that rate limits warnings about rejected or undelivered records.
///
/// The caller increments the counter via [`record`](Self::record) or
/// replaces it via [`record_latest`](Self::record_latest). The next call to
/// [`warn_if_due`](Self::warn_if_due) emits a warning using the provided
/// callback if the configured interval has elapsed. [`flush`](Self::flush)
/// emits a warning immediately if anything was counted since the last
/// emission.
pub struct RateLimitedWarner {
    interval_ms: u64,
    last_warn: AtomicU64,
    count: AtomicU64,
}

impl RateLimitedWarner {
    /// Create a new [`RateLimitedWarner`]. The first warning can be emitted
    /// immediately.
    pub fn new(interval: Duration) -> Self {
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        Self {
            interval_ms,
            last_warn: AtomicU64::new(now_millis().saturating_sub(interval_ms)),
            count: AtomicU64::new(0),
        }
    }

    /// Increment the counter by one.
    pub fn record(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Replace the counter with `n`.
    ///
    /// Suits values that describe current state, such as records still held
    /// after a retry, where summing repeated observations would overcount.
    pub fn record_latest(&self, n: u64) {
        self.count.store(n, Ordering::Relaxed);
    }

    /// Emit a warning if the rate limit interval has elapsed.
    pub fn warn_if_due(&self, mut warn: impl FnMut(u64)) {
        let now = now_millis();
        let prev = self.last_warn.load(Ordering::Relaxed);
        if now.saturating_sub(prev) >= self.interval_ms
            && self
                .last_warn
                .compare_exchange(prev, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            let count = self.count.swap(0, Ordering::Relaxed);
            if count > 0 {
                warn(count);
            }
        }
    }

    /// Immediately warn about anything counted since the last emission.
    pub fn flush(&self, mut warn: impl FnMut(u64)) {
        let count = self.count.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn.store(now_millis(), Ordering::Relaxed);
        }
    }
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}
