//! Configuration structures consumed by the producer lifecycle.
//!
//! [`ProducerBuilder`](super::ProducerBuilder) and the INI loader construct
//! these values before passing them to
//! [`ScribeProducer`](super::ScribeProducer) for runtime use.

use std::time::Duration;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

/// Default port Scribe collectors listen on.
pub const DEFAULT_PORT: u16 = 1463;
/// Default delay between the end of one flush cycle and the start of the next.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(200);
/// Default maximum number of records held by the producer.
pub const DEFAULT_MAX_QUEUE_BUFFER: usize = 32_768;
/// Default timeout applied to connecting, writing and reading.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default number of records sent per `Log` call.
pub const DEFAULT_BATCH_SIZE: usize = 1;
/// Default maximum size (in bytes) of a response frame read from the collector.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 << 20; // 16 MiB
/// Default base delay for reconnect backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(200);
/// Default maximum delay for reconnect backoff.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Configuration object describing how to construct a
/// [`ScribeProducer`](super::ScribeProducer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerConfig {
    /// Collector hostname or IP address.
    pub host: String,
    /// Collector TCP port.
    pub port: u16,
    /// Delay armed after construction and after every completed cycle.
    pub flush_interval: Duration,
    /// Upper bound on queued plus in-flight records.
    pub max_queue_buffer: usize,
    /// Connect timeout, also applied to socket reads and writes.
    pub connect_timeout: Duration,
    /// Records carried by a single `Log` call.
    pub batch_size: usize,
    /// Largest response frame accepted from the collector.
    pub max_frame_size: usize,
    /// Interval between rate-limited warnings.
    pub warn_interval: Duration,
    /// Backoff applied after connect failures; `None` keeps the fixed interval.
    pub reconnect_backoff: Option<BackoffPolicy>,
}

impl ProducerConfig {
    /// Configuration targeting `host:port` with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_queue_buffer: DEFAULT_MAX_QUEUE_BUFFER,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            warn_interval: DEFAULT_WARN_INTERVAL,
            reconnect_backoff: None,
        }
    }
}

/// Exponential backoff policy for cycles that could not reach the collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }
}
