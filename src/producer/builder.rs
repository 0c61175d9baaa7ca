//! Builder for [`ScribeProducer`](super::ScribeProducer).
//!
//! Exposes the collector address, flush cadence, queue capacity, timeouts,
//! batching and reconnect backoff. Every setter is optional; validation runs
//! once in [`ProducerBuilder::build_config`].

use std::{io, time::Duration};

use thiserror::Error;

use super::{
    config::{BackoffPolicy, ProducerConfig},
    handle::ScribeProducer,
};

/// Errors that may occur while building a producer.
#[derive(Debug, Error)]
pub enum ProducerBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid producer configuration: {0}")]
    InvalidConfig(String),
    /// Underlying I/O error whilst creating the producer.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The configuration file could not be read or parsed.
    #[error("failed to load producer configuration: {0}")]
    Ini(#[from] ini::Error),
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ProducerBuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for constructing [`ScribeProducer`] instances.
#[derive(Clone, Debug, Default)]
pub struct ProducerBuilder {
    host: Option<String>,
    port: Option<u16>,
    flush_interval_ms: Option<u64>,
    max_queue_buffer: Option<usize>,
    connect_timeout_ms: Option<u64>,
    batch_size: Option<usize>,
    max_frame_size: Option<usize>,
    warn_interval_ms: Option<u64>,
    backoff_base_ms: Option<u64>,
    backoff_cap_ms: Option<u64>,
}

impl ProducerBuilder {
    /// Create a new builder with every field defaulted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target the collector at `host:port`.
    pub fn with_collector(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    option_setter!(
        #[doc = "Set the delay between flush cycles in milliseconds."]
        with_flush_interval_ms,
        flush_interval_ms,
        u64
    );
    option_setter!(
        #[doc = "Set the maximum number of records held by the producer."]
        with_max_queue_buffer,
        max_queue_buffer,
        usize
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_batch_size, batch_size, usize);
    option_setter!(with_max_frame_size, max_frame_size, usize);
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);

    /// Enable reconnect backoff with the given base and cap.
    pub fn with_backoff_ms(mut self, base_ms: u64, cap_ms: u64) -> Self {
        self.backoff_base_ms = Some(base_ms);
        self.backoff_cap_ms = Some(cap_ms);
        self
    }

    pub(crate) fn set_host(&mut self, host: String) {
        self.host = Some(host);
    }

    pub(crate) fn set_port(&mut self, port: u16) {
        self.port = Some(port);
    }

    pub(crate) fn set_backoff_base_ms(&mut self, base_ms: u64) {
        self.backoff_base_ms = Some(base_ms);
    }

    pub(crate) fn set_backoff_cap_ms(&mut self, cap_ms: u64) {
        self.backoff_cap_ms = Some(cap_ms);
    }

    fn validate(&self) -> Result<(), ProducerBuildError> {
        if let Some(host) = &self.host
            && host.trim().is_empty()
        {
            return Err(ProducerBuildError::InvalidConfig(
                "host must not be empty".into(),
            ));
        }
        if let Some(interval) = self.flush_interval_ms {
            ensure_positive!(interval, "flush_interval_ms")?;
        }
        if let Some(capacity) = self.max_queue_buffer {
            ensure_positive!(capacity, "max_queue_buffer")?;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(size) = self.batch_size {
            ensure_positive!(size, "batch_size")?;
        }
        if let Some(size) = self.max_frame_size {
            ensure_positive!(size, "max_frame_size")?;
        }
        self.validate_backoff()
    }

    fn validate_backoff(&self) -> Result<(), ProducerBuildError> {
        if let Some(base) = self.backoff_base_ms {
            ensure_positive!(base, "backoff_base_ms")?;
        }
        if let Some(cap) = self.backoff_cap_ms {
            ensure_positive!(cap, "backoff_cap_ms")?;
        }
        if let (Some(base), Some(cap)) = (self.backoff_base_ms, self.backoff_cap_ms)
            && cap < base
        {
            return Err(ProducerBuildError::InvalidConfig(
                "backoff_cap_ms must not be smaller than backoff_base_ms".into(),
            ));
        }
        Ok(())
    }

    /// Validate the builder and produce the resulting configuration.
    pub fn build_config(&self) -> Result<ProducerConfig, ProducerBuildError> {
        self.validate()?;
        let mut config = ProducerConfig::default();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(interval) = self.flush_interval_ms {
            config.flush_interval = Duration::from_millis(interval);
        }
        if let Some(capacity) = self.max_queue_buffer {
            config.max_queue_buffer = capacity;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(timeout);
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(size) = self.max_frame_size {
            config.max_frame_size = size;
        }
        if let Some(interval) = self.warn_interval_ms {
            config.warn_interval = Duration::from_millis(interval);
        }
        config.reconnect_backoff = self.build_backoff();
        Ok(config)
    }

    fn build_backoff(&self) -> Option<BackoffPolicy> {
        if self.backoff_base_ms.is_none() && self.backoff_cap_ms.is_none() {
            return None;
        }
        let mut policy = BackoffPolicy::default();
        if let Some(base) = self.backoff_base_ms {
            policy.base = Duration::from_millis(base);
        }
        if let Some(cap) = self.backoff_cap_ms {
            policy.cap = Duration::from_millis(cap);
        }
        policy.cap = policy.cap.max(policy.base);
        Some(policy)
    }

    /// Build the producer, spawning its flush thread.
    pub fn build(&self) -> Result<ScribeProducer, ProducerBuildError> {
        ScribeProducer::with_config(self.build_config()?)
    }
}

/// Reject configurations the producer cannot run with.
pub(crate) fn validate_config(config: &ProducerConfig) -> Result<(), ProducerBuildError> {
    if config.host.trim().is_empty() {
        return Err(ProducerBuildError::InvalidConfig(
            "host must not be empty".into(),
        ));
    }
    if config.flush_interval < Duration::from_millis(1) {
        return Err(ProducerBuildError::InvalidConfig(
            "flush_interval_ms must be greater than zero".into(),
        ));
    }
    ensure_positive!(config.max_queue_buffer, "max_queue_buffer")?;
    if config.connect_timeout.is_zero() {
        return Err(ProducerBuildError::InvalidConfig(
            "connect_timeout_ms must be greater than zero".into(),
        ));
    }
    ensure_positive!(config.batch_size, "batch_size")?;
    ensure_positive!(config.max_frame_size, "max_frame_size")?;
    Ok(())
}
