//! Asynchronous Scribe log producer.
//!
//! Records are enqueued without blocking through [`ScribeProducer::try_send`]
//! and shipped to a Scribe collector by a background flush thread using the
//! Thrift `Log` call over framed TCP.
//!
//! ```no_run
//! use scribe_producer::ProducerBuilder;
//!
//! let producer = ProducerBuilder::new()
//!     .with_collector("localhost", 1463)
//!     .with_flush_interval_ms(200)
//!     .build()?;
//! if !producer.try_send("default", "hello") {
//!     // queue full; drop or retry later
//! }
//! # Ok::<(), scribe_producer::ProducerBuildError>(())
//! ```

pub mod file_config;
pub mod log_record;
pub mod producer;
pub mod rate_limited_warner;

pub use file_config::{load_config, parse_config};
pub use log_record::LogRecord;
pub use producer::{
    BackoffPolicy, CollectorConnection, ConnectionError, Connector, CycleReport, FlushOutcome,
    ItemError, ProducerBuildError, ProducerBuilder, ProducerConfig, SchedulerState,
    ScribeProducer, SendError, TcpConnection, TcpConnector,
    codec::{CodecError, ResultCode},
};
