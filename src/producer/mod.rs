//! Buffering Scribe producer.
//!
//! This module defines [`ScribeProducer`], which queues
//! [`LogRecord`](crate::log_record::LogRecord) values in memory and ships
//! them to a Scribe collector from a dedicated flush thread. Each cycle
//! drains the queue, opens a fresh connection, sends Thrift `Log` calls over
//! framed transport and requeues whatever the collector did not accept.
//!
//! # Retry Semantics
//!
//! - **Connect failure**: the whole drained batch returns to the front of
//!   the queue.
//! - **`TRY_LATER`**: only the records of that call are retried; the batch
//!   continues.
//! - **Stream or protocol failure**: the failing call and every record not
//!   yet attempted are retried; nothing else is sent on that connection.
//!
//! Retried records re-enter at the tail, behind records enqueued while the
//! cycle ran.

pub(crate) mod backoff;
mod builder;
pub mod codec;
mod config;
mod flush;
mod handle;
mod observers;
mod queue;
mod scheduler;
mod transport;


pub use builder::{ProducerBuildError, ProducerBuilder};
pub use config::{
    BackoffPolicy, DEFAULT_CONNECT_TIMEOUT, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_QUEUE_BUFFER,
    DEFAULT_PORT, ProducerConfig,
};
pub use flush::{CycleReport, FlushOutcome};
pub use handle::ScribeProducer;
pub use scheduler::SchedulerState;
pub use transport::{
    CollectorConnection, ConnectionError, Connector, ItemError, SendError, TcpConnection,
    TcpConnector,
};
