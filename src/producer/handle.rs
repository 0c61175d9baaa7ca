//! Public producer type exported by the crate.

use std::{
    sync::Arc,
    thread::{self, ThreadId},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};

use crate::{log_record::LogRecord, rate_limited_warner::RateLimitedWarner};

use super::{
    builder::{ProducerBuildError, validate_config},
    config::ProducerConfig,
    flush::{ProducerShared, run_cycle},
    observers::FlushObservers,
    queue::RecordQueue,
    scheduler::{FlushScheduler, SchedulerCommand, SchedulerState, StateCell, spawn_scheduler},
    transport::{Connector, TcpConnector},
};

/// Buffering producer forwarding records to a Scribe collector.
///
/// Callers enqueue with [`try_send`](Self::try_send), which never blocks. A
/// dedicated flush thread drains the queue every `flush_interval`, delivers
/// the drained records over a fresh connection and requeues whatever the
/// collector did not accept. Flush failures never reach callers; they only
/// observe backpressure (`try_send` returning `false`) and, optionally, the
/// per-cycle completion signal.
pub struct ScribeProducer {
    shared: Arc<ProducerShared>,
    tx: Option<Sender<SchedulerCommand>>,
    handle: Option<thread::JoinHandle<()>>,
    flush_thread: ThreadId,
    state: Arc<StateCell>,
    config: ProducerConfig,
}

impl ScribeProducer {
    /// Construct a producer targeting `host:port` with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ProducerBuildError> {
        Self::with_config(ProducerConfig::new(host, port))
    }

    /// Construct the producer from a configuration object.
    pub fn with_config(config: ProducerConfig) -> Result<Self, ProducerBuildError> {
        let connector = TcpConnector::new(
            config.host.clone(),
            config.port,
            config.connect_timeout,
            config.max_frame_size,
        );
        Self::with_connector(config, connector)
    }

    /// Construct the producer with a custom [`Connector`].
    pub fn with_connector<C: Connector>(
        config: ProducerConfig,
        connector: C,
    ) -> Result<Self, ProducerBuildError> {
        validate_config(&config)?;
        let shared = Arc::new(ProducerShared {
            queue: RecordQueue::new(config.max_queue_buffer),
            observers: FlushObservers::new(),
            rejected: RateLimitedWarner::new(config.warn_interval),
            undelivered: RateLimitedWarner::new(config.warn_interval),
        });
        let batch_size = config.batch_size;
        let cycle_shared = Arc::clone(&shared);
        let FlushScheduler { tx, handle, state } = spawn_scheduler(
            config.flush_interval,
            config.reconnect_backoff.clone(),
            move || run_cycle(&cycle_shared, &connector, batch_size),
        )?;
        Ok(Self {
            shared,
            tx: Some(tx),
            flush_thread: handle.thread().id(),
            handle: Some(handle),
            state,
            config,
        })
    }

    /// Enqueue a record without blocking.
    ///
    /// Returns `false`, leaving the queue untouched, when the producer
    /// already holds `max_queue_buffer` records (queued or in flight) or has
    /// been closed. The caller decides whether to drop, retry or block.
    pub fn try_send(&self, category: impl Into<String>, message: impl Into<String>) -> bool {
        if self.tx.is_none() {
            return false;
        }
        match self.shared.queue.try_push(LogRecord::new(category, message)) {
            Ok(()) => true,
            Err(_) => {
                self.shared.rejected.record();
                self.shared.rejected.warn_if_due(|count| {
                    warn!("ScribeProducer queue full; rejected {count} records");
                });
                false
            }
        }
    }

    /// Register a callback invoked after every completed flush cycle.
    ///
    /// The callback runs on the flush thread once requeue bookkeeping is
    /// done, so [`len`](Self::len) already reflects the cycle's outcome.
    /// [`flush`](Self::flush) called from the callback returns `false`
    /// without waiting.
    pub fn on_queue_flushed(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.shared.observers.register(observer);
    }

    /// Channel receiving one token per completed cycle.
    ///
    /// Tokens coalesce while unread.
    pub fn flush_notifications(&self) -> Receiver<()> {
        self.shared.observers.subscribe()
    }

    /// Run a flush cycle now and wait for it to complete.
    ///
    /// The cycle still executes on the flush thread, after any cycle already
    /// in progress. Returns `false` when the producer is closed, when called
    /// from the flush thread itself (an observer), or when the cycle does not
    /// finish within twice the connect timeout.
    pub fn flush(&self) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        if self.on_flush_thread() {
            debug!("ScribeProducer: flush requested from the flush thread; ignored");
            return false;
        }
        self.shared.rejected.flush(|count| {
            warn!("ScribeProducer rejected {count} records in the last interval");
        });
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(SchedulerCommand::FlushNow(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(self.ack_timeout()).is_ok()
    }

    /// Number of records waiting for the next cycle.
    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Whether no records are waiting for the next cycle.
    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    /// Records held by the producer, queued or in flight, against the
    /// capacity bound.
    pub fn occupancy(&self) -> usize {
        self.shared.queue.occupancy()
    }

    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Queued records in delivery order.
    pub fn pending_records(&self) -> Vec<LogRecord> {
        self.shared.queue.snapshot()
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.state.get()
    }

    /// Stop the flush thread after one final best-effort cycle.
    ///
    /// Waits at most twice the connect timeout for that cycle; a thread that
    /// does not acknowledge in time is detached rather than joined. Records
    /// the final cycle cannot deliver stay in memory and are lost when the
    /// producer is dropped.
    pub fn close(&mut self) {
        if self.on_flush_thread() {
            // Dropping the sender stops the thread once this cycle returns.
            self.tx = None;
            self.handle = None;
            return;
        }
        if self.request_shutdown() {
            self.join_worker();
        } else {
            self.detach_worker();
        }
    }

    /// Whether the caller is this producer's own flush thread, i.e. an
    /// observer callback.
    fn on_flush_thread(&self) -> bool {
        thread::current().id() == self.flush_thread
    }

    fn ack_timeout(&self) -> Duration {
        self.config.connect_timeout.saturating_mul(2)
    }

    /// Ask the flush thread to stop. Returns `true` once it is safe to join.
    fn request_shutdown(&mut self) -> bool {
        let Some(tx) = self.tx.take() else {
            return true;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(SchedulerCommand::Shutdown(ack_tx)).is_err() {
            // Thread already gone; joining returns at once.
            return true;
        }
        ack_rx.recv_timeout(self.ack_timeout()).is_ok()
    }

    fn join_worker(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.join().is_err() {
            warn!("ScribeProducer: flush thread panicked");
        }
    }

    fn detach_worker(&mut self) {
        if self.handle.take().is_some() {
            warn!("ScribeProducer: flush thread did not stop in time; detached");
        }
    }
}

impl Drop for ScribeProducer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ScribeProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScribeProducer")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("queued", &self.shared.queue.len())
            .field("state", &self.state.get())
            .finish()
    }
}
