//! One flush cycle: drain, deliver, settle, notify, close.

use log::{debug, warn};

use crate::{log_record::LogRecord, rate_limited_warner::RateLimitedWarner};

use super::{
    observers::FlushObservers,
    queue::{RecordQueue, RetryPlacement},
    transport::{CollectorConnection, Connector, SendError},
};

/// State shared between the producer handle and the flush thread.
pub(crate) struct ProducerShared {
    pub(crate) queue: RecordQueue,
    pub(crate) observers: FlushObservers,
    /// Counts records refused by `try_send`.
    pub(crate) rejected: RateLimitedWarner,
    /// Tracks how many records the latest connection failure held back.
    pub(crate) undelivered: RateLimitedWarner,
}

/// Per-attempt delivery result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Whether a connection to the collector was established.
    pub connected: bool,
    /// Every drained record, in drain order, with its delivery flag.
    pub results: Vec<(LogRecord, bool)>,
}

impl FlushOutcome {
    /// Outcome of a cycle whose connect attempt failed.
    pub fn unreachable(records: Vec<LogRecord>) -> Self {
        Self {
            connected: false,
            results: records.into_iter().map(|r| (r, false)).collect(),
        }
    }

    pub fn delivered(&self) -> usize {
        self.results.iter().filter(|(_, ok)| *ok).count()
    }

    pub fn retried(&self) -> usize {
        self.results.len() - self.delivered()
    }

    /// Requeue the undelivered records.
    ///
    /// Delivered records already released their slots during delivery. A
    /// batch that never reached the collector goes back ahead of newer
    /// records; retries from a live connection go behind them.
    fn settle(self, queue: &RecordQueue) {
        let placement = if self.connected {
            RetryPlacement::Back
        } else {
            RetryPlacement::Front
        };
        let retry = self
            .results
            .into_iter()
            .filter_map(|(record, ok)| (!ok).then_some(record))
            .collect();
        queue.settle(retry, placement);
    }
}

/// Summary of a cycle handed back to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleReport {
    /// The queue was empty; no connection was opened.
    Idle,
    /// The collector could not be reached.
    Unreachable,
    /// A connection was made.
    Completed { delivered: usize, retried: usize },
}

/// Run one flush cycle against `connector`.
pub(crate) fn run_cycle<C: Connector>(
    shared: &ProducerShared,
    connector: &C,
    batch_size: usize,
) -> CycleReport {
    let batch = shared.queue.drain();
    if batch.is_empty() {
        shared.observers.notify();
        return CycleReport::Idle;
    }

    let drained = batch.len();
    let (outcome, connection) = match connector.connect() {
        Ok(mut conn) => {
            let outcome = deliver(&mut conn, batch, batch_size, shared);
            (outcome, Some(conn))
        }
        Err(err) => {
            shared.undelivered.record_latest(drained as u64);
            shared.undelivered.warn_if_due(|count| {
                warn!("ScribeProducer failed to connect: {err}; {count} records held for retry");
            });
            (FlushOutcome::unreachable(batch), None)
        }
    };

    let report = if outcome.connected {
        CycleReport::Completed {
            delivered: outcome.delivered(),
            retried: outcome.retried(),
        }
    } else {
        CycleReport::Unreachable
    };
    outcome.settle(&shared.queue);
    shared.observers.notify();
    if let Some(conn) = connection {
        conn.close_best_effort();
    }

    debug!("ScribeProducer flush cycle over {drained} records: {report:?}");
    report
}

fn deliver<Conn: CollectorConnection>(
    conn: &mut Conn,
    batch: Vec<LogRecord>,
    batch_size: usize,
    shared: &ProducerShared,
) -> FlushOutcome {
    let mut results = Vec::with_capacity(batch.len());
    let mut pending = batch.into_iter();
    loop {
        let chunk: Vec<LogRecord> = pending.by_ref().take(batch_size).collect();
        if chunk.is_empty() {
            break;
        }
        match conn.log(&chunk) {
            Ok(()) => {
                shared.queue.release(chunk.len());
                results.extend(chunk.into_iter().map(|r| (r, true)));
            }
            Err(SendError::Item(err)) => {
                debug!("ScribeProducer deferred {} records: {err}", chunk.len());
                results.extend(chunk.into_iter().map(|r| (r, false)));
            }
            Err(SendError::Connection(err)) => {
                let held = chunk.len() + pending.len();
                shared.undelivered.record_latest(held as u64);
                shared.undelivered.warn_if_due(|count| {
                    warn!("ScribeProducer connection failed mid-batch: {err}; {count} records held for retry");
                });
                results.extend(chunk.into_iter().chain(pending).map(|r| (r, false)));
                break;
            }
        }
    }
    FlushOutcome {
        connected: true,
        results,
    }
}
