//! Capacity-bounded record queue shared by callers and the flush thread.
//!
//! Callers append one record at a time; the flush cycle takes the whole
//! queue in a single operation. Acknowledged records free their slots as soon
//! as their call returns; records still awaiting delivery count against the
//! capacity, so requeued retries never push the producer over `capacity`.

use std::{collections::VecDeque, mem};

use parking_lot::Mutex;

use crate::log_record::LogRecord;

/// Where undelivered records re-enter the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RetryPlacement {
    /// Ahead of anything enqueued while the cycle ran.
    Front,
    /// Behind anything enqueued while the cycle ran.
    Back,
}

#[derive(Default)]
struct QueueState {
    records: VecDeque<LogRecord>,
    in_flight: usize,
}

/// FIFO of pending records with an occupancy bound.
pub struct RecordQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl RecordQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity,
        }
    }

    /// Append `record` unless the occupancy bound is reached.
    ///
    /// On rejection the record is handed back and the queue is untouched.
    pub fn try_push(&self, record: LogRecord) -> Result<(), LogRecord> {
        let mut state = self.state.lock();
        if state.records.len() + state.in_flight >= self.capacity {
            return Err(record);
        }
        state.records.push_back(record);
        Ok(())
    }

    /// Take every queued record, marking them in flight.
    pub fn drain(&self) -> Vec<LogRecord> {
        let mut state = self.state.lock();
        let drained = mem::take(&mut state.records);
        state.in_flight += drained.len();
        drained.into()
    }

    /// Free the slots of `delivered` records the collector acknowledged.
    ///
    /// Called per `Log` call, so callers can enqueue again while the rest of
    /// the batch is still being sent.
    pub fn release(&self, delivered: usize) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(delivered);
    }

    /// Requeue the undelivered `retry` records in order, releasing their
    /// in-flight slots.
    pub(crate) fn settle(&self, retry: Vec<LogRecord>, placement: RetryPlacement) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(retry.len());
        match placement {
            RetryPlacement::Back => state.records.extend(retry),
            RetryPlacement::Front => {
                for record in retry.into_iter().rev() {
                    state.records.push_front(record);
                }
            }
        }
    }

    /// Number of queued records, excluding any in flight.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Queued plus in-flight records.
    pub fn occupancy(&self) -> usize {
        let state = self.state.lock();
        state.records.len() + state.in_flight
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the queued records in delivery order.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.state.lock().records.iter().cloned().collect()
    }
}
