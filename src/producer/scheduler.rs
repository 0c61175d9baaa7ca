//! Flush scheduler driving cycles on a dedicated thread.
//!
//! The timer is one-shot: it is armed for the flush interval, fires one
//! cycle, and is re-armed only once that cycle has fully completed. Cycles
//! therefore never overlap, however long the collector takes to answer.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use super::{
    backoff::BackoffState,
    config::BackoffPolicy,
    flush::CycleReport,
};

/// Lifecycle of the flush timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// Between a completed cycle and the timer being re-armed.
    Idle,
    /// Waiting for the interval to elapse.
    Armed,
    /// A cycle is running.
    Flushing,
    /// The scheduler thread has exited.
    Stopped,
}

impl SchedulerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Armed,
            2 => Self::Flushing,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Armed => 1,
            Self::Flushing => 2,
            Self::Stopped => 3,
        }
    }
}

/// Shared view of the scheduler state.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(SchedulerState::Idle.as_u8()))
    }

    pub(crate) fn get(&self) -> SchedulerState {
        SchedulerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: SchedulerState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// Commands processed by the scheduler thread.
#[derive(Debug)]
pub(crate) enum SchedulerCommand {
    /// Run a cycle now and acknowledge once it completes.
    FlushNow(Sender<()>),
    /// Run a final cycle, acknowledge, and exit.
    Shutdown(Sender<()>),
}

/// Handle to the scheduler thread.
pub(crate) struct FlushScheduler {
    pub(crate) tx: Sender<SchedulerCommand>,
    pub(crate) handle: JoinHandle<()>,
    pub(crate) state: Arc<StateCell>,
}

const FLUSH_THREAD_NAME: &str = "scribe-flush";

/// Spawn the scheduler thread. The first cycle fires after `interval`.
pub(crate) fn spawn_scheduler<F>(
    interval: Duration,
    backoff: Option<BackoffPolicy>,
    cycle: F,
) -> io::Result<FlushScheduler>
where
    F: FnMut() -> CycleReport + Send + 'static,
{
    let (tx, rx) = unbounded();
    let state = Arc::new(StateCell::new());
    let timer = Timer {
        interval,
        backoff: backoff.map(BackoffState::new),
        state: Arc::clone(&state),
        cycle,
    };
    let handle = thread::Builder::new()
        .name(FLUSH_THREAD_NAME.into())
        .spawn(move || timer.run(rx))?;
    Ok(FlushScheduler { tx, handle, state })
}

struct Timer<F> {
    interval: Duration,
    backoff: Option<BackoffState>,
    state: Arc<StateCell>,
    cycle: F,
}

impl<F> Timer<F>
where
    F: FnMut() -> CycleReport,
{
    fn run(mut self, rx: Receiver<SchedulerCommand>) {
        let mut delay = self.interval;
        loop {
            self.state.set(SchedulerState::Armed);
            match rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => delay = self.fire(),
                Ok(SchedulerCommand::FlushNow(ack)) => {
                    delay = self.fire();
                    let _ = ack.send(());
                }
                Ok(SchedulerCommand::Shutdown(ack)) => {
                    self.fire();
                    let _ = ack.send(());
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.fire();
                    break;
                }
            }
        }
        self.state.set(SchedulerState::Stopped);
    }

    /// Run one cycle and return the delay before the next one.
    fn fire(&mut self) -> Duration {
        self.state.set(SchedulerState::Flushing);
        let report = (self.cycle)();
        self.state.set(SchedulerState::Idle);
        self.next_delay(report)
    }

    fn next_delay(&mut self, report: CycleReport) -> Duration {
        let Some(backoff) = self.backoff.as_mut() else {
            return self.interval;
        };
        match report {
            CycleReport::Unreachable => backoff.next_sleep().max(self.interval),
            CycleReport::Completed { .. } => {
                backoff.record_success();
                self.interval
            }
            CycleReport::Idle => self.interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize},
        time::Instant,
    };

    use crossbeam_channel::bounded;
    use rstest::rstest;

    use super::*;

    fn shutdown(scheduler: FlushScheduler) {
        let (ack_tx, ack_rx) = bounded(1);
        scheduler
            .tx
            .send(SchedulerCommand::Shutdown(ack_tx))
            .expect("scheduler alive");
        ack_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("shutdown acknowledged");
        scheduler.handle.join().expect("join scheduler");
    }

    #[rstest]
    fn cycles_never_overlap_when_slower_than_interval() {
        let running = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let cycles = Arc::new(AtomicUsize::new(0));
        let (r, o, c) = (Arc::clone(&running), Arc::clone(&overlaps), Arc::clone(&cycles));
        let scheduler = spawn_scheduler(Duration::from_millis(1), None, move || {
            if r.swap(true, Ordering::SeqCst) {
                o.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(15));
            c.fetch_add(1, Ordering::SeqCst);
            r.store(false, Ordering::SeqCst);
            CycleReport::Idle
        })
        .expect("spawn scheduler");

        thread::sleep(Duration::from_millis(120));
        shutdown(scheduler);

        assert!(cycles.load(Ordering::SeqCst) >= 2);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn rearms_only_after_cycle_completes() {
        let (fired_tx, fired_rx) = unbounded();
        let scheduler = spawn_scheduler(Duration::from_millis(40), None, move || {
            let _ = fired_tx.send(Instant::now());
            thread::sleep(Duration::from_millis(60));
            CycleReport::Idle
        })
        .expect("spawn scheduler");

        let first = fired_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("first cycle");
        let second = fired_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("second cycle");
        shutdown(scheduler);

        // cycle duration plus the full interval
        assert!(second.duration_since(first) >= Duration::from_millis(100));
    }

    #[rstest]
    fn flush_now_runs_a_cycle_and_acknowledges() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&cycles);
        let scheduler = spawn_scheduler(Duration::from_secs(60), None, move || {
            c.fetch_add(1, Ordering::SeqCst);
            CycleReport::Idle
        })
        .expect("spawn scheduler");

        let (ack_tx, ack_rx) = bounded(1);
        scheduler
            .tx
            .send(SchedulerCommand::FlushNow(ack_tx))
            .expect("scheduler alive");
        ack_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("flush acknowledged");
        assert_eq!(cycles.load(Ordering::SeqCst), 1);

        let state = Arc::clone(&scheduler.state);
        shutdown(scheduler);
        assert_eq!(cycles.load(Ordering::SeqCst), 2, "shutdown runs a final cycle");
        assert_eq!(state.get(), SchedulerState::Stopped);
    }

    #[rstest]
    fn unreachable_cycles_back_off() {
        let (fired_tx, fired_rx) = unbounded();
        let policy = BackoffPolicy {
            base: Duration::from_millis(200),
            cap: Duration::from_millis(200),
        };
        let scheduler = spawn_scheduler(Duration::from_millis(5), Some(policy), move || {
            let _ = fired_tx.send(Instant::now());
            CycleReport::Unreachable
        })
        .expect("spawn scheduler");

        let mut fired = Vec::new();
        while fired.len() < 3 {
            fired.push(
                fired_rx
                    .recv_timeout(Duration::from_secs(2))
                    .expect("cycle fired"),
            );
        }
        shutdown(scheduler);

        // Jittered backoff waits at least its 10 ms floor, above the 5 ms interval.
        for pair in fired.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= Duration::from_millis(10), "gap {gap:?} below backoff floor");
        }
        assert!(fired[2].duration_since(fired[0]) < Duration::from_secs(1));
    }

    #[rstest]
    fn dropping_the_sender_stops_the_thread() {
        let scheduler = spawn_scheduler(Duration::from_secs(60), None, || CycleReport::Idle)
            .expect("spawn scheduler");
        let FlushScheduler { tx, handle, state } = scheduler;
        drop(tx);
        handle.join().expect("join scheduler");
        assert_eq!(state.get(), SchedulerState::Stopped);
    }
}
