//! Flush-completion subscribers.
//!
//! Each producer owns its own list; completion carries no payload, only the
//! fact that a cycle finished.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::warn;
use parking_lot::Mutex;

type Observer = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct FlushObservers {
    callbacks: Mutex<Vec<Observer>>,
    channels: Mutex<Vec<Sender<()>>>,
}

impl FlushObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.callbacks.lock().push(Arc::new(observer));
    }

    /// Subscribe through a channel. Unread tokens coalesce into one.
    pub fn subscribe(&self) -> Receiver<()> {
        let (tx, rx) = bounded(1);
        self.channels.lock().push(tx);
        rx
    }

    /// Signal one completed cycle to every subscriber.
    pub fn notify(&self) {
        // Snapshot so observers may register further observers.
        let callbacks: Vec<Observer> = self.callbacks.lock().clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                warn!("ScribeProducer: flush observer panicked");
            }
        }
        self.channels
            .lock()
            .retain(|tx| !matches!(tx.try_send(()), Err(TrySendError::Disconnected(()))));
    }

    #[cfg_attr(not(test), expect(dead_code, reason = "inspected by tests only"))]
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }
}
