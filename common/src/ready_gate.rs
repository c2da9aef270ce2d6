use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A single-permit gate for latest-wins producer handoff.
///
/// A producer calls [`ReadyGate::try_acquire`] for every item; while a
/// permit is outstanding the gate is closed and the item should be dropped
/// rather than queued. Dropping the permit reopens the gate.
#[derive(Debug, Clone)]
pub struct ReadyGate {
    busy: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

/// Held while an item is in flight; reopens the gate on drop.
#[derive(Debug)]
pub struct ReadyPermit {
    busy: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyGate {
    pub fn new() -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.busy.load(Ordering::Acquire)
    }

    /// Closes the gate and returns a permit, or `None` if it is already closed.
    pub fn try_acquire(&self) -> Option<ReadyPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReadyPermit {
                busy: Arc::clone(&self.busy),
                notify: Arc::clone(&self.notify),
            })
    }

    /// Waits until the gate is open. Does not acquire it.
    pub async fn wait_ready(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for ReadyPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }
}
