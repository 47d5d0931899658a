//! Single-slot "data ready" signal between the acquisition callback and the
//! pipeline worker.
//!
//! Notifications coalesce: any number of `notify()` calls before the worker
//! wakes collapse into one wake-up. The worker always re-checks the driver
//! after waking (or timing out), so a missed or merged signal costs at most
//! one timeout period.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct WakeSignal {
    ready: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark data as ready. Never blocks for longer than the flag store and
    /// never fails.
    pub fn notify(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        self.cond.notify_one();
    }

    /// Wait until notified or `timeout` elapses, consuming the pending
    /// notification. Returns `true` if a notification was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.lock();
        if !*ready {
            let _ = self.cond.wait_for(&mut ready, timeout);
        }
        std::mem::replace(&mut *ready, false)
    }

    /// Whether a notification is pending.
    pub fn is_pending(&self) -> bool {
        *self.ready.lock()
    }
}
