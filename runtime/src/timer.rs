//! Explicit timer resource.
//!
//! Every delayed callback in this crate goes through a [`Timer`] so that the
//! owning controller can cancel whatever it scheduled. A handle that has been
//! cancelled never fires, even if its sleep already elapsed.

use crate::lock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;

/// Identifies one scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Schedules callbacks on the tokio timer and tracks the ones still pending.
///
/// Dropping the timer cancels everything it scheduled.
#[derive(Debug, Default)]
pub struct Timer {
    next_id: AtomicU64,
    live: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl Timer {
    /// Create a timer with nothing scheduled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` once `delay` has elapsed.
    ///
    /// A zero delay still defers `f` to a later scheduler tick.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let live = Arc::clone(&self.live);

        // Registration happens under the lock so the task cannot look itself
        // up before its entry exists.
        let mut registry = lock(&self.live);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_scheduled = lock(&live).remove(&id).is_some();
            if still_scheduled {
                f();
            }
        });
        registry.insert(id, task.abort_handle());
        drop(registry);

        tracing::trace!(timer = id, delay_ms = delay.as_millis(), "Timer scheduled");
        TimerHandle(id)
    }

    /// Cancel a scheduled callback.
    ///
    /// Returns `false` if the handle already fired or was cancelled.
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        let removed = lock(&self.live).remove(&handle.0);
        match removed {
            Some(task) => {
                task.abort();
                tracing::trace!(timer = handle.0, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending callback.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = lock(&self.live).drain().collect();
        for (_, task) in drained {
            task.abort();
        }
    }

    /// Number of callbacks that have neither fired nor been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.live).len()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
