//! Debouncing: collapse bursts of updates into one trailing event.
//!
//! - [`Debouncer`]: the primitive. Holds at most one live timer; scheduling a
//!   new callback cancels the previous one.
//! - [`DebouncedValue`]: a value that only settles after a quiet period.
//! - [`DebouncedCallback`]: a function whose calls collapse into one trailing
//!   invocation with the last arguments.
//! - [`DebouncedState`]: an immediate value paired with its debounced copy.
//!
//! All of them must be used from within a tokio runtime.

use crate::lock;
use crate::metrics::{DEBOUNCE_FIRED_TOTAL, DEBOUNCE_SUPERSEDED_TOTAL};
use crate::timer::{Timer, TimerHandle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Single-slot delayed scheduler.
///
/// # Example
///
/// ```rust
/// use request_lifecycle_runtime::debounce::Debouncer;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let debouncer = Debouncer::new(Duration::from_millis(300));
/// debouncer.schedule(|| println!("first"));
/// debouncer.schedule(|| println!("second")); // "first" never runs
/// assert!(debouncer.is_pending());
/// # }
/// ```
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    timer: Timer,
    pending: Mutex<Option<TimerHandle>>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timer: Timer::new(),
            pending: Mutex::new(None),
        }
    }

    /// Quiet period.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `f`, replacing any callback that has not fired yet.
    pub fn schedule<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            if self.timer.cancel(previous) {
                metrics::counter!(DEBOUNCE_SUPERSEDED_TOTAL).increment(1);
            }
        }
        *pending = Some(self.timer.schedule(self.delay, move || {
            metrics::counter!(DEBOUNCE_FIRED_TOTAL).increment(1);
            f();
        }));
    }

    /// Drop the pending callback, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        lock(&self.pending)
            .take()
            .is_some_and(|handle| self.timer.cancel(handle))
    }

    /// A callback is scheduled and has not fired.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.timer.pending() > 0
    }
}

/// A value that only updates after `delay` passes without a new `set`.
///
/// # Example
///
/// ```rust
/// use request_lifecycle_runtime::debounce::DebouncedValue;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() {
/// let query = DebouncedValue::new(String::new(), Duration::from_millis(500));
/// query.set("ru".to_string());
/// query.set("rust".to_string());
/// assert_eq!(query.get(), "");
///
/// tokio::time::sleep(Duration::from_millis(501)).await;
/// assert_eq!(query.get(), "rust");
/// # }
/// ```
#[derive(Debug)]
pub struct DebouncedValue<T> {
    settled: Arc<watch::Sender<T>>,
    debouncer: Debouncer,
}

impl<T> DebouncedValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start settled at `initial`.
    #[must_use]
    pub fn new(initial: T, delay: Duration) -> Self {
        let (settled, _) = watch::channel(initial);
        Self {
            settled: Arc::new(settled),
            debouncer: Debouncer::new(delay),
        }
    }

    /// Offer a new value; it settles once the quiet period elapses.
    pub fn set(&self, value: T) {
        let settled = Arc::clone(&self.settled);
        self.debouncer.schedule(move || {
            settled.send_replace(value);
        });
    }

    /// Most recently settled value.
    #[must_use]
    pub fn get(&self) -> T {
        self.settled.borrow().clone()
    }

    /// Observe settled values.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.settled.subscribe()
    }

    /// A value is waiting to settle.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Discard the value waiting to settle.
    pub fn cancel(&self) -> bool {
        self.debouncer.cancel()
    }
}

type Callback<Args> = Arc<dyn Fn(Args) + Send + Sync>;

/// A function whose bursts of calls collapse into one trailing call.
///
/// Dropping it behaves like [`DebouncedCallback::cancel`].
pub struct DebouncedCallback<Args> {
    callback: Callback<Args>,
    pending_args: Arc<Mutex<Option<Args>>>,
    debouncer: Debouncer,
}

impl<Args> DebouncedCallback<Args>
where
    Args: Send + 'static,
{
    /// Wrap `callback` with a quiet period of `delay`.
    pub fn new<F>(callback: F, delay: Duration) -> Self
    where
        F: Fn(Args) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            pending_args: Arc::new(Mutex::new(None)),
            debouncer: Debouncer::new(delay),
        }
    }

    /// Record a call; only the last one inside the quiet period runs.
    pub fn call(&self, args: Args) {
        *lock(&self.pending_args) = Some(args);

        let callback = Arc::clone(&self.callback);
        let pending_args = Arc::clone(&self.pending_args);
        self.debouncer.schedule(move || {
            let args = lock(&pending_args).take();
            if let Some(args) = args {
                callback(args);
            }
        });
    }

    /// Suppress the pending invocation entirely.
    pub fn cancel(&self) {
        self.debouncer.cancel();
        lock(&self.pending_args).take();
    }

    /// Run the pending invocation now instead of waiting.
    ///
    /// Returns `false` when nothing was pending.
    pub fn flush(&self) -> bool {
        self.debouncer.cancel();
        let args = lock(&self.pending_args).take();
        match args {
            Some(args) => {
                (self.callback)(args);
                true
            }
            None => false,
        }
    }

    /// An invocation is waiting for the quiet period to end.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }
}

impl<Args> Drop for DebouncedCallback<Args> {
    fn drop(&mut self) {
        self.debouncer.cancel();
    }
}

/// Snapshot of a [`DebouncedState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebouncedSnapshot<T> {
    /// Latest value passed to `set_value`
    pub value: T,
    /// Latest settled value
    pub debounced_value: T,
    /// `value != debounced_value`
    pub is_debouncing: bool,
}

/// An immediate value and its debounced copy, side by side.
#[derive(Debug)]
pub struct DebouncedState<T> {
    value: watch::Sender<T>,
    debounced: DebouncedValue<T>,
}

impl<T> DebouncedState<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Both copies start at `initial`.
    #[must_use]
    pub fn new(initial: T, delay: Duration) -> Self {
        let (value, _) = watch::channel(initial.clone());
        Self {
            value,
            debounced: DebouncedValue::new(initial, delay),
        }
    }

    /// Update the immediate value and restart the quiet period.
    pub fn set_value(&self, value: T) {
        self.value.send_replace(value.clone());
        self.debounced.set(value);
    }

    /// Immediate value.
    #[must_use]
    pub fn value(&self) -> T {
        self.value.borrow().clone()
    }

    /// Settled value.
    #[must_use]
    pub fn debounced_value(&self) -> T {
        self.debounced.get()
    }

    /// The immediate value has not settled yet.
    #[must_use]
    pub fn is_debouncing(&self) -> bool {
        *self.value.borrow() != *self.debounced.settled.borrow()
    }

    /// Both values and the debouncing flag at once.
    #[must_use]
    pub fn snapshot(&self) -> DebouncedSnapshot<T> {
        let value = self.value();
        let debounced_value = self.debounced_value();
        let is_debouncing = value != debounced_value;
        DebouncedSnapshot {
            value,
            debounced_value,
            is_debouncing,
        }
    }

    /// Observe immediate values.
    #[must_use]
    pub fn subscribe_value(&self) -> watch::Receiver<T> {
        self.value.subscribe()
    }

    /// Observe settled values.
    #[must_use]
    pub fn subscribe_debounced(&self) -> watch::Receiver<T> {
        self.debounced.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test(start_paused = true)]
    async fn second_change_restarts_the_quiet_period() {
        let value = DebouncedValue::new("initial", ms(500));
        let mut seen = value.subscribe();

        value.set("first");
        tokio::time::sleep(ms(300)).await;
        value.set("second");

        tokio::time::sleep(ms(499)).await;
        assert_eq!(value.get(), "initial");

        tokio::time::sleep(ms(2)).await;
        assert_eq!(value.get(), "second");

        // Only one settlement was published and it was never "first".
        assert!(seen.has_changed().unwrap());
        assert_eq!(*seen.borrow_and_update(), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_settles_on_next_tick() {
        let value = DebouncedValue::new(0, Duration::ZERO);
        value.set(5);
        assert_eq!(value.get(), 0);
        tokio::task::yield_now().await;
        tokio::time::sleep(ms(1)).await;
        assert_eq!(value.get(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_uses_last_arguments() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let debounced = DebouncedCallback::new(move |n: u32| lock(&sink).push(n), ms(200));

        debounced.call(1);
        debounced.call(2);
        tokio::time::sleep(ms(100)).await;
        debounced.call(3);
        assert!(debounced.is_pending());

        tokio::time::sleep(ms(201)).await;
        assert_eq!(*lock(&calls), vec![3]);
        assert!(!debounced.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_pending_call() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let debounced = DebouncedCallback::new(
            move |(): ()| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            ms(100),
        );

        debounced.call(());
        debounced.cancel();
        tokio::time::sleep(ms(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_behaves_as_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&count);
            let debounced = DebouncedCallback::new(
                move |(): ()| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                ms(100),
            );
            debounced.call(());
        }
        tokio::time::sleep(ms(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_runs_pending_call_immediately() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let debounced = DebouncedCallback::new(move |s: &'static str| lock(&sink).push(s), ms(100));

        assert!(!debounced.flush());
        debounced.call("save");
        assert!(debounced.flush());
        assert_eq!(*lock(&calls), vec!["save"]);

        tokio::time::sleep(ms(500)).await;
        assert_eq!(lock(&calls).len(), 1, "flushed call does not fire again");
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_state_reports_debouncing() {
        let state = DebouncedState::new(String::new(), ms(300));
        assert!(!state.is_debouncing());

        state.set_value("abc".to_string());
        let snapshot = state.snapshot();
        assert_eq!(snapshot.value, "abc");
        assert_eq!(snapshot.debounced_value, "");
        assert!(snapshot.is_debouncing);

        tokio::time::sleep(ms(301)).await;
        assert!(!state.is_debouncing());
        assert_eq!(state.debounced_value(), "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn setting_back_to_settled_value_stops_debouncing() {
        let state = DebouncedState::new(1, ms(300));
        state.set_value(2);
        assert!(state.is_debouncing());
        state.set_value(1);
        assert!(!state.is_debouncing());
    }
}
