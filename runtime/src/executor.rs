//! The cancellable executor: one request slot, one generation counter.
//!
//! Every `execute()` mints a new generation and puts the slot into the loading
//! state. The spawned call remembers its generation and, when it settles,
//! commits to the slot's [`RequestState`] only if no newer `execute()`,
//! `cancel()` or disposal happened in the meantime. Stale settlements are
//! dropped without touching state, which keeps out-of-order responses from
//! overwriting fresher ones.
//!
//! # Example
//!
//! ```rust
//! use request_lifecycle_core::{ExecutorOptions, Response, request_fn};
//! use request_lifecycle_runtime::CancellableExecutor;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let executor = CancellableExecutor::lazy(
//!     request_fn(|id: u32| async move { Ok(Response::new(format!("item-{id}"))) }),
//!     ExecutorOptions::default(),
//! );
//!
//! let data = executor.execute(7).await;
//! assert_eq!(data.as_deref(), Some("item-7"));
//! assert!(executor.state().is_success);
//! # }
//! ```

use crate::metrics::{
    CANCELLED_TOTAL, DURATION_SECONDS, EXECUTIONS_TOTAL, FAILED_TOTAL, STALE_DISCARDED_TOTAL,
    SUCCEEDED_TOTAL,
};
use crate::retry::{RetryOutcome, retry_with_delay};
use futures::future::BoxFuture;
use request_lifecycle_core::{
    ExecutorOptions, RequestError, RequestFn, RequestResult, RequestState,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How one `execute()` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T> {
    /// The call succeeded and its data was committed
    Success(T),
    /// The call failed after all retries and its error was committed
    Failed(String),
    /// A newer call, `cancel()` or disposal took the slot first; nothing was
    /// committed
    Superseded,
}

impl<T> Settled<T> {
    /// Committed data, if the call succeeded.
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success(data) => Some(data),
            Self::Failed(_) | Self::Superseded => None,
        }
    }

    /// Nothing was committed for this call.
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }
}

/// Handle to one `execute()` call.
///
/// The call runs whether or not the handle is awaited. Awaiting it yields the
/// committed data (`Some`) or `None` when the call failed or was superseded;
/// [`RequestHandle::settled`] tells those apart.
#[must_use = "the request runs regardless; await the handle to observe its result"]
#[derive(Debug)]
pub struct RequestHandle<T> {
    generation: u64,
    task: JoinHandle<Settled<T>>,
}

impl<T> RequestHandle<T> {
    /// Generation minted for this call.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the call and report exactly how it ended.
    pub async fn settled(self) -> Settled<T> {
        settle(self.task.await)
    }
}

impl<T> Future for RequestHandle<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().task)
            .poll(cx)
            .map(|joined| settle(joined).into_data())
    }
}

fn settle<T>(joined: Result<Settled<T>, tokio::task::JoinError>) -> Settled<T> {
    joined.unwrap_or_else(|error| {
        tracing::warn!(error = %error, "Request task ended without settling");
        Settled::Failed(RequestError::Task(error.to_string()).to_string())
    })
}

/// State update applied inside a call's commit, while its generation is
/// still current. Runs after `succeed`/`fail` under the state lock.
pub(crate) type CommitHook<T> = Box<dyn FnOnce(&mut RequestState<T>) + Send>;

/// Shared half of an executor, owned jointly by the executor and its
/// in-flight calls.
struct ExecutorInner<Args, T> {
    request: RequestFn<Args, T>,
    options: ExecutorOptions<T>,
    generation: AtomicU64,
    state: watch::Sender<RequestState<T>>,
}

impl<Args, T> ExecutorInner<Args, T>
where
    Args: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Invalidate the current generation and mint the next one.
    fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply `f` to the state only while `generation` is still current.
    ///
    /// The check runs under the channel's write lock, so a concurrent
    /// `cancel()` lands either entirely before or entirely after it.
    fn commit_if_current<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&mut RequestState<T>),
    {
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            f(state);
            true
        })
    }

    async fn run(
        self: Arc<Self>,
        generation: u64,
        args: Args,
        first: BoxFuture<'static, RequestResult<T>>,
        on_commit: Option<CommitHook<T>>,
    ) -> Settled<T> {
        let started = Instant::now();
        let request = Arc::clone(&self.request);
        let outcome = retry_with_delay(
            &self.options.retry,
            first,
            move || request(args.clone()),
            || self.is_current(generation),
        )
        .await;

        let settled = match outcome {
            RetryOutcome::Succeeded(response) => {
                self.commit_success(generation, response.data, on_commit)
            }
            RetryOutcome::Exhausted(error) => self.commit_failure(generation, &error, on_commit),
            RetryOutcome::Abandoned => Settled::Superseded,
        };

        if settled.is_superseded() {
            tracing::trace!(generation, "Discarding stale settlement");
            metrics::counter!(STALE_DISCARDED_TOTAL).increment(1);
        } else {
            metrics::histogram!(DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        }
        settled
    }

    fn commit_success(
        &self,
        generation: u64,
        data: T,
        on_commit: Option<CommitHook<T>>,
    ) -> Settled<T> {
        let committed = self.commit_if_current(generation, |state| {
            state.succeed(data.clone());
            if let Some(hook) = on_commit {
                hook(state);
            }
        });
        if !committed {
            return Settled::Superseded;
        }

        tracing::debug!(generation, "Request succeeded");
        metrics::counter!(SUCCEEDED_TOTAL).increment(1);
        if let Some(on_success) = &self.options.on_success {
            on_success(&data);
        }
        Settled::Success(data)
    }

    fn commit_failure(
        &self,
        generation: u64,
        error: &RequestError,
        on_commit: Option<CommitHook<T>>,
    ) -> Settled<T> {
        let message = error.message_or(self.options.fallback_error);
        let committed = self.commit_if_current(generation, |state| {
            state.fail(message.clone());
            if let Some(hook) = on_commit {
                hook(state);
            }
        });
        if !committed {
            return Settled::Superseded;
        }

        tracing::debug!(generation, error = %message, "Request failed");
        metrics::counter!(FAILED_TOTAL).increment(1);
        if let Some(on_error) = &self.options.on_error {
            on_error(&message);
        }
        Settled::Failed(message)
    }

    fn data(&self) -> Option<T> {
        self.state.borrow().data.clone()
    }
}

/// Runs one async operation at a time for a single request slot.
///
/// Dropping the executor disposes it: the current generation is invalidated
/// so nothing in flight can commit afterwards.
pub struct CancellableExecutor<Args, T> {
    inner: Arc<ExecutorInner<Args, T>>,
}

impl<Args, T> CancellableExecutor<Args, T>
where
    Args: Clone + Default + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create an executor, running it once with `Args::default()` when
    /// `options.immediate` is set.
    ///
    /// # Panics
    ///
    /// Panics if `options.immediate` is set and no tokio runtime is running.
    #[must_use]
    pub fn new(request: RequestFn<Args, T>, options: ExecutorOptions<T>) -> Self {
        let immediate = options.immediate;
        let executor = Self::lazy(request, options);
        if immediate {
            tracing::debug!("Running immediate execution");
            drop(executor.execute(Args::default()));
        }
        executor
    }
}

impl<Args, T> CancellableExecutor<Args, T>
where
    Args: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create an executor that only runs when `execute()` is called.
    ///
    /// `options.immediate` is ignored.
    #[must_use]
    pub fn lazy(request: RequestFn<Args, T>, options: ExecutorOptions<T>) -> Self {
        let (state, _) = watch::channel(RequestState::idle());
        Self {
            inner: Arc::new(ExecutorInner {
                request,
                options,
                generation: AtomicU64::new(0),
                state,
            }),
        }
    }

    /// Start a call, superseding any call still in flight.
    ///
    /// The loading state is set and the first attempt is started before this
    /// returns.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[tracing::instrument(skip(self, args), name = "executor_execute")]
    pub fn execute(&self, args: Args) -> RequestHandle<T> {
        let generation = self.begin();
        self.launch(generation, args, None)
    }

    /// Supersede the call in flight and enter the loading state.
    ///
    /// Once this returns, no older call can commit, so derived state may be
    /// cleared before [`Self::launch`] starts the new call.
    pub(crate) fn begin(&self) -> u64 {
        let generation = self.inner.advance();
        self.inner.state.send_modify(RequestState::begin);
        tracing::debug!(generation, "Executing request");
        metrics::counter!(EXECUTIONS_TOTAL).increment(1);
        generation
    }

    /// Start the call for a generation minted by [`Self::begin`].
    pub(crate) fn launch(
        &self,
        generation: u64,
        args: Args,
        on_commit: Option<CommitHook<T>>,
    ) -> RequestHandle<T> {
        let first = (self.inner.request)(args.clone());
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(inner.run(generation, args, first, on_commit));

        RequestHandle { generation, task }
    }

    /// Return to the idle state. A call in flight is not cancelled and may
    /// still commit.
    pub fn reset(&self) {
        tracing::debug!("Resetting request state");
        self.inner.state.send_replace(RequestState::idle());
    }

    /// Invalidate the call in flight and clear `is_loading` immediately.
    ///
    /// `data` and `error` are left as they are.
    pub fn cancel(&self) {
        let generation = self.inner.advance();
        self.inner.state.send_if_modified(|state| {
            let was_loading = state.is_loading;
            state.is_loading = false;
            was_loading
        });
        tracing::debug!(generation, "Request cancelled");
        metrics::counter!(CANCELLED_TOTAL).increment(1);
    }

    /// Tear down: equivalent to [`Self::cancel`].
    pub fn dispose(&self) {
        self.cancel();
    }

    /// Snapshot of the request state.
    #[must_use]
    pub fn state(&self) -> RequestState<T> {
        self.inner.state.borrow().clone()
    }

    /// Observe every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.inner.state.subscribe()
    }

    /// A call owned by the current generation is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    /// Data from the last committed success.
    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.inner.data()
    }

    /// Last committed error message.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    /// Current generation. Increases on every `execute()` and `cancel()`.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }
}

impl<Args, T> Drop for CancellableExecutor<Args, T> {
    fn drop(&mut self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.state.send_if_modified(|state| {
            let was_loading = state.is_loading;
            state.is_loading = false;
            was_loading
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use request_lifecycle_core::{Response, request_fn};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    /// Resolves `args.1` after `args.0` milliseconds.
    fn delayed_echo() -> RequestFn<(u64, &'static str), &'static str> {
        request_fn(|(delay, value): (u64, &'static str)| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(Response::new(value))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn execute_sets_loading_synchronously() {
        let executor = CancellableExecutor::lazy(delayed_echo(), ExecutorOptions::default());
        assert!(executor.state().is_idle());

        let handle = executor.execute((10, "a"));
        let state = executor.state();
        assert!(state.is_loading);
        assert!(!state.is_success && !state.is_error);

        assert_eq!(handle.await, Some("a"));
        assert_eq!(executor.state().data, Some("a"));
        assert!(executor.state().is_success);
    }

    #[tokio::test(start_paused = true)]
    async fn later_call_wins_even_when_earlier_resolves_last() {
        let executor = CancellableExecutor::lazy(delayed_echo(), ExecutorOptions::default());

        let slow = executor.execute((200, "slow"));
        let fast = executor.execute((50, "fast"));

        assert_eq!(fast.await, Some("fast"));
        assert_eq!(slow.settled().await, Settled::Superseded);

        let state = executor.state();
        assert_eq!(state.data, Some("fast"));
        assert!(state.is_success);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_loading_and_blocks_commit() {
        let executor = CancellableExecutor::lazy(delayed_echo(), ExecutorOptions::default());
        let handle = executor.execute((100, "late"));

        executor.cancel();
        assert!(!executor.is_loading());

        assert_eq!(handle.settled().await, Settled::Superseded);
        let state = executor.state();
        assert_eq!(state.data, None);
        assert!(state.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_previous_data() {
        let executor = CancellableExecutor::lazy(delayed_echo(), ExecutorOptions::default());
        executor.execute((10, "first")).await;

        let _pending = executor.execute((10, "second"));
        executor.cancel();

        tokio::time::sleep(ms(50)).await;
        assert_eq!(executor.data(), Some("first"));
        assert!(!executor.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_normalizes_message() {
        let executor = CancellableExecutor::lazy(
            request_fn(|kind: u8| async move {
                match kind {
                    0 => Err::<Response<()>, _>(RequestError::failed("Network down")),
                    _ => Err(RequestError::NonError),
                }
            }),
            ExecutorOptions::default(),
        );

        assert_eq!(executor.execute(0).settled().await, Settled::Failed("Network down".into()));
        assert_eq!(executor.error().as_deref(), Some("Network down"));

        executor.execute(1).await;
        let state = executor.state();
        assert_eq!(state.error.as_deref(), Some("Unknown error"));
        assert!(state.is_error && !state.is_success && !state.is_loading);
        assert_eq!(state.data, None);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exactly_n_plus_one_times() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let executor = CancellableExecutor::lazy(
            request_fn(move |(): ()| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<Response<()>, _>(RequestError::failed("nope")) }
            }),
            ExecutorOptions::default().with_retry(3).with_retry_delay(ms(100)),
        );

        let handle = executor.execute(());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(ms(101)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(executor.is_loading(), "still loading between attempts");

        handle.await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(executor.error().as_deref(), Some("nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn every_execute_gets_the_full_retry_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        // Fails on odd calls, succeeds on even ones.
        let executor = CancellableExecutor::lazy(
            request_fn(move |(): ()| {
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if call % 2 == 1 {
                        return Err(RequestError::failed("flaky"));
                    }
                    Ok(Response::new(call))
                }
            }),
            ExecutorOptions::default().with_retry(1).with_retry_delay(ms(10)),
        );

        assert_eq!(executor.execute(()).await, Some(2));
        assert_eq!(executor.execute(()).await, Some(4));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_retry_delay_stops_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let executor = CancellableExecutor::lazy(
            request_fn(move |(): ()| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<Response<()>, _>(RequestError::NonError) }
            }),
            ExecutorOptions::default().with_retry(5).with_retry_delay(ms(100)),
        );

        let handle = executor.execute(());
        tokio::time::sleep(ms(50)).await;
        executor.cancel();

        assert_eq!(handle.settled().await, Settled::Superseded);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!executor.state().is_error);
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_fire_only_for_committed_results() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let successes = Arc::clone(&seen);
        let executor = CancellableExecutor::lazy(
            delayed_echo(),
            ExecutorOptions::default().on_success(move |data: &&'static str| {
                successes.lock().unwrap().push(*data);
            }),
        );

        let _stale = executor.execute((100, "stale"));
        executor.execute((10, "fresh")).await;
        tokio::time::sleep(ms(200)).await;

        assert_eq!(*seen.lock().unwrap(), vec!["fresh"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_does_not_cancel() {
        let executor = CancellableExecutor::lazy(delayed_echo(), ExecutorOptions::default());
        let handle = executor.execute((10, "kept"));
        executor.reset();
        assert!(executor.state().is_idle());

        assert_eq!(handle.await, Some("kept"));
        assert!(executor.state().is_success);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_runs_once_with_default_args() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let executor = CancellableExecutor::new(
            request_fn(move |n: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Response::new(n)) }
            }),
            ExecutorOptions::default().immediate(true),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(executor.is_loading());
        tokio::time::sleep(ms(1)).await;
        assert_eq!(executor.data(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_disposes_in_flight_call() {
        let executor = CancellableExecutor::lazy(delayed_echo(), ExecutorOptions::default());
        let mut updates = executor.subscribe();
        let handle = executor.execute((100, "orphan"));
        drop(executor);

        assert_eq!(handle.settled().await, Settled::Superseded);
        assert!(!updates.borrow_and_update().is_loading);
    }
}
