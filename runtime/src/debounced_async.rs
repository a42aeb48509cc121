//! Debounce in front of an arbitrary cancellable call.

use crate::debounce::Debouncer;
use crate::executor::CancellableExecutor;
use request_lifecycle_core::{ExecutorOptions, OPERATION_FAILED, RequestFn, RequestState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Runs the injected function once calls have been quiet for the delay.
///
/// Rejections without a message are reported as `"Operation failed"`.
/// Dropping the controller behaves as [`Self::cancel`].
///
/// # Example
///
/// ```rust
/// use request_lifecycle_core::{Response, request_fn};
/// use request_lifecycle_runtime::DebouncedAsyncController;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() {
/// let autosave = DebouncedAsyncController::new(
///     request_fn(|draft: String| async move { Ok(Response::new(draft.len())) }),
///     Duration::from_millis(500),
/// );
///
/// autosave.execute("Dear gu".to_string());
/// autosave.execute("Dear guest".to_string());
///
/// tokio::time::sleep(Duration::from_millis(510)).await;
/// assert_eq!(autosave.data(), Some(10));
/// # }
/// ```
pub struct DebouncedAsyncController<Args, T> {
    executor: Arc<CancellableExecutor<Args, T>>,
    debouncer: Debouncer,
}

impl<Args, T> DebouncedAsyncController<Args, T>
where
    Args: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Debounce calls to `request` by `delay`.
    #[must_use]
    pub fn new(request: RequestFn<Args, T>, delay: Duration) -> Self {
        Self::with_options(request, delay, ExecutorOptions::default())
    }

    /// Like [`Self::new`] with callbacks and retry. `options.immediate` is
    /// ignored and the fallback message is always `"Operation failed"`.
    #[must_use]
    pub fn with_options(
        request: RequestFn<Args, T>,
        delay: Duration,
        options: ExecutorOptions<T>,
    ) -> Self {
        let options = options.immediate(false).with_fallback_error(OPERATION_FAILED);
        Self {
            executor: Arc::new(CancellableExecutor::lazy(request, options)),
            debouncer: Debouncer::new(delay),
        }
    }

    /// Schedule a call with `args`, replacing one that has not started yet.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn execute(&self, args: Args) {
        let executor = Arc::downgrade(&self.executor);
        self.debouncer.schedule(move || {
            if let Some(executor) = executor.upgrade() {
                drop(executor.execute(args));
            }
        });
    }

    /// Drop the scheduled call and invalidate the one in flight.
    pub fn cancel(&self) {
        self.debouncer.cancel();
        self.executor.cancel();
    }

    /// Tear down: equivalent to [`Self::cancel`].
    pub fn dispose(&self) {
        self.cancel();
    }

    /// Committed data.
    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.executor.data()
    }

    /// A call is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.executor.is_loading()
    }

    /// A call is waiting for the quiet period to end.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Error of the last failed call.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.executor.error()
    }

    /// Snapshot of the request state.
    #[must_use]
    pub fn state(&self) -> RequestState<T> {
        self.executor.state()
    }

    /// Observe the request state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.executor.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use request_lifecycle_core::{RequestError, Response, request_fn};
    use std::sync::Mutex;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn recording(latency: Duration) -> (Arc<Mutex<Vec<u32>>>, RequestFn<u32, u32>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&calls);
        let request = request_fn(move |n: u32| {
            log.lock().unwrap().push(n);
            async move {
                tokio::time::sleep(latency).await;
                Ok(Response::new(n * 10))
            }
        });
        (calls, request)
    }

    #[tokio::test(start_paused = true)]
    async fn second_execute_supersedes_scheduled_call() {
        let (calls, request) = recording(ms(10));
        let controller = DebouncedAsyncController::new(request, ms(200));

        controller.execute(1);
        tokio::time::sleep(ms(150)).await;
        controller.execute(2);
        assert!(controller.is_pending());

        tokio::time::sleep(ms(201)).await;
        assert_eq!(*calls.lock().unwrap(), vec![2]);
        assert!(controller.is_loading());

        tokio::time::sleep(ms(20)).await;
        assert_eq!(controller.data(), Some(20));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_timer_and_in_flight_call() {
        let (calls, request) = recording(ms(100));
        let controller = DebouncedAsyncController::new(request, ms(50));

        controller.execute(1);
        tokio::time::sleep(ms(60)).await;
        assert!(controller.is_loading());
        controller.execute(2);

        controller.cancel();
        assert!(!controller.is_loading());
        assert!(!controller.is_pending());

        tokio::time::sleep(ms(300)).await;
        assert_eq!(*calls.lock().unwrap(), vec![1]);
        assert_eq!(controller.data(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn messageless_rejection_reads_operation_failed() {
        let controller = DebouncedAsyncController::new(
            request_fn(|(): ()| async { Err::<Response<()>, _>(RequestError::NonError) }),
            ms(10),
        );
        controller.execute(());
        tokio::time::sleep(ms(20)).await;

        let state = controller.state();
        assert!(state.is_error);
        assert_eq!(state.error.as_deref(), Some("Operation failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_scheduled_call() {
        let (calls, request) = recording(ms(10));
        {
            let controller = DebouncedAsyncController::new(request, ms(100));
            controller.execute(7);
        }
        tokio::time::sleep(ms(300)).await;
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_invalidates_call_in_flight() {
        let (calls, request) = recording(ms(100));
        let controller = DebouncedAsyncController::new(request, ms(10));
        controller.execute(3);
        tokio::time::sleep(ms(20)).await;
        assert!(controller.is_loading());

        let updates = controller.subscribe();
        drop(controller);
        assert!(!updates.borrow().is_loading);

        tokio::time::sleep(ms(200)).await;
        assert_eq!(*calls.lock().unwrap(), vec![3]);
        assert_eq!(updates.borrow().data, None);
    }
}
