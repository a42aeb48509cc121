//! Mutations: writes that only run when asked to.
//!
//! [`MutationController`] is a [`CancellableExecutor`] that never runs on its
//! own. [`OptimisticMutationController`] adds a locally computed value that is
//! shown while the write is pending and thrown away once it settles: success
//! shows the confirmed data, failure restores whatever was committed before the
//! mutation started. Both happen inside the commit, so subscribers never see
//! a failed state without its rollback.

use crate::executor::{CancellableExecutor, CommitHook, RequestHandle, Settled};
use request_lifecycle_core::{ExecutorOptions, RequestError, RequestFn, RequestState};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A manually triggered write.
pub struct MutationController<Args, T> {
    executor: CancellableExecutor<Args, T>,
}

impl<Args, T> MutationController<Args, T>
where
    Args: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Wrap `request`. `options.immediate` is ignored.
    #[must_use]
    pub fn new(request: RequestFn<Args, T>, options: ExecutorOptions<T>) -> Self {
        Self {
            executor: CancellableExecutor::lazy(request, options.immediate(false)),
        }
    }

    /// Run the write, superseding one still in flight.
    pub fn mutate(&self, args: Args) -> RequestHandle<T> {
        self.executor.execute(args)
    }

    /// Return to the idle state without cancelling.
    pub fn reset(&self) {
        self.executor.reset();
    }

    /// Invalidate the write in flight.
    pub fn cancel(&self) {
        self.executor.cancel();
    }

    /// Tear down: equivalent to [`Self::cancel`].
    pub fn dispose(&self) {
        self.executor.dispose();
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

    /// Committed data.
    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.executor.data()
    }

    /// A write is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.executor.is_loading()
    }

    /// Error of the last failed write.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.executor.error()
    }

    /// Run the write with an extra update applied inside its commit.
    fn mutate_with(&self, args: Args, on_commit: CommitHook<T>) -> RequestHandle<T> {
        let generation = self.executor.begin();
        self.executor.launch(generation, args, Some(on_commit))
    }
}

/// Locally predicted value shown while a mutation is pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticSnapshot<T> {
    /// Predicted value, `None` when no mutation is pending
    pub value: Option<T>,
    /// Increases with every `mutate()`; only the latest one may clear `value`
    pub epoch: u64,
}

impl<T> OptimisticSnapshot<T> {
    const fn empty() -> Self {
        Self {
            value: None,
            epoch: 0,
        }
    }

    /// A predicted value is being shown.
    #[must_use]
    pub const fn is_optimistic(&self) -> bool {
        self.value.is_some()
    }
}

/// Handle to one optimistic `mutate()` call.
///
/// Resolves to `Ok(Some(data))` on success, `Err` once a failure has been
/// rolled back, and `Ok(None)` if a newer call or `cancel()` superseded it.
/// Rollback happens whether or not the handle is awaited.
#[must_use = "the mutation runs regardless; await the handle to observe its result"]
#[derive(Debug)]
pub struct MutationHandle<T> {
    task: JoinHandle<Result<Option<T>, RequestError>>,
}

impl<T> Future for MutationHandle<T> {
    type Output = Result<Option<T>, RequestError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().task)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|error| Err(RequestError::Task(error.to_string()))))
    }
}

type ApplyOptimistic<Args, T> = Arc<dyn Fn(Option<&T>, &Args) -> T + Send + Sync>;

/// A mutation that shows a predicted value until the server answers.
///
/// # Example
///
/// ```rust
/// use request_lifecycle_core::{ExecutorOptions, Response, request_fn};
/// use request_lifecycle_runtime::OptimisticMutationController;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let rename = OptimisticMutationController::new(
///     request_fn(|name: String| async move { Ok(Response::new(name.to_uppercase())) }),
///     |_current: Option<&String>, name: &String| name.clone(),
///     ExecutorOptions::default(),
/// );
///
/// let handle = rename.mutate("suite".to_string());
/// assert_eq!(rename.data().as_deref(), Some("suite"));
/// assert!(rename.is_optimistic());
///
/// assert_eq!(handle.await.ok().flatten().as_deref(), Some("SUITE"));
/// assert!(!rename.is_optimistic());
/// # }
/// ```
pub struct OptimisticMutationController<Args, T> {
    mutation: MutationController<Args, T>,
    apply_optimistic: ApplyOptimistic<Args, T>,
    snapshot: Arc<watch::Sender<OptimisticSnapshot<T>>>,
}

impl<Args, T> OptimisticMutationController<Args, T>
where
    Args: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Wrap `request` with a prediction function.
    ///
    /// `apply_optimistic` receives the committed data and the mutation
    /// arguments and returns the value to show while the mutation runs.
    #[must_use]
    pub fn new<F>(request: RequestFn<Args, T>, apply_optimistic: F, options: ExecutorOptions<T>) -> Self
    where
        F: Fn(Option<&T>, &Args) -> T + Send + Sync + 'static,
    {
        let (snapshot, _) = watch::channel(OptimisticSnapshot::empty());
        Self {
            mutation: MutationController::new(request, options),
            apply_optimistic: Arc::new(apply_optimistic),
            snapshot: Arc::new(snapshot),
        }
    }

    /// Show the predicted value, then run the mutation.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn mutate(&self, args: Args) -> MutationHandle<T> {
        let committed = self.mutation.data();
        let predicted = (self.apply_optimistic)(committed.as_ref(), &args);

        let mut epoch = 0;
        self.snapshot.send_modify(|snapshot| {
            snapshot.epoch += 1;
            snapshot.value = Some(predicted);
            epoch = snapshot.epoch;
        });
        tracing::debug!(epoch, "Optimistic value applied");

        let snapshot = Arc::clone(&self.snapshot);
        let settle: CommitHook<T> = Box::new(move |state| {
            if state.is_error {
                state.data = committed;
                tracing::debug!(epoch, "Rolled back optimistic value");
            }
            clear_snapshot(&snapshot, epoch);
        });
        let handle = self.mutation.mutate_with(args, settle);

        let task = tokio::spawn(async move {
            match handle.settled().await {
                Settled::Success(data) => Ok(Some(data)),
                Settled::Failed(message) => Err(RequestError::Failed(message)),
                Settled::Superseded => Ok(None),
            }
        });

        MutationHandle { task }
    }

    /// Value to display: the prediction while pending, else committed data.
    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.snapshot
            .borrow()
            .value
            .clone()
            .or_else(|| self.mutation.data())
    }

    /// A predicted value is being shown.
    #[must_use]
    pub fn is_optimistic(&self) -> bool {
        self.snapshot.borrow().is_optimistic()
    }

    /// Request state with `data` replaced by the prediction while pending.
    #[must_use]
    pub fn state(&self) -> RequestState<T> {
        let mut state = self.mutation.state();
        if let Some(predicted) = self.snapshot.borrow().value.clone() {
            state.data = Some(predicted);
        }
        state
    }

    /// Observe the committed request state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.mutation.subscribe()
    }

    /// Observe the optimistic snapshot.
    #[must_use]
    pub fn subscribe_snapshot(&self) -> watch::Receiver<OptimisticSnapshot<T>> {
        self.snapshot.subscribe()
    }

    /// A mutation is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.mutation.is_loading()
    }

    /// Error of the last failed mutation.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.mutation.error()
    }

    /// Drop the prediction and return to the idle state.
    pub fn reset(&self) {
        self.discard_snapshot();
        self.mutation.reset();
    }

    /// Invalidate the mutation in flight and drop its prediction.
    pub fn cancel(&self) {
        self.mutation.cancel();
        self.discard_snapshot();
    }

    /// Tear down: equivalent to [`Self::cancel`].
    pub fn dispose(&self) {
        self.cancel();
    }

    fn discard_snapshot(&self) {
        self.snapshot.send_if_modified(|snapshot| snapshot.value.take().is_some());
    }
}

/// Clear the prediction if no newer `mutate()` replaced it.
fn clear_snapshot<T>(snapshot: &watch::Sender<OptimisticSnapshot<T>>, epoch: u64) {
    snapshot.send_if_modified(|current| current.epoch == epoch && current.value.take().is_some());
}
