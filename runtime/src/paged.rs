//! Offset/limit pagination on top of a [`CancellableExecutor`].
//!
//! The request function receives `(page, limit, args)` and answers with a
//! [`PageResponse`]. Committed pages are folded into a [`PageState`]: page 1
//! replaces the list, later pages append. The page that was *requested*
//! decides which, whatever the response envelope echoes back. The fold runs
//! inside the executor's commit, so a superseded page never reaches the
//! accumulated list.

use crate::executor::{CancellableExecutor, CommitHook, RequestHandle};
use request_lifecycle_core::{ExecutorOptions, PageResponse, PageState, RequestFn, RequestState};
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments passed to a paged request function: `(page, limit, args)`.
pub type PageArgs<A> = (u32, u32, A);

/// Accumulates offset/limit pages into one ordered list.
///
/// # Example
///
/// ```rust
/// use request_lifecycle_core::{ExecutorOptions, PageResponse, Response, request_fn};
/// use request_lifecycle_runtime::PagedAccumulator;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let rooms = PagedAccumulator::new(
///     request_fn(|(page, limit, ()): (u32, u32, ())| async move {
///         let start = (page - 1) * limit;
///         let items = (start..(start + limit).min(5)).collect();
///         Ok(Response::new(PageResponse { items, total: 5, page, limit }))
///     }),
///     2,
///     ExecutorOptions::default(),
/// );
///
/// rooms.refresh(()).await;
/// rooms.load_more(()).await;
/// assert_eq!(rooms.items(), vec![0, 1, 2, 3]);
/// assert!(rooms.has_more());
/// # }
/// ```
pub struct PagedAccumulator<A, T> {
    executor: CancellableExecutor<PageArgs<A>, PageResponse<T>>,
    pages: Arc<watch::Sender<PageState<T>>>,
}

impl<A, T> PagedAccumulator<A, T>
where
    A: Clone + Default + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create an accumulator with page size `limit`.
    ///
    /// When `options.immediate` is set, the first page is fetched right away
    /// with `A::default()`. `options.on_success` fires for every committed
    /// page, after it has been accumulated.
    ///
    /// # Panics
    ///
    /// Panics if `options.immediate` is set and no tokio runtime is running.
    #[must_use]
    pub fn new(
        request: RequestFn<PageArgs<A>, PageResponse<T>>,
        limit: u32,
        mut options: ExecutorOptions<PageResponse<T>>,
    ) -> Self {
        let (pages, _) = watch::channel(PageState::new(limit));
        let immediate = std::mem::take(&mut options.immediate);

        let accumulator = Self {
            executor: CancellableExecutor::lazy(request, options),
            pages: Arc::new(pages),
        };
        if immediate {
            drop(accumulator.refresh(A::default()));
        }
        accumulator
    }
}

impl<A, T> PagedAccumulator<A, T>
where
    A: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Fetch `page` with `limit`, superseding any fetch in flight.
    ///
    /// The committed items replace the list when `page` is 1 and are appended
    /// otherwise.
    pub fn execute(&self, page: u32, limit: u32, args: A) -> RequestHandle<PageResponse<T>> {
        let generation = self.executor.begin();
        self.launch(generation, page, limit, args)
    }

    /// Fetch the page after the current one.
    pub fn load_more(&self, args: A) -> RequestHandle<PageResponse<T>> {
        let generation = self.executor.begin();
        let mut next = (1, 0);
        self.pages.send_modify(|state| {
            state.page = state.page.saturating_add(1);
            next = (state.page, state.limit);
        });
        self.launch(generation, next.0, next.1, args)
    }

    /// Drop accumulated items and fetch page 1 again.
    pub fn refresh(&self, args: A) -> RequestHandle<PageResponse<T>> {
        let generation = self.executor.begin();
        let mut limit = 0;
        self.pages.send_modify(|state| {
            state.restart();
            limit = state.limit;
        });
        self.launch(generation, 1, limit, args)
    }

    /// Switch to a new page size and start over from page 1.
    pub fn change_limit(&self, limit: u32, args: A) -> RequestHandle<PageResponse<T>> {
        let generation = self.executor.begin();
        self.pages.send_modify(|state| {
            state.limit = limit;
            state.restart();
        });
        self.launch(generation, 1, limit, args)
    }

    /// Start the call for `generation`, folding its page in on commit.
    fn launch(
        &self,
        generation: u64,
        page: u32,
        limit: u32,
        args: A,
    ) -> RequestHandle<PageResponse<T>> {
        tracing::debug!(page, limit, "Fetching page");
        let pages = Arc::clone(&self.pages);
        let fold: CommitHook<PageResponse<T>> = Box::new(move |state| {
            if let (true, Some(response)) = (state.is_success, &state.data) {
                pages.send_modify(|pages| {
                    pages.apply(page, response.total, response.items.clone());
                });
            }
        });
        self.executor.launch(generation, (page, limit, args), Some(fold))
    }

    /// Clear the request state and the accumulated list, keeping the page
    /// size. A fetch in flight is not cancelled.
    pub fn reset(&self) {
        self.executor.reset();
        self.pages.send_modify(|state| {
            *state = PageState::new(state.limit);
        });
    }

    /// Invalidate the fetch in flight.
    pub fn cancel(&self) {
        self.executor.cancel();
    }

    /// Tear down: equivalent to [`Self::cancel`].
    pub fn dispose(&self) {
        self.executor.dispose();
    }

    /// Accumulated items.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.pages.borrow().items.clone()
    }

    /// Current page number.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.pages.borrow().page
    }

    /// Current page size.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.pages.borrow().limit
    }

    /// Total reported by the last committed page.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.pages.borrow().total
    }

    /// More items exist than have been accumulated.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.pages.borrow().has_more()
    }

    /// Snapshot of the accumulated pages.
    #[must_use]
    pub fn pages(&self) -> PageState<T> {
        self.pages.borrow().clone()
    }

    /// Observe the accumulated pages.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PageState<T>> {
        self.pages.subscribe()
    }

    /// Request state of the latest fetch.
    #[must_use]
    pub fn state(&self) -> RequestState<PageResponse<T>> {
        self.executor.state()
    }

    /// Observe the request state.
    #[must_use]
    pub fn subscribe_request(&self) -> watch::Receiver<RequestState<PageResponse<T>>> {
        self.executor.subscribe()
    }

    /// A fetch is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.executor.is_loading()
    }

    /// Error of the last failed fetch.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.executor.error()
    }
}
