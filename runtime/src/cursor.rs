//! Cursor pagination on top of a [`CancellableExecutor`].
//!
//! The request function receives `(cursor, limit, args)` and answers with a
//! [`CursorResponse`]. Every committed page is appended; only
//! [`CursorAccumulator::refresh`] starts the list over. Pages are appended
//! inside the executor's commit, so a superseded page never lands after a
//! refresh.

use crate::executor::{CancellableExecutor, CommitHook, RequestHandle};
use request_lifecycle_core::{
    CursorResponse, CursorState, ExecutorOptions, RequestFn, RequestState,
};
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments passed to a cursor request function: `(cursor, limit, args)`.
pub type CursorArgs<A> = (Option<String>, u32, A);

/// Accumulates cursor pages into one ordered list.
pub struct CursorAccumulator<A, T> {
    executor: CancellableExecutor<CursorArgs<A>, CursorResponse<T>>,
    cursor: Arc<watch::Sender<CursorState<T>>>,
    limit: u32,
}

impl<A, T> CursorAccumulator<A, T>
where
    A: Clone + Default + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create an accumulator requesting `limit` items per page.
    ///
    /// When `options.immediate` is set, the first page is fetched right away
    /// with `A::default()`.
    ///
    /// # Panics
    ///
    /// Panics if `options.immediate` is set and no tokio runtime is running.
    #[must_use]
    pub fn new(
        request: RequestFn<CursorArgs<A>, CursorResponse<T>>,
        limit: u32,
        mut options: ExecutorOptions<CursorResponse<T>>,
    ) -> Self {
        let (cursor, _) = watch::channel(CursorState::new());
        let immediate = std::mem::take(&mut options.immediate);

        let accumulator = Self {
            executor: CancellableExecutor::lazy(request, options),
            cursor: Arc::new(cursor),
            limit,
        };
        if immediate {
            drop(accumulator.refresh(A::default()));
        }
        accumulator
    }
}

impl<A, T> CursorAccumulator<A, T>
where
    A: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Fetch the page at `cursor`, superseding any fetch in flight.
    pub fn execute(
        &self,
        cursor: Option<String>,
        limit: u32,
        args: A,
    ) -> RequestHandle<CursorResponse<T>> {
        let generation = self.executor.begin();
        self.launch(generation, cursor, limit, args)
    }

    /// Fetch the next page.
    ///
    /// Returns `None` without calling the request function while a fetch is
    /// in flight or when the last page has been reached.
    pub fn load_more(&self, args: A) -> Option<RequestHandle<CursorResponse<T>>> {
        if self.executor.is_loading() {
            tracing::trace!("Skipping load_more: fetch in flight");
            return None;
        }
        let next_cursor = {
            let state = self.cursor.borrow();
            if !state.has_more {
                tracing::trace!("Skipping load_more: no more pages");
                return None;
            }
            state.next_cursor.clone()
        };
        Some(self.execute(next_cursor, self.limit, args))
    }

    /// Clear accumulated items and fetch the first page again.
    pub fn refresh(&self, args: A) -> RequestHandle<CursorResponse<T>> {
        let generation = self.executor.begin();
        self.cursor.send_modify(CursorState::restart);
        self.launch(generation, None, self.limit, args)
    }

    /// Start the call for `generation`, appending its page on commit.
    fn launch(
        &self,
        generation: u64,
        cursor: Option<String>,
        limit: u32,
        args: A,
    ) -> RequestHandle<CursorResponse<T>> {
        tracing::debug!(cursor = ?cursor, limit, "Fetching cursor page");
        let pages = Arc::clone(&self.cursor);
        let append: CommitHook<CursorResponse<T>> = Box::new(move |state| {
            if let (true, Some(response)) = (state.is_success, &state.data) {
                pages.send_modify(|pages| {
                    pages.apply(response.items.clone(), response.next_cursor.clone());
                });
            }
        });
        self.executor.launch(generation, (cursor, limit, args), Some(append))
    }

    /// Clear the request state and the accumulated list. A fetch in flight is
    /// not cancelled.
    pub fn reset(&self) {
        self.executor.reset();
        self.cursor.send_replace(CursorState::new());
    }

    /// Invalidate the fetch in flight.
    pub fn cancel(&self) {
        self.executor.cancel();
    }

    /// Tear down: equivalent to [`Self::cancel`].
    pub fn dispose(&self) {
        self.executor.dispose();
    }

    /// Page size.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Accumulated items.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.cursor.borrow().items.clone()
    }

    /// Token for the next page.
    #[must_use]
    pub fn next_cursor(&self) -> Option<String> {
        self.cursor.borrow().next_cursor.clone()
    }

    /// Another page can be requested.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.cursor.borrow().has_more
    }

    /// Snapshot of the accumulated pages.
    #[must_use]
    pub fn pages(&self) -> CursorState<T> {
        self.cursor.borrow().clone()
    }

    /// Observe the accumulated pages.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CursorState<T>> {
        self.cursor.subscribe()
    }

    /// Request state of the latest fetch.
    #[must_use]
    pub fn state(&self) -> RequestState<CursorResponse<T>> {
        self.executor.state()
    }

    /// Observe the request state.
    #[must_use]
    pub fn subscribe_request(&self) -> watch::Receiver<RequestState<CursorResponse<T>>> {
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

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use request_lifecycle_core::{Response, request_fn};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Three pages: "p1" -> "p2" -> "p3" (last), 10ms each.
    fn three_pages(calls: &Arc<AtomicUsize>) -> RequestFn<CursorArgs<()>, CursorResponse<String>> {
        let calls = Arc::clone(calls);
        request_fn(move |(cursor, _limit, ()): CursorArgs<()>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let (item, next) = match cursor.as_deref() {
                    None => ("p1", Some("c2")),
                    Some("c2") => ("p2", Some("c3")),
                    _ => ("p3", None),
                };
                Ok(Response::new(CursorResponse {
                    items: vec![item.to_string()],
                    next_cursor: next.map(str::to_string),
                }))
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn load_more_while_pending_makes_no_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let feed = CursorAccumulator::new(three_pages(&calls), 20, ExecutorOptions::default());

        let first = feed.load_more(()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(feed.load_more(()).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        first.await;
        assert_eq!(feed.items(), vec!["p1"]);
        assert_eq!(feed.next_cursor().as_deref(), Some("c2"));
    }

    #[tokio::test(start_paused = true)]
    async fn pages_append_until_cursor_runs_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let feed = CursorAccumulator::new(three_pages(&calls), 20, ExecutorOptions::default());

        feed.refresh(()).await;
        feed.load_more(()).unwrap().await;
        feed.load_more(()).unwrap().await;

        assert_eq!(feed.items(), vec!["p1", "p2", "p3"]);
        assert!(!feed.has_more());
        assert!(feed.load_more(()).is_none(), "no call past the last page");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_starts_over() {
        let calls = Arc::new(AtomicUsize::new(0));
        let feed = CursorAccumulator::new(three_pages(&calls), 20, ExecutorOptions::default());
        feed.refresh(()).await;
        feed.load_more(()).unwrap().await;

        let handle = feed.refresh(());
        let pages = feed.pages();
        assert!(pages.items.is_empty());
        assert!(pages.has_more && pages.next_cursor.is_none());

        handle.await;
        assert_eq!(feed.items(), vec!["p1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_page_is_not_appended() {
        let calls = Arc::new(AtomicUsize::new(0));
        let feed = CursorAccumulator::new(three_pages(&calls), 20, ExecutorOptions::default());

        let handle = feed.refresh(());
        feed.cancel();
        assert!(handle.settled().await.is_superseded());
        assert!(feed.items().is_empty());
        assert!(!feed.is_loading());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn refresh_racing_a_settling_page_never_keeps_it() {
        for round in 0..200u64 {
            let feed = CursorAccumulator::new(
                request_fn(move |(cursor, _limit, ()): CursorArgs<()>| async move {
                    let item = match cursor {
                        None => "first".to_string(),
                        Some(cursor) => cursor,
                    };
                    Ok(Response::new(CursorResponse {
                        items: vec![item],
                        next_cursor: Some(format!("more-{round}")),
                    }))
                }),
                10,
                ExecutorOptions::default(),
            );
            feed.refresh(()).await;

            let stale = feed.load_more(()).unwrap();
            tokio::task::yield_now().await;
            let fresh = feed.refresh(());

            fresh.await;
            stale.await;
            assert_eq!(feed.items(), vec!["first".to_string()], "round {round}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn limit_is_forwarded() {
        let seen = Arc::new(AtomicU32::new(0));
        let sink = Arc::clone(&seen);
        let feed = CursorAccumulator::new(
            request_fn(move |(_, limit, ()): CursorArgs<()>| {
                sink.store(limit, Ordering::SeqCst);
                async {
                    Ok(Response::new(CursorResponse::<u8> {
                        items: vec![],
                        next_cursor: None,
                    }))
                }
            }),
            7,
            ExecutorOptions::default().immediate(true),
        );

        assert_eq!(seen.load(Ordering::SeqCst), 7);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!feed.has_more());
    }
}
