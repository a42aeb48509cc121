//! Debounced search over a text term.
//!
//! Keystrokes update the term immediately; the search itself only runs once
//! the term has been quiet for the debounce delay, and only when the settled
//! term actually changed. A blank term never reaches the search function.

use crate::debounce::Debouncer;
use crate::executor::{CancellableExecutor, RequestHandle};
use request_lifecycle_core::{
    ExecutorOptions, RequestError, RequestState, Response, request_fn,
};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Terms {
    /// What the user typed
    current: String,
    /// Last term the debounce settled on
    settled: String,
}

/// Everything a search box needs to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSnapshot<T> {
    /// Term as typed
    pub search_term: String,
    /// Results of the last committed search
    pub results: Vec<T>,
    /// A search is in flight
    pub is_searching: bool,
    /// The term has changed since it last settled
    pub is_typing: bool,
    /// Error of the last failed search
    pub error: Option<String>,
}

/// Debounce in front of a search function.
///
/// # Example
///
/// ```rust
/// use request_lifecycle_runtime::DebouncedSearchController;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() {
/// let search = DebouncedSearchController::new(
///     |term: String| async move { Ok(vec![format!("{term}-suite")]) },
///     Duration::from_millis(300),
/// );
///
/// search.set_search_term("deluxe");
/// assert!(search.is_typing());
///
/// tokio::time::sleep(Duration::from_millis(310)).await;
/// assert_eq!(search.results(), vec!["deluxe-suite".to_string()]);
/// # }
/// ```
///
/// Dropping the controller cancels the pending debounce and invalidates the
/// search in flight.
pub struct DebouncedSearchController<T> {
    executor: Arc<CancellableExecutor<String, Vec<T>>>,
    terms: Arc<watch::Sender<Terms>>,
    debouncer: Debouncer,
}

impl<T> DebouncedSearchController<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Search with `search` once the term has been quiet for `delay`.
    #[must_use]
    pub fn new<F, Fut>(search: F, delay: Duration) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, RequestError>> + Send + 'static,
    {
        let request = request_fn(move |term: String| {
            let results = search(term);
            async move { results.await.map(Response::new) }
        });
        let (terms, _) = watch::channel(Terms::default());
        Self {
            executor: Arc::new(CancellableExecutor::lazy(request, ExecutorOptions::default())),
            terms: Arc::new(terms),
            debouncer: Debouncer::new(delay),
        }
    }

    /// Record a new term.
    ///
    /// A blank term clears the results immediately and stops any search in
    /// flight. Otherwise the search is (re)scheduled for after the quiet
    /// period.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn set_search_term(&self, term: impl Into<String>) {
        let term = term.into();
        self.terms.send_modify(|terms| terms.current.clone_from(&term));

        if term.trim().is_empty() {
            self.debouncer.cancel();
            self.executor.cancel();
            self.executor.reset();
            self.terms.send_modify(|terms| terms.settled = term);
            return;
        }

        let executor = Arc::downgrade(&self.executor);
        let terms = Arc::clone(&self.terms);
        self.debouncer.schedule(move || settle(&executor, &terms, term));
    }

    /// Search for the current term right away, skipping the quiet period.
    ///
    /// Returns `None` when the term is blank.
    pub fn search_now(&self) -> Option<RequestHandle<Vec<T>>> {
        self.debouncer.cancel();
        let term = self.terms.borrow().current.clone();
        self.terms.send_modify(|terms| terms.settled.clone_from(&term));

        let query = term.trim();
        if query.is_empty() {
            return None;
        }
        Some(self.executor.execute(query.to_string()))
    }

    /// Reset the term, the results and the error together.
    pub fn clear_results(&self) {
        self.debouncer.cancel();
        self.executor.cancel();
        self.executor.reset();
        self.terms.send_replace(Terms::default());
    }

    /// Stop the pending debounce and any search in flight.
    pub fn dispose(&self) {
        self.debouncer.cancel();
        self.executor.dispose();
    }

    /// Term as typed.
    #[must_use]
    pub fn search_term(&self) -> String {
        self.terms.borrow().current.clone()
    }

    /// Results of the last committed search; empty for a blank term.
    #[must_use]
    pub fn results(&self) -> Vec<T> {
        self.executor.data().unwrap_or_default()
    }

    /// A search is in flight.
    #[must_use]
    pub fn is_searching(&self) -> bool {
        self.executor.is_loading()
    }

    /// The term has changed since it last settled.
    #[must_use]
    pub fn is_typing(&self) -> bool {
        let terms = self.terms.borrow();
        terms.current != terms.settled
    }

    /// Error of the last failed search.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.executor.error()
    }

    /// Everything at once.
    #[must_use]
    pub fn snapshot(&self) -> SearchSnapshot<T> {
        let state = self.executor.state();
        let terms = self.terms.borrow().clone();
        SearchSnapshot {
            is_typing: terms.current != terms.settled,
            search_term: terms.current,
            results: state.data.unwrap_or_default(),
            is_searching: state.is_loading,
            error: state.error,
        }
    }

    /// Observe the search request state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RequestState<Vec<T>>> {
        self.executor.subscribe()
    }
}

/// Debounce fired: record the settled term and search if it changed.
fn settle<T>(
    executor: &Weak<CancellableExecutor<String, Vec<T>>>,
    terms: &watch::Sender<Terms>,
    term: String,
) where
    T: Clone + Send + Sync + 'static,
{
    let changed = terms.send_if_modified(|terms| {
        if terms.settled == term {
            return false;
        }
        terms.settled.clone_from(&term);
        true
    });
    if !changed {
        tracing::trace!("Settled term unchanged, skipping search");
        return;
    }
    if let Some(executor) = executor.upgrade() {
        drop(executor.execute(term.trim().to_string()));
    }
}
