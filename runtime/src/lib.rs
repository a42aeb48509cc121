//! # Request Lifecycle Runtime
//!
//! Controllers that drive asynchronous, cancellable requests and publish
//! their state.
//!
//! ## Core Components
//!
//! - **CancellableExecutor**: one request slot with retry and stale-result
//!   discard
//! - **PagedAccumulator / CursorAccumulator**: pagination on top of an executor
//! - **MutationController / OptimisticMutationController**: manually
//!   triggered writes, optionally with an optimistic local value
//! - **Debouncer** and friends: collapse bursts of input into one event
//! - **DebouncedSearchController / DebouncedAsyncController**: debounce in
//!   front of an executor
//!
//! Every controller exposes a snapshot accessor and a `subscribe()` method
//! returning a [`tokio::sync::watch::Receiver`]. Dropping a controller cancels
//! its timers and invalidates its in-flight calls.
//!
//! ## Example
//!
//! ```rust
//! use request_lifecycle_core::{ExecutorOptions, RequestError, Response, request_fn};
//! use request_lifecycle_runtime::CancellableExecutor;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let executor = CancellableExecutor::lazy(
//!     request_fn(|query: String| async move {
//!         if query.is_empty() {
//!             return Err(RequestError::failed("empty query"));
//!         }
//!         Ok(Response::new(query.len()))
//!     }),
//!     ExecutorOptions::default().with_retry(1).with_retry_delay(Duration::from_millis(100)),
//! );
//!
//! let mut updates = executor.subscribe();
//! let handle = executor.execute("rust".to_string());
//! assert!(updates.borrow_and_update().is_loading);
//!
//! assert_eq!(handle.await, Some(4));
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Explicit timer resource
pub mod timer;

/// Debounced values and callbacks
pub mod debounce;

/// Fixed-delay retry that stops once a call is superseded
pub mod retry;

/// Cancellable executor and request handles
pub mod executor;

/// Offset/limit pagination
pub mod paged;

/// Cursor pagination
pub mod cursor;

/// Manually triggered and optimistic mutations
pub mod mutation;

/// Debounced search over a text term
pub mod search;

/// Debounced arbitrary async calls
pub mod debounced_async;

/// Prometheus metrics for observability
pub mod metrics;

pub use cursor::CursorAccumulator;
pub use debounce::{DebouncedCallback, DebouncedSnapshot, DebouncedState, DebouncedValue, Debouncer};
pub use debounced_async::DebouncedAsyncController;
pub use executor::{CancellableExecutor, RequestHandle, Settled};
pub use mutation::{MutationController, MutationHandle, OptimisticMutationController};
pub use paged::PagedAccumulator;
pub use search::{DebouncedSearchController, SearchSnapshot};
pub use timer::{Timer, TimerHandle};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// None of the guarded values can be left half-updated by a panic, so the
/// poison flag carries no information here.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
