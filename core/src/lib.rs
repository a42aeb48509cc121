//! # Request Lifecycle Core
//!
//! Core types for the request lifecycle controllers.
//!
//! This crate holds the values that flow between an application and the
//! controllers in `request-lifecycle-runtime`. Nothing in here spawns, sleeps
//! or publishes.
//!
//! ## Core Concepts
//!
//! - **Request function**: an injected async capability returning a
//!   [`Response`](response::Response) or a [`RequestError`](error::RequestError)
//! - **Request state**: the observable lifecycle of one request slot
//! - **Page / cursor state**: accumulated results of paginated listings
//! - **Executor options**: retry policy, callbacks, auto-run
//!
//! ## Example
//!
//! ```rust
//! use request_lifecycle_core::request::request_fn;
//! use request_lifecycle_core::response::Response;
//! use request_lifecycle_core::error::RequestError;
//!
//! let fetch_user = request_fn(|id: u64| async move {
//!     if id == 0 {
//!         return Err(RequestError::failed("no such user"));
//!     }
//!     Ok(Response::new(format!("user-{id}")))
//! });
//! # let _ = fetch_user;
//! ```

/// Observable state shapes
pub mod state;

/// Response envelopes returned by request functions
pub mod response;

/// Request and configuration errors
pub mod error;

/// Fixed-delay retry policy
pub mod retry;

/// Per-executor options
pub mod options;

/// Library-wide defaults loaded from the environment
pub mod config;

/// Request module - the injected async capability
///
/// A request function takes one `Args` value (use a tuple for several
/// arguments) and returns a boxed future. The controllers call it without
/// knowing anything about transport, status codes or headers.
pub mod request {
    use crate::error::RequestError;
    use crate::response::Response;
    use futures::future::{BoxFuture, FutureExt};
    use std::future::Future;
    use std::sync::Arc;

    /// Result of one request attempt.
    pub type RequestResult<T> = Result<Response<T>, RequestError>;

    /// Shared, type-erased request function.
    pub type RequestFn<Args, T> =
        Arc<dyn Fn(Args) -> BoxFuture<'static, RequestResult<T>> + Send + Sync>;

    /// Erase an async closure into a [`RequestFn`].
    pub fn request_fn<Args, T, F, Fut>(f: F) -> RequestFn<Args, T>
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RequestResult<T>> + Send + 'static,
    {
        Arc::new(move |args| f(args).boxed())
    }
}

pub use error::{ConfigError, OPERATION_FAILED, RequestError, UNKNOWN_ERROR};
pub use options::ExecutorOptions;
pub use request::{RequestFn, RequestResult, request_fn};
pub use response::{CursorResponse, PageResponse, Response};
pub use retry::RetryPolicy;
pub use state::{CursorState, PageState, RequestState};

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_fn_erases_closure() {
        let double = request_fn(|n: u32| async move { Ok(Response::new(n * 2)) });
        let response = double(21).await.unwrap();
        assert_eq!(response.data, 42);
    }

    #[tokio::test]
    async fn request_fn_propagates_rejection() {
        let failing = request_fn(|(): ()| async { Err::<Response<()>, _>(RequestError::NonError) });
        assert_eq!(failing(()).await.unwrap_err(), RequestError::NonError);
    }
}
