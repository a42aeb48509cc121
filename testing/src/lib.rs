//! # Request Lifecycle Testing
//!
//! Testing utilities for the request lifecycle controllers.
//!
//! This crate provides:
//! - [`ScriptedRequest`]: a request function that plays back a script of
//!   outcomes and records every call
//! - proptest strategies for retry policies and paginated listings
//! - [`init_test_tracing`] for readable logs in failing tests
//!
//! ## Example
//!
//! ```rust
//! use request_lifecycle_testing::ScriptedRequest;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let script = ScriptedRequest::<u32, &str>::new()
//!     .then_fail("timeout")
//!     .then_ok_after("done", Duration::from_millis(50));
//!
//! let request = script.request_fn();
//! assert!(request(1).await.is_err());
//! assert_eq!(request(2).await.map(|r| r.data).ok(), Some("done"));
//! assert_eq!(script.calls(), vec![1, 2]);
//! # }
//! ```

/// Mock request functions.
pub mod mocks {
    use request_lifecycle_core::{RequestError, RequestFn, Response};
    use futures::future::FutureExt;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    /// What one scripted call answers.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Scripted<T> {
        /// Resolve with `Response { data }`
        Ok(T),
        /// Reject with `RequestError::Failed(message)`
        Fail(String),
        /// Reject with `RequestError::NonError`
        Reject,
    }

    impl<T> Scripted<T> {
        fn into_result(self) -> Result<Response<T>, RequestError> {
            match self {
                Self::Ok(data) => Ok(Response::new(data)),
                Self::Fail(message) => Err(RequestError::Failed(message)),
                Self::Reject => Err(RequestError::NonError),
            }
        }
    }

    #[derive(Debug)]
    struct Step<T> {
        outcome: Scripted<T>,
        latency: Duration,
    }

    /// Message used once the script has run out.
    pub const SCRIPT_EXHAUSTED: &str = "script exhausted";

    /// A request function that answers from a queue of scripted outcomes.
    ///
    /// Each call pops the next step when the request function is *called*,
    /// not when its future is polled, so call counts are exact even for calls
    /// that are later superseded. Clones share the same script and call log.
    #[derive(Debug)]
    pub struct ScriptedRequest<Args, T> {
        steps: Arc<Mutex<VecDeque<Step<T>>>>,
        calls: Arc<Mutex<Vec<Args>>>,
        otherwise: Arc<Mutex<Scripted<T>>>,
    }

    impl<Args, T> Clone for ScriptedRequest<Args, T> {
        fn clone(&self) -> Self {
            Self {
                steps: Arc::clone(&self.steps),
                calls: Arc::clone(&self.calls),
                otherwise: Arc::clone(&self.otherwise),
            }
        }
    }

    impl<Args, T> Default for ScriptedRequest<Args, T> {
        fn default() -> Self {
            Self::new()
        }
    }

    fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl<Args, T> ScriptedRequest<Args, T> {
        /// Empty script; every call fails with [`SCRIPT_EXHAUSTED`].
        #[must_use]
        pub fn new() -> Self {
            Self {
                steps: Arc::new(Mutex::new(VecDeque::new())),
                calls: Arc::new(Mutex::new(Vec::new())),
                otherwise: Arc::new(Mutex::new(Scripted::Fail(SCRIPT_EXHAUSTED.to_string()))),
            }
        }

        /// Append a step answering `outcome` after `latency`.
        #[must_use]
        pub fn then(self, outcome: Scripted<T>, latency: Duration) -> Self {
            lock(&self.steps).push_back(Step { outcome, latency });
            self
        }

        /// Append an immediate success.
        #[must_use]
        pub fn then_ok(self, data: T) -> Self {
            self.then(Scripted::Ok(data), Duration::ZERO)
        }

        /// Append a success that takes `latency` to arrive.
        #[must_use]
        pub fn then_ok_after(self, data: T, latency: Duration) -> Self {
            self.then(Scripted::Ok(data), latency)
        }

        /// Append an immediate failure carrying `message`.
        #[must_use]
        pub fn then_fail(self, message: impl Into<String>) -> Self {
            self.then(Scripted::Fail(message.into()), Duration::ZERO)
        }

        /// Append a failure that takes `latency` to arrive.
        #[must_use]
        pub fn then_fail_after(self, message: impl Into<String>, latency: Duration) -> Self {
            self.then(Scripted::Fail(message.into()), latency)
        }

        /// Append an immediate rejection without a message.
        #[must_use]
        pub fn then_reject(self) -> Self {
            self.then(Scripted::Reject, Duration::ZERO)
        }

        /// Answer `outcome` once the queued steps are used up.
        #[must_use]
        pub fn otherwise(self, outcome: Scripted<T>) -> Self {
            *lock(&self.otherwise) = outcome;
            self
        }

        /// Number of calls so far.
        #[must_use]
        pub fn call_count(&self) -> usize {
            lock(&self.calls).len()
        }

        /// Steps not yet consumed.
        #[must_use]
        pub fn remaining(&self) -> usize {
            lock(&self.steps).len()
        }
    }

    impl<Args, T> ScriptedRequest<Args, T>
    where
        Args: Clone,
    {
        /// Arguments of every call, in order.
        #[must_use]
        pub fn calls(&self) -> Vec<Args> {
            lock(&self.calls).clone()
        }
    }

    impl<Args, T> ScriptedRequest<Args, T>
    where
        Args: Send + 'static,
        T: Clone + Send + 'static,
    {
        /// Request function backed by this script.
        #[must_use]
        pub fn request_fn(&self) -> RequestFn<Args, T> {
            let script = self.clone();
            Arc::new(move |args: Args| {
                lock(&script.calls).push(args);
                let step = lock(&script.steps).pop_front().unwrap_or_else(|| Step {
                    outcome: lock(&script.otherwise).clone(),
                    latency: Duration::ZERO,
                });
                async move {
                    if !step.latency.is_zero() {
                        tokio::time::sleep(step.latency).await;
                    }
                    step.outcome.into_result()
                }
                .boxed()
            })
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use request_lifecycle_core::RetryPolicy;
    use std::time::Duration;

    /// Retry policies with up to 5 retries and delays up to 2s.
    pub fn retry_policies() -> impl Strategy<Value = RetryPolicy> {
        (0u32..=5, 0u64..=2000).prop_map(|(max_attempts, delay_ms)| {
            RetryPolicy::builder()
                .max_attempts(max_attempts)
                .delay(Duration::from_millis(delay_ms))
                .build()
        })
    }

    /// `(total, limit)` pairs describing a non-empty paginated listing.
    pub fn listings() -> impl Strategy<Value = (u64, u32)> {
        (1u64..=200, 1u32..=25)
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{SCRIPT_EXHAUSTED, Scripted, ScriptedRequest};
