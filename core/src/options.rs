//! Per-executor configuration.

use crate::error::UNKNOWN_ERROR;
use crate::retry::RetryPolicy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback fired with committed data.
pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Callback fired with the committed error message.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Options recognised by `CancellableExecutor` and the controllers built on it.
///
/// # Example
///
/// ```rust
/// use request_lifecycle_core::options::ExecutorOptions;
/// use std::time::Duration;
///
/// let options = ExecutorOptions::<u32>::default()
///     .with_retry(2)
///     .with_retry_delay(Duration::from_millis(500))
///     .on_error(|message| eprintln!("request failed: {message}"));
///
/// assert_eq!(options.retry.max_attempts, 2);
/// assert!(!options.immediate);
/// ```
pub struct ExecutorOptions<T> {
    /// Run once with default arguments at construction
    pub immediate: bool,
    /// Fired after a success commits
    pub on_success: Option<SuccessCallback<T>>,
    /// Fired after a final failure commits
    pub on_error: Option<ErrorCallback>,
    /// Retry count and delay
    pub retry: RetryPolicy,
    /// Message used when a rejection carries none
    pub fallback_error: &'static str,
}

impl<T> ExecutorOptions<T> {
    /// Run once at construction.
    #[must_use]
    pub const fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Number of attempts after the first failure.
    #[must_use]
    pub const fn with_retry(mut self, retry: u32) -> Self {
        self.retry.max_attempts = retry;
        self
    }

    /// Pause between attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.delay = delay;
        self
    }

    /// Replace the whole retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Message for rejections without one.
    #[must_use]
    pub const fn with_fallback_error(mut self, message: &'static str) -> Self {
        self.fallback_error = message;
        self
    }

    /// Register the success callback.
    #[must_use]
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Register the error callback.
    #[must_use]
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

impl<T> Default for ExecutorOptions<T> {
    fn default() -> Self {
        Self {
            immediate: false,
            on_success: None,
            on_error: None,
            retry: RetryPolicy::default(),
            fallback_error: UNKNOWN_ERROR,
        }
    }
}

impl<T> Clone for ExecutorOptions<T> {
    fn clone(&self) -> Self {
        Self {
            immediate: self.immediate,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            retry: self.retry,
            fallback_error: self.fallback_error,
        }
    }
}

impl<T> fmt::Debug for ExecutorOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorOptions")
            .field("immediate", &self.immediate)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("retry", &self.retry)
            .field("fallback_error", &self.fallback_error)
            .finish()
    }
}
