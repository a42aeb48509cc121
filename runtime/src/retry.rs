//! Fixed-delay retry for cancellable calls.
//!
//! Unlike a plain retry loop, every decision point asks the caller whether the
//! call is still wanted. A superseded call stops retrying and reports
//! [`RetryOutcome::Abandoned`] instead of sleeping through its remaining
//! attempts.
//!
//! # Example
//!
//! ```rust
//! use request_lifecycle_core::RetryPolicy;
//! use request_lifecycle_runtime::retry::{RetryOutcome, retry_with_delay};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(2)
//!     .delay(Duration::from_millis(10))
//!     .build();
//!
//! let operation = || Box::pin(async { Ok::<_, String>(42) });
//! let outcome = retry_with_delay(&policy, operation(), operation, || true).await;
//! assert!(matches!(outcome, RetryOutcome::Succeeded(42)));
//! # }
//! ```

use crate::metrics::RETRIES_TOTAL;
use request_lifecycle_core::RetryPolicy;
use std::future::Future;
use tokio::time::sleep;

/// How a retried call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// An attempt succeeded
    Succeeded(T),
    /// Every allowed attempt failed; carries the last error
    Exhausted(E),
    /// The caller stopped wanting the result
    Abandoned,
}

/// Drive `first`, then re-run `operation` after `policy.delay` until an
/// attempt succeeds, the policy runs out, or `still_wanted` returns false.
///
/// `first` is taken as an already-created future so the first attempt can be
/// started before this function is first polled.
pub async fn retry_with_delay<F, Fut, T, E, W>(
    policy: &RetryPolicy,
    first: Fut,
    mut operation: F,
    still_wanted: W,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    W: Fn() -> bool,
{
    let mut retries = 0;
    let mut attempt = first;

    loop {
        match attempt.await {
            Ok(result) => {
                if retries > 0 {
                    tracing::info!(retries, "Request succeeded after retry");
                }
                return RetryOutcome::Succeeded(result);
            }
            Err(err) => {
                if !still_wanted() {
                    return RetryOutcome::Abandoned;
                }

                if !policy.should_retry(retries) {
                    tracing::debug!(
                        attempts = retries + 1,
                        error = %err,
                        "Request failed after exhausting retries"
                    );
                    return RetryOutcome::Exhausted(err);
                }

                tracing::warn!(
                    attempt = retries + 1,
                    delay_ms = policy.delay.as_millis(),
                    error = %err,
                    "Request failed, retrying after delay"
                );
                metrics::counter!(RETRIES_TOTAL).increment(1);

                sleep(policy.delay).await;
                if !still_wanted() {
                    tracing::trace!("Retry abandoned: call superseded during delay");
                    return RetryOutcome::Abandoned;
                }

                retries += 1;
                attempt = operation();
            }
        }
    }
}
