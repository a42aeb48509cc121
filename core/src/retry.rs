//! Fixed-delay retry policy.
//!
//! # Example
//!
//! ```rust
//! use request_lifecycle_core::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_attempts(2)
//!     .delay(Duration::from_millis(500))
//!     .build();
//!
//! assert_eq!(policy.total_attempts(), 3);
//! assert!(policy.should_retry(1));
//! assert!(!policy.should_retry(2));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// How many extra attempts an executor makes and how long it waits between
/// them.
///
/// # Default Values
///
/// - `max_attempts`: 0 (no retry)
/// - `delay`: 1000ms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Attempts made after the first one fails
    pub max_attempts: u32,
    /// Pause before each retry
    #[serde(with = "duration_ms", rename = "delayMs")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 0,
            delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: 0,
            delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Whether another attempt is allowed after `retries_so_far` retries.
    #[must_use]
    pub const fn should_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_attempts
    }

    /// First attempt plus all retries.
    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicyBuilder {
    /// Set the number of retries after the first attempt.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the pause before each retry.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub const fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: self.delay,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)] // delays beyond u64 millis are not meaningful
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
