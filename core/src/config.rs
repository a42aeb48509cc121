//! Library-wide defaults for controllers.
//!
//! # Example
//!
//! ```no_run
//! use request_lifecycle_core::config::LifecycleConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Reads REQUEST_RETRY, REQUEST_RETRY_DELAY_MS, REQUEST_DEBOUNCE_MS,
//! // REQUEST_PAGE_LIMIT and REQUEST_CURSOR_LIMIT, falling back to defaults.
//! let config = LifecycleConfig::from_env()?;
//! let options = config.executor_options::<Vec<String>>();
//! println!("retries: {}", options.retry.max_attempts);
//! # Ok(())
//! # }
//! ```

use crate::error::ConfigError;
use crate::options::ExecutorOptions;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable for [`LifecycleConfig::retry`].
pub const ENV_RETRY: &str = "REQUEST_RETRY";
/// Environment variable for [`LifecycleConfig::retry_delay_ms`].
pub const ENV_RETRY_DELAY_MS: &str = "REQUEST_RETRY_DELAY_MS";
/// Environment variable for [`LifecycleConfig::debounce_ms`].
pub const ENV_DEBOUNCE_MS: &str = "REQUEST_DEBOUNCE_MS";
/// Environment variable for [`LifecycleConfig::page_limit`].
pub const ENV_PAGE_LIMIT: &str = "REQUEST_PAGE_LIMIT";
/// Environment variable for [`LifecycleConfig::cursor_limit`].
pub const ENV_CURSOR_LIMIT: &str = "REQUEST_CURSOR_LIMIT";

/// Defaults shared by every controller an application creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LifecycleConfig {
    /// Retries after the first attempt
    pub retry: u32,
    /// Pause between attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Quiet period for debounced controllers in milliseconds
    pub debounce_ms: u64,
    /// Page size for offset pagination
    pub page_limit: u32,
    /// Page size for cursor pagination
    pub cursor_limit: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retry: 0,
            retry_delay_ms: 1000,
            debounce_ms: 300,
            page_limit: 10,
            cursor_limit: 20,
        }
    }
}

impl LifecycleConfig {
    /// Load defaults and apply any overrides found in the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable does not parse and
    /// [`ConfigError::Validation`] if the result fails [`Self::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`Self::from_env`] but reads variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = parse_var(&lookup, ENV_RETRY)? {
            config.retry = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_RETRY_DELAY_MS)? {
            config.retry_delay_ms = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_DEBOUNCE_MS)? {
            config.debounce_ms = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_PAGE_LIMIT)? {
            config.page_limit = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_CURSOR_LIMIT)? {
            config.cursor_limit = value;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns error if a page size is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_limit == 0 {
            return Err(ConfigError::Validation("page_limit must be > 0".to_string()));
        }
        if self.cursor_limit == 0 {
            return Err(ConfigError::Validation("cursor_limit must be > 0".to_string()));
        }
        Ok(())
    }

    /// Retry policy described by this configuration.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Debounce quiet period.
    #[must_use]
    pub const fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Executor options carrying this configuration's retry policy.
    #[must_use]
    pub fn executor_options<T>(&self) -> ExecutorOptions<T> {
        ExecutorOptions::default().with_retry_policy(self.retry_policy())
    }
}

fn parse_var<F, V>(lookup: &F, var: &str) -> Result<Option<V>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    V: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = LifecycleConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LifecycleConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn variables_override_defaults() {
        let config = LifecycleConfig::from_lookup(lookup(&[
            (ENV_RETRY, "2"),
            (ENV_RETRY_DELAY_MS, " 500 "),
            (ENV_PAGE_LIMIT, "25"),
        ]))
        .unwrap();

        assert_eq!(config.retry, 2);
        assert_eq!(config.retry_policy().delay, Duration::from_millis(500));
        assert_eq!(config.page_limit, 25);
        assert_eq!(config.executor_options::<()>().retry.max_attempts, 2);
    }

    #[test]
    fn unparsable_variable_is_rejected() {
        let error = LifecycleConfig::from_lookup(lookup(&[(ENV_RETRY, "-1")])).unwrap_err();
        assert_eq!(
            error,
            ConfigError::InvalidValue {
                var: ENV_RETRY.to_string(),
                value: "-1".to_string(),
            }
        );
    }

    #[test]
    fn zero_page_limit_fails_validation() {
        let error = LifecycleConfig::from_lookup(lookup(&[(ENV_PAGE_LIMIT, "0")])).unwrap_err();
        assert!(matches!(error, ConfigError::Validation(_)));
    }
}
