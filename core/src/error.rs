//! Error types for request functions and configuration.

use thiserror::Error;

/// Fallback message for rejections that carry no message.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Fallback message used by the debounced async controller.
pub const OPERATION_FAILED: &str = "Operation failed";

/// Why a request did not produce data.
///
/// Request functions reject with `Failed` when they have an error message to
/// show, or `NonError` when the failure has no meaningful message. The
/// controllers turn either into a `String` on `RequestState::error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Error-like rejection carrying a message
    #[error("{0}")]
    Failed(String),

    /// Rejection without an error message
    #[error("request rejected without an error value")]
    NonError,

    /// The request task ended without settling (it panicked or was aborted)
    #[error("request task ended abnormally: {0}")]
    Task(String),
}

impl RequestError {
    /// Build a `Failed` rejection from anything displayable.
    #[must_use]
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }

    /// Message to store on the request state.
    ///
    /// `Failed` keeps its own message (even if empty); every other variant
    /// becomes `fallback`.
    #[must_use]
    pub fn message_or(&self, fallback: &str) -> String {
        match self {
            Self::Failed(message) => message.clone(),
            Self::NonError | Self::Task(_) => fallback.to_string(),
        }
    }
}

impl From<anyhow::Error> for RequestError {
    fn from(error: anyhow::Error) -> Self {
        Self::Failed(error.to_string())
    }
}

impl From<String> for RequestError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for RequestError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

/// Errors raised while loading or validating [`crate::config::LifecycleConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidValue {
        /// Variable name
        var: String,
        /// Raw value found
        value: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn failed_keeps_its_message() {
        let error = RequestError::failed("Network down");
        assert_eq!(error.message_or(UNKNOWN_ERROR), "Network down");
        assert_eq!(error.to_string(), "Network down");
    }

    #[test]
    fn non_error_uses_fallback() {
        assert_eq!(RequestError::NonError.message_or(UNKNOWN_ERROR), "Unknown error");
        assert_eq!(
            RequestError::NonError.message_or(OPERATION_FAILED),
            "Operation failed"
        );
    }

    #[test]
    fn anyhow_errors_become_failed() {
        let error: RequestError = anyhow::anyhow!("timeout after 30s").into();
        assert_eq!(error, RequestError::Failed("timeout after 30s".to_string()));
    }

    proptest! {
        #[test]
        fn failed_message_is_never_replaced(message in ".*") {
            let error = RequestError::Failed(message.clone());
            prop_assert_eq!(error.message_or(UNKNOWN_ERROR), message);
        }
    }
}
