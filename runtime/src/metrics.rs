//! Prometheus metrics for request lifecycles.
//!
//! Controllers record counters through the `metrics` facade; nothing is
//! exported unless an application installs a recorder. [`MetricsRecorder`]
//! installs an in-process Prometheus recorder whose output can be rendered on
//! demand (for a debug panel or a log line).
//!
//! # Example
//!
//! ```rust,no_run
//! use request_lifecycle_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Calls started by `execute()`.
pub const EXECUTIONS_TOTAL: &str = "request_executions_total";
/// Retry attempts after a failed call.
pub const RETRIES_TOTAL: &str = "request_retries_total";
/// Settlements discarded because a newer generation exists.
pub const STALE_DISCARDED_TOTAL: &str = "request_stale_discarded_total";
/// Committed successes.
pub const SUCCEEDED_TOTAL: &str = "request_succeeded_total";
/// Committed final failures.
pub const FAILED_TOTAL: &str = "request_failed_total";
/// Explicit `cancel()` calls.
pub const CANCELLED_TOTAL: &str = "request_cancelled_total";
/// Time from `execute()` to a committed settlement.
pub const DURATION_SECONDS: &str = "request_duration_seconds";
/// Debounce timers that fired.
pub const DEBOUNCE_FIRED_TOTAL: &str = "debounce_fired_total";
/// Debounce timers cancelled by a newer call.
pub const DEBOUNCE_SUPERSEDED_TOTAL: &str = "debounce_superseded_total";

/// Errors raised while installing the Prometheus recorder.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The duration histogram buckets were rejected
    #[error("Invalid histogram buckets: {0}")]
    Buckets(String),
    /// The global recorder could not be set
    #[error("Could not install request metrics recorder: {0}")]
    Install(String),
}

/// Histogram buckets for [`DURATION_SECONDS`], in seconds.
const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// In-process Prometheus recorder.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Recorder that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe every request metric and install the global recorder.
    ///
    /// When another recorder already owns the global slot, this one stays
    /// uninstalled and [`Self::render`] returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Buckets`] if the histogram buckets are invalid
    /// and [`MetricsError::Install`] for any other installation failure.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(DURATION_SECONDS.to_string()),
                DURATION_BUCKETS,
            )
            .map_err(|error| MetricsError::Buckets(error.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("Request metrics recorder installed");
                self.handle = Some(handle);
                Ok(())
            }
            Err(BuildError::FailedToSetGlobalRecorder(_)) => {
                tracing::warn!("A metrics recorder is already installed; request metrics go there");
                Ok(())
            }
            Err(error) => Err(MetricsError::Install(error.to_string())),
        }
    }

    /// Handle of the installed recorder.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Current metrics in Prometheus text format, if this instance installed
    /// the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(EXECUTIONS_TOTAL, "Total number of request executions started");
    describe_counter!(RETRIES_TOTAL, "Total number of retry attempts");
    describe_counter!(
        STALE_DISCARDED_TOTAL,
        "Total number of settlements discarded because the call was superseded or cancelled"
    );
    describe_counter!(SUCCEEDED_TOTAL, "Total number of committed successes");
    describe_counter!(FAILED_TOTAL, "Total number of committed failures");
    describe_counter!(CANCELLED_TOTAL, "Total number of explicit cancellations");
    describe_histogram!(
        DURATION_SECONDS,
        "Time from execute() to a committed settlement"
    );
    describe_counter!(DEBOUNCE_FIRED_TOTAL, "Total number of debounce timers that fired");
    describe_counter!(
        DEBOUNCE_SUPERSEDED_TOTAL,
        "Total number of debounce timers replaced before firing"
    );
}
