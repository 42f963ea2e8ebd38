//! Prometheus metrics for observability and monitoring.
//!
//! Every tracker reports under its configured name:
//! - Intercepted actions
//! - Awaitables tracked and settled (by outcome)
//! - Outstanding awaitables
//! - Settle notifications and discarded stale timers
//!
//! # Example
//!
//! ```rust,no_run
//! use quiescence_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! // ... run trackers ...
//!
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use quiescence_core::Settlement;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge};

/// Actions passed through a tracker
pub const ACTIONS_INTERCEPTED: &str = "quiescence_actions_intercepted_total";
/// Awaitables observed in handler return values
pub const AWAITABLES_TRACKED: &str = "quiescence_awaitables_tracked_total";
/// Awaitables that fulfilled or rejected
pub const AWAITABLES_SETTLED: &str = "quiescence_awaitables_settled_total";
/// Awaitables currently outstanding
pub const OUTSTANDING: &str = "quiescence_outstanding";
/// Settle callbacks invoked
pub const NOTIFICATIONS: &str = "quiescence_notifications_total";
/// Debounce timers that expired after being superseded
pub const STALE_TIMERS: &str = "quiescence_stale_timers_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs the global recorder and renders the exposition text on demand.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves this recorder without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(ACTIONS_INTERCEPTED, "Total number of actions passed through a tracker");
    describe_counter!(
        AWAITABLES_TRACKED,
        "Total number of awaitables returned by the next handler"
    );
    describe_counter!(
        AWAITABLES_SETTLED,
        "Total number of tracked awaitables that settled, by outcome"
    );
    describe_gauge!(OUTSTANDING, "Number of tracked awaitables not yet settled");
    describe_counter!(NOTIFICATIONS, "Total number of settle callbacks invoked");
    describe_counter!(
        STALE_TIMERS,
        "Total number of debounce timers that expired after being superseded"
    );
}

pub(crate) fn record_intercepted(tracker: &str) {
    counter!(ACTIONS_INTERCEPTED, "tracker" => tracker.to_string()).increment(1);
}

pub(crate) fn record_tracked(tracker: &str, outstanding: usize) {
    counter!(AWAITABLES_TRACKED, "tracker" => tracker.to_string()).increment(1);
    record_outstanding(tracker, outstanding);
}

pub(crate) fn record_settled(tracker: &str, outcome: Settlement, outstanding: usize) {
    counter!(
        AWAITABLES_SETTLED,
        "tracker" => tracker.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    record_outstanding(tracker, outstanding);
}

pub(crate) fn record_notification(tracker: &str) {
    counter!(NOTIFICATIONS, "tracker" => tracker.to_string()).increment(1);
}

pub(crate) fn record_stale_timer(tracker: &str) {
    counter!(STALE_TIMERS, "tracker" => tracker.to_string()).increment(1);
}

// Note: Precision loss acceptable for metrics (outstanding counts < 2^52)
#[allow(clippy::cast_precision_loss)]
fn record_outstanding(tracker: &str, outstanding: usize) {
    gauge!(OUTSTANDING, "tracker" => tracker.to_string()).set(outstanding as f64);
}
