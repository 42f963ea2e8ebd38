//! Tracker configuration.

use std::time::Duration;

/// Configuration for tracker instances
///
/// # Example
///
/// ```
/// use quiescence_runtime::TrackerConfig;
/// use std::time::Duration;
///
/// let config = TrackerConfig::default()
///     .with_name("checkout")
///     .with_debounce(Duration::from_millis(5));
///
/// assert_eq!(config.name, "checkout");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Name used to label logs and metrics
    pub name: String,
    /// How long the outstanding count must stay at zero before notifying
    ///
    /// `Duration::ZERO` posts the check to the next scheduler turn.
    pub debounce: Duration,
}

impl TrackerConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub fn new(name: impl Into<String>, debounce: Duration) -> Self {
        Self {
            name: name.into(),
            debounce,
        }
    }

    /// Set the tracker name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the debounce delay
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Wait out the debounce delay
    pub(crate) async fn debounce(&self) {
        if self.debounce.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.debounce).await;
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            debounce: Duration::ZERO,
        }
    }
}
