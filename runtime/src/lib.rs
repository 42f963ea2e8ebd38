//! # Quiescence Runtime
//!
//! Debounced settle tracking for store dispatch pipelines.
//!
//! The tracker is a middleware: it forwards every action to the next handler
//! unchanged, counts the awaitables that handler returns, and invokes a
//! callback once every time the count drops back to zero and stays there for
//! one scheduler turn.
//!
//! ## Core Components
//!
//! - **`PendingTracker`**: The factory holding the settle callback and configuration
//! - **Tracker**: One attachment to a store; owns the outstanding count and debounce timer
//! - **Interceptor**: A tracker wrapped around a next handler, itself a `Dispatch`
//! - **`SettleHandle`**: An awaitable signal that resolves on settle notifications
//!
//! ## Example
//!
//! ```no_run
//! use quiescence_core::{Dispatch, MaybeAwaitable, Promise};
//! use quiescence_runtime::PendingTracker;
//!
//! # async fn example() -> Result<(), quiescence_runtime::TrackerError> {
//! let tracker = PendingTracker::new(|state: u32| println!("settled at {state}"))
//!     .attach(|| 42_u32)?;
//!
//! let pipeline = tracker.wrap(|action: &str| -> MaybeAwaitable<(), Promise<(), ()>> {
//!     match action {
//!         "load" => MaybeAwaitable::Awaitable(Promise::resolved(())),
//!         _ => MaybeAwaitable::Plain(()),
//!     }
//! });
//!
//! pipeline.dispatch("load");
//! pipeline.dispatch("render");
//!
//! tracker.subscribe().wait().await?;
//! # Ok(())
//! # }
//! ```

/// Tracker configuration
pub mod config;

/// Prometheus metrics for observability
pub mod metrics;

/// Settle notification signals
pub mod signal;

/// The settle tracking state machine
pub mod tracker;

pub use config::TrackerConfig;
pub use error::TrackerError;
pub use quiescence_core::{Dispatch, MaybeAwaitable, MaybeThenable, Promise, StateReader};
pub use signal::SettleHandle;
pub use tracker::{Interceptor, PendingTracker, Tracker, create_tracker};

/// Error types for the tracker runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur around a settle tracker
    ///
    /// The counting state machine itself has no failure modes; these cover
    /// attachment and waiting on settle signals.
    #[derive(Error, Debug)]
    pub enum TrackerError {
        /// The tracker was attached outside a Tokio runtime
        ///
        /// Settle checks are posted to the runtime that was current at
        /// attachment, so one must exist.
        #[error("No Tokio runtime available for settle checks: {0}")]
        NoRuntime(#[from] tokio::runtime::TryCurrentError),

        /// A zero debounce was configured on a multi-thread runtime
        ///
        /// Only a current-thread runtime coalesces a burst of dispatches
        /// within one scheduler turn.
        #[error("A multi-thread runtime requires a non-zero settle debounce")]
        ZeroDebounce,

        /// Timeout waiting for a settle notification
        #[error("Timeout waiting for settle notification")]
        Timeout,

        /// Every tracker behind a settle handle was dropped
        #[error("Tracker dropped before the next settle notification")]
        Closed,
    }
}
