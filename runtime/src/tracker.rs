//! The settle tracking state machine.
//!
//! Attachment follows the usual three-stage middleware shape:
//!
//! 1. [`PendingTracker::new`] captures the settle callback
//! 2. [`PendingTracker::attach`] binds it to a store's state reader, yielding a [`Tracker`]
//! 3. [`Tracker::wrap`] binds the tracker to the next handler, yielding an [`Interceptor`]
//!
//! # Debounce
//!
//! Every observation (an ordinary value, a new awaitable, a settlement) cancels
//! the pending settle check and posts a new one. When a check fires it only
//! notifies if no awaitable is outstanding, so a burst of activity within one
//! scheduler turn collapses into a single notification.

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::metrics;
use crate::signal::SettleHandle;
use quiescence_core::{Continuation, Dispatch, MaybeThenable, Settlement, StateReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Type alias for the settle callback
///
/// Receives the state snapshot and whether any awaitable was observed since
/// the previous notification.
type SettledCallback<S> = dyn Fn(S, bool) + Send + Sync;

/// Create a tracker factory from a settle callback
///
/// Shorthand for [`PendingTracker::new`].
pub fn create_tracker<S, F>(on_settled: F) -> PendingTracker<S>
where
    F: Fn(S) + Send + Sync + 'static,
    S: 'static,
{
    PendingTracker::new(on_settled)
}

/// Tracker factory - the settle callback plus configuration
///
/// One factory can be attached to any number of stores; each attachment
/// gets its own independent count and timer.
pub struct PendingTracker<S> {
    on_settled: Arc<SettledCallback<S>>,
    config: TrackerConfig,
}

impl<S: 'static> PendingTracker<S> {
    /// Create a factory whose callback receives the settled state
    #[must_use]
    pub fn new<F>(on_settled: F) -> Self
    where
        F: Fn(S) + Send + Sync + 'static,
    {
        Self::with_flag(move |state, _| on_settled(state))
    }

    /// Create a factory whose callback also receives the "awaited" flag
    ///
    /// The flag is `true` when at least one awaitable (fulfilled or rejected)
    /// was observed since the previous notification.
    #[must_use]
    pub fn with_flag<F>(on_settled: F) -> Self
    where
        F: Fn(S, bool) + Send + Sync + 'static,
    {
        Self {
            on_settled: Arc::new(on_settled),
            config: TrackerConfig::default(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// The configuration new attachments will use
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Attach to a store
    ///
    /// `store` is read lazily, once per notification. A settle check is
    /// posted immediately, so a store that never dispatches still receives
    /// exactly one notification on the next scheduler turn.
    ///
    /// # Runtime flavor
    ///
    /// A zero debounce posts the settle check to the next scheduler turn,
    /// which only coalesces a synchronous burst of dispatches on a
    /// current-thread runtime. On a multi-thread runtime another worker can
    /// run the check in the middle of the burst, so a non-zero
    /// [`TrackerConfig::debounce`] is required there.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::NoRuntime`]: called outside a Tokio runtime
    /// - [`TrackerError::ZeroDebounce`]: the current runtime is multi-threaded
    ///   and the configured debounce is zero
    #[tracing::instrument(skip_all, fields(tracker = %self.config.name))]
    pub fn attach<R>(&self, store: R) -> Result<Tracker<S>, TrackerError>
    where
        R: StateReader<State = S> + 'static,
    {
        let runtime = Handle::try_current()?;
        if runtime.runtime_flavor() != RuntimeFlavor::CurrentThread
            && self.config.debounce.is_zero()
        {
            return Err(TrackerError::ZeroDebounce);
        }
        let (notifications, _) = watch::channel(0);

        let tracker = Tracker {
            shared: Arc::new(Shared {
                state: Mutex::new(TrackerState::default()),
                reader: Box::new(store),
                on_settled: Arc::clone(&self.on_settled),
                config: self.config.clone(),
                runtime,
                notifications,
            }),
        };

        tracing::debug!(debounce = ?self.config.debounce, "Attached settle tracker");
        tracker.shared.check_settled();

        Ok(tracker)
    }
}

impl<S> std::fmt::Debug for PendingTracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTracker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One attachment of a settle tracker to a store
///
/// Cheap to clone; clones share the same count and timer.
pub struct Tracker<S> {
    shared: Arc<Shared<S>>,
}

impl<S: 'static> Tracker<S> {
    /// Forward an action and track the handler's return value
    ///
    /// The value is returned exactly as the handler produced it. Panics in
    /// `forward` propagate to the caller with the tracker left untouched.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use quiescence_runtime::PendingTracker;
    /// # async fn example() -> Result<(), quiescence_runtime::TrackerError> {
    /// let tracker = PendingTracker::new(|_: ()| {}).attach(|| ())?;
    /// let next = |n: u32| n + 1;
    ///
    /// assert_eq!(tracker.intercept(&next, 1), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub fn intercept<A, F>(&self, forward: &F, action: A) -> F::Output
    where
        F: Dispatch<A> + ?Sized,
        F::Output: MaybeThenable,
    {
        let value = forward.dispatch(action);
        self.shared.observe(&value);
        value
    }

    /// Wrap a next handler, producing a pipeline stage
    #[must_use]
    pub fn wrap<F>(&self, forward: F) -> Interceptor<F, S> {
        Interceptor {
            tracker: self.clone(),
            forward,
        }
    }

    /// Subscribe to settle notifications issued after this call
    #[must_use]
    pub fn subscribe(&self) -> SettleHandle {
        SettleHandle::new(self.shared.notifications.subscribe())
    }

    /// Number of awaitables observed but not yet settled
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.shared.lock().outstanding
    }

    /// Number of settle notifications issued so far
    #[must_use]
    pub fn notifications(&self) -> u64 {
        *self.shared.notifications.borrow()
    }

    /// Name used in logs and metrics
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }
}

impl<S> Clone for Tracker<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> std::fmt::Debug for Tracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Tracker")
            .field("name", &self.shared.config.name)
            .field("outstanding", &state.outstanding)
            .field("ever_awaited", &state.ever_awaited)
            .field("timer_armed", &state.pending_timer.is_some())
            .finish_non_exhaustive()
    }
}

/// A tracker wrapped around the next handler
///
/// Implements [`Dispatch`], so interceptors can be wrapped by further
/// middleware.
pub struct Interceptor<F, S> {
    tracker: Tracker<S>,
    forward: F,
}

impl<F, S> Interceptor<F, S> {
    /// The tracker this interceptor reports to
    #[must_use]
    pub const fn tracker(&self) -> &Tracker<S> {
        &self.tracker
    }

    /// Unwrap the next handler
    #[must_use]
    pub fn into_inner(self) -> F {
        self.forward
    }
}

impl<A, F, S> Dispatch<A> for Interceptor<F, S>
where
    F: Dispatch<A>,
    F::Output: MaybeThenable,
    S: 'static,
{
    type Output = F::Output;

    fn dispatch(&self, action: A) -> F::Output {
        self.tracker.intercept(&self.forward, action)
    }
}

impl<F, S> std::fmt::Debug for Interceptor<F, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

/// Internal: State shared between a tracker's handles, timers and continuations
struct Shared<S> {
    state: Mutex<TrackerState>,
    reader: Box<dyn StateReader<State = S>>,
    on_settled: Arc<SettledCallback<S>>,
    config: TrackerConfig,
    runtime: Handle,
    notifications: watch::Sender<u64>,
}

impl<S> Shared<S> {
    /// Poisoning cannot leave `TrackerState` half-updated, so recover the guard
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: 'static> Shared<S> {
    /// Classify a handler value and track it if it is awaitable
    fn observe<V>(self: &Arc<Self>, value: &V)
    where
        V: MaybeThenable + ?Sized,
    {
        let name = &self.config.name;
        metrics::record_intercepted(name);

        if let Some(thenable) = value.as_thenable() {
            let outstanding = {
                let mut state = self.lock();
                state.begin();
                state.outstanding
            };
            metrics::record_tracked(name, outstanding);
            tracing::trace!(tracker = %name, outstanding, "Tracking awaitable");

            // One registration settles at most once, whichever continuation runs
            let settled = Arc::new(AtomicBool::new(false));
            let on_fulfilled = self.continuation(Settlement::Fulfilled, &settled);
            let on_rejected = self.continuation(Settlement::Rejected, &settled);

            // Awaitables may spawn watcher tasks; give them the tracker's runtime
            let _runtime = self.runtime.enter();
            thenable.then(on_fulfilled, on_rejected);
        } else {
            tracing::trace!(tracker = %name, "Ordinary value");
        }

        self.check_settled();
    }

    /// Build a continuation that records a settlement
    ///
    /// Holds the tracker weakly so never-settling awaitables don't keep a
    /// dropped tracker alive. Continuations sharing `settled` decrement the
    /// count at most once between them.
    fn continuation(
        self: &Arc<Self>,
        outcome: Settlement,
        settled: &Arc<AtomicBool>,
    ) -> Continuation {
        let shared = Arc::downgrade(self);
        let settled = Arc::clone(settled);
        Box::new(move || {
            if settled.swap(true, Ordering::AcqRel) {
                tracing::trace!(%outcome, "Ignored repeated settlement");
                return;
            }
            if let Some(shared) = Weak::upgrade(&shared) {
                shared.settle(outcome);
            }
        })
    }

    fn settle(self: &Arc<Self>, outcome: Settlement) {
        let outstanding = {
            let mut state = self.lock();
            state.finish();
            state.outstanding
        };
        metrics::record_settled(&self.config.name, outcome, outstanding);
        tracing::trace!(tracker = %self.config.name, %outcome, outstanding, "Awaitable settled");

        self.check_settled();
    }

    /// Cancel the pending settle check and post a new one
    fn check_settled(self: &Arc<Self>) {
        let mut state = self.lock();
        let generation = state.rearm();

        let shared = Arc::clone(self);
        state.pending_timer = Some(self.runtime.spawn(async move {
            shared.config.debounce().await;
            shared.expire(generation);
        }));
    }

    fn expire(&self, generation: u64) {
        // The lock is released before the callback so it may dispatch again
        let expiry = self.lock().expire(generation);

        match expiry {
            Expiry::Stale => {
                metrics::record_stale_timer(&self.config.name);
                tracing::trace!(tracker = %self.config.name, generation, "Discarded stale settle check");
            }
            Expiry::Pending(outstanding) => {
                tracing::trace!(
                    tracker = %self.config.name,
                    outstanding,
                    "Settle check found outstanding awaitables"
                );
            }
            Expiry::Settled { ever_awaited } => self.notify(ever_awaited),
        }
    }

    fn notify(&self, ever_awaited: bool) {
        let snapshot = self.reader.get_state();
        (self.on_settled)(snapshot, ever_awaited);

        self.notifications.send_modify(|count| *count += 1);
        metrics::record_notification(&self.config.name);
        tracing::debug!(tracker = %self.config.name, ever_awaited, "Settled");
    }
}

/// Internal: Outcome of a settle check when its timer expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    /// A newer check was armed after this one
    Stale,

    /// Awaitables are still outstanding; a later settlement re-arms
    Pending(usize),

    /// Nothing outstanding: notify
    Settled {
        /// Whether any awaitable was observed this cycle
        ever_awaited: bool,
    },
}

/// Internal: The counting state of one attachment
///
/// Only the most recently armed timer, identified by `generation`, may
/// notify.
#[derive(Debug, Default)]
struct TrackerState {
    outstanding: usize,
    ever_awaited: bool,
    generation: u64,
    pending_timer: Option<JoinHandle<()>>,
}

impl TrackerState {
    /// An awaitable was observed
    const fn begin(&mut self) {
        self.outstanding += 1;
        self.ever_awaited = true;
    }

    /// An awaitable settled
    const fn finish(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Abort the pending timer and return the generation for its replacement
    fn rearm(&mut self) -> u64 {
        if let Some(timer) = self.pending_timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    /// Resolve an expired timer
    fn expire(&mut self, generation: u64) -> Expiry {
        if generation != self.generation {
            return Expiry::Stale;
        }
        self.pending_timer = None;

        if self.outstanding >= 1 {
            return Expiry::Pending(self.outstanding);
        }
        Expiry::Settled {
            ever_awaited: std::mem::take(&mut self.ever_awaited),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn count_never_goes_negative() {
        let mut state = TrackerState::default();
        state.finish();
        assert_eq!(state.outstanding, 0);

        state.begin();
        state.finish();
        state.finish();
        assert_eq!(state.outstanding, 0);
    }

    #[test]
    fn only_latest_generation_expires() {
        let mut state = TrackerState::default();
        let first = state.rearm();
        let second = state.rearm();

        assert_eq!(state.expire(first), Expiry::Stale);
        assert_eq!(
            state.expire(second),
            Expiry::Settled {
                ever_awaited: false
            }
        );
    }

    #[test]
    fn outstanding_awaitables_block_notification() {
        let mut state = TrackerState::default();
        state.begin();
        state.begin();
        let generation = state.rearm();

        assert_eq!(state.expire(generation), Expiry::Pending(2));
    }

    #[test]
    fn awaited_flag_resets_after_notification() {
        let mut state = TrackerState::default();
        state.begin();
        state.finish();

        let generation = state.rearm();
        assert_eq!(
            state.expire(generation),
            Expiry::Settled { ever_awaited: true }
        );

        let generation = state.rearm();
        assert_eq!(
            state.expire(generation),
            Expiry::Settled {
                ever_awaited: false
            }
        );
    }

    #[tokio::test]
    async fn attach_requires_nothing_but_a_runtime() {
        let tracker = PendingTracker::new(|_: u8| {}).attach(|| 0_u8);
        assert!(tracker.is_ok());
    }

    #[tokio::test]
    async fn shorthand_factory_and_unwrapped_handler() {
        let tracker = create_tracker(|_: u8| {}).attach(|| 0_u8);
        assert!(tracker.is_ok());

        if let Ok(tracker) = tracker {
            assert_eq!(tracker.name(), "default");

            let interceptor = tracker.wrap(|n: u8| n + 1);
            assert_eq!(interceptor.dispatch(1), 2);
            assert_eq!(interceptor.tracker().outstanding(), 0);

            let next = interceptor.into_inner();
            assert_eq!(next(2), 3);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn multi_thread_runtime_needs_a_debounce() {
        let zero = PendingTracker::new(|_: u8| {}).attach(|| 0_u8);
        assert!(matches!(zero, Err(TrackerError::ZeroDebounce)));

        let debounced = PendingTracker::new(|_: u8| {})
            .with_config(TrackerConfig::default().with_debounce(Duration::from_millis(5)))
            .attach(|| 0_u8);
        assert!(debounced.is_ok());
    }

    #[test]
    fn attach_outside_runtime_fails() {
        let tracker = PendingTracker::new(|_: u8| {}).attach(|| 0_u8);
        assert!(matches!(tracker, Err(TrackerError::NoRuntime(_))));
    }
}
