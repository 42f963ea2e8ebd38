//! # Quiescence Testing
//!
//! Testing utilities and helpers for settle trackers.
//!
//! This crate provides:
//! - `TestStore`: A state reader that counts how often it is read
//! - `ManualAwaitable`: An awaitable settled by hand, synchronously
//! - `ScriptedDispatcher`: A next handler returning queued values in order
//! - `SettleRecorder`: Captures settle callback invocations
//!
//! ## Example
//!
//! ```ignore
//! use quiescence_runtime::{Dispatch, PendingTracker};
//! use quiescence_testing::{ManualAwaitable, SettleRecorder, TestStore, flush_turns};
//!
//! #[tokio::test]
//! async fn settles_after_fulfillment() {
//!     let recorder = SettleRecorder::new();
//!     let store = TestStore::new("idle");
//!     let awaitable = ManualAwaitable::new();
//!
//!     let tracker = PendingTracker::new(recorder.callback()).attach(store.clone())?;
//!     let next = |_: ()| Some(awaitable.clone());
//!     tracker.intercept(&next, ());
//!
//!     flush_turns().await;
//!     assert_eq!(recorder.count(), 0);
//!
//!     awaitable.fulfill();
//!     flush_turns().await;
//!     assert_eq!(recorder.count(), 1);
//! }
//! ```

use quiescence_core::{Continuation, Dispatch, MaybeThenable, StateReader, Thenable};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Mock implementations of the tracker's collaborators
pub mod mocks {
    use super::{
        Arc, AtomicUsize, Continuation, Dispatch, MaybeThenable, Mutex, MutexGuard, Ordering,
        PoisonError, RwLock, StateReader, Thenable, VecDeque,
    };

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// In-memory store facade
    ///
    /// Clones share the same state. Every `get_state` call is counted so
    /// tests can check the tracker reads state lazily.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_core::StateReader;
    /// use quiescence_testing::TestStore;
    ///
    /// let store = TestStore::new(1);
    /// store.set(2);
    /// assert_eq!(store.get_state(), 2);
    /// assert_eq!(store.reads(), 1);
    /// ```
    #[derive(Debug)]
    pub struct TestStore<S> {
        state: Arc<RwLock<S>>,
        reads: Arc<AtomicUsize>,
    }

    impl<S> TestStore<S> {
        /// Create a store holding `state`
        #[must_use]
        pub fn new(state: S) -> Self {
            Self {
                state: Arc::new(RwLock::new(state)),
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Replace the state
        pub fn set(&self, state: S) {
            *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
        }

        /// Mutate the state in place
        pub fn update(&self, f: impl FnOnce(&mut S)) {
            f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner));
        }

        /// Number of times the state was read through [`StateReader`]
        #[must_use]
        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl<S: Clone> TestStore<S> {
        /// Clone the current state without counting a read
        #[must_use]
        pub fn snapshot(&self) -> S {
            self.state
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl<S> Clone for TestStore<S> {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reads: Arc::clone(&self.reads),
            }
        }
    }

    impl<S> StateReader for TestStore<S>
    where
        S: Clone + Send + Sync,
    {
        type State = S;

        fn get_state(&self) -> S {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.snapshot()
        }
    }

    /// An awaitable that settles only when the test says so
    ///
    /// Continuations run synchronously on the calling thread, which makes
    /// settlement order fully deterministic.
    #[derive(Clone, Default)]
    pub struct ManualAwaitable {
        continuations: Arc<Mutex<Vec<(Continuation, Continuation)>>>,
        registrations: Arc<AtomicUsize>,
    }

    impl ManualAwaitable {
        /// Create an unsettled awaitable
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// How many observers registered continuations
        #[must_use]
        pub fn registrations(&self) -> usize {
            self.registrations.load(Ordering::SeqCst)
        }

        /// Run every pending fulfillment continuation
        ///
        /// Returns how many ran.
        pub fn fulfill(&self) -> usize {
            let pending = self.drain();
            let ran = pending.len();
            for (on_fulfilled, _) in pending {
                on_fulfilled();
            }
            ran
        }

        /// Run every pending rejection continuation
        ///
        /// Returns how many ran.
        pub fn reject(&self) -> usize {
            let pending = self.drain();
            let ran = pending.len();
            for (_, on_rejected) in pending {
                on_rejected();
            }
            ran
        }

        fn drain(&self) -> Vec<(Continuation, Continuation)> {
            std::mem::take(&mut *lock(&self.continuations))
        }
    }

    impl Thenable for ManualAwaitable {
        fn then(&self, on_fulfilled: Continuation, on_rejected: Continuation) {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            lock(&self.continuations).push((on_fulfilled, on_rejected));
        }
    }

    impl MaybeThenable for ManualAwaitable {
        fn as_thenable(&self) -> Option<&dyn Thenable> {
            Some(self)
        }
    }

    impl std::fmt::Debug for ManualAwaitable {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ManualAwaitable")
                .field("registrations", &self.registrations())
                .field("pending", &lock(&self.continuations).len())
                .finish()
        }
    }

    /// A next handler that returns queued values in order
    ///
    /// Once the queue is exhausted it returns `V::default()`. Every action
    /// received is recorded.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_core::Dispatch;
    /// use quiescence_testing::ScriptedDispatcher;
    ///
    /// let next = ScriptedDispatcher::new([Some(1), Some(2)]);
    /// assert_eq!(next.dispatch("a"), Some(1));
    /// assert_eq!(next.dispatch("b"), Some(2));
    /// assert_eq!(next.dispatch("c"), None);
    /// assert_eq!(next.received(), vec!["a", "b", "c"]);
    /// ```
    #[derive(Debug)]
    pub struct ScriptedDispatcher<A, V> {
        returns: Mutex<VecDeque<V>>,
        received: Mutex<Vec<A>>,
    }

    impl<A, V> ScriptedDispatcher<A, V> {
        /// Queue the values to return, in order
        pub fn new(returns: impl IntoIterator<Item = V>) -> Self {
            Self {
                returns: Mutex::new(returns.into_iter().collect()),
                received: Mutex::new(Vec::new()),
            }
        }

        /// Number of actions received
        #[must_use]
        pub fn calls(&self) -> usize {
            lock(&self.received).len()
        }
    }

    impl<A: Clone, V> ScriptedDispatcher<A, V> {
        /// Actions received so far, in order
        #[must_use]
        pub fn received(&self) -> Vec<A> {
            lock(&self.received).clone()
        }
    }

    impl<A, V: Default> Dispatch<A> for ScriptedDispatcher<A, V> {
        type Output = V;

        fn dispatch(&self, action: A) -> V {
            lock(&self.received).push(action);
            lock(&self.returns).pop_front().unwrap_or_default()
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use super::{Arc, Mutex, PoisonError};

    /// Scheduler turns run by [`flush_turns`]
    pub const FLUSH_TURNS: usize = 32;

    /// One recorded settle callback invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Notification<S> {
        /// State snapshot passed to the callback
        pub state: S,
        /// The awaited flag, when recorded through [`SettleRecorder::flagged_callback`]
        pub ever_awaited: Option<bool>,
    }

    /// Captures settle callback invocations
    ///
    /// Clones share the same record.
    #[derive(Debug)]
    pub struct SettleRecorder<S> {
        calls: Arc<Mutex<Vec<Notification<S>>>>,
    }

    impl<S: Send + 'static> SettleRecorder<S> {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// A callback for `PendingTracker::new`
        pub fn callback(&self) -> impl Fn(S) + Send + Sync + 'static + use<S> {
            let calls = Arc::clone(&self.calls);
            move |state| {
                calls
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(Notification {
                        state,
                        ever_awaited: None,
                    });
            }
        }

        /// A callback for `PendingTracker::with_flag`
        pub fn flagged_callback(&self) -> impl Fn(S, bool) + Send + Sync + 'static + use<S> {
            let calls = Arc::clone(&self.calls);
            move |state, ever_awaited| {
                calls
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(Notification {
                        state,
                        ever_awaited: Some(ever_awaited),
                    });
            }
        }

        /// Number of invocations so far
        #[must_use]
        pub fn count(&self) -> usize {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }
    }

    impl<S: Clone> SettleRecorder<S> {
        /// Every invocation so far, in order
        #[must_use]
        pub fn calls(&self) -> Vec<Notification<S>> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// The most recent invocation
        #[must_use]
        pub fn last(&self) -> Option<Notification<S>> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last()
                .cloned()
        }
    }

    impl<S: Send + 'static> Default for SettleRecorder<S> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<S> Clone for SettleRecorder<S> {
        fn clone(&self) -> Self {
            Self {
                calls: Arc::clone(&self.calls),
            }
        }
    }

    /// Let the current-thread scheduler run every task that is ready
    ///
    /// Enough turns for a settlement to propagate through a watcher task
    /// and a zero-delay settle check.
    pub async fn flush_turns() {
        for _ in 0..FLUSH_TURNS {
            tokio::task::yield_now().await;
        }
    }

    /// Install a test-friendly tracing subscriber (honours `RUST_LOG`)
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::{Notification, SettleRecorder, flush_turns, init_tracing};
pub use mocks::{ManualAwaitable, ScriptedDispatcher, TestStore};

#[cfg(test)]
mod tests {
    use super::*;
    use quiescence_core::Dispatch;

    #[test]
    fn store_counts_reads_but_not_snapshots() {
        let store = TestStore::new(vec![1]);
        store.update(|s| s.push(2));

        assert_eq!(store.snapshot(), vec![1, 2]);
        assert_eq!(store.reads(), 0);
        assert_eq!(store.clone().get_state(), vec![1, 2]);
        assert_eq!(store.reads(), 1);
    }

    #[test]
    fn manual_awaitable_runs_one_side() {
        let awaitable = ManualAwaitable::new();
        let fulfilled = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));

        let (f, r) = (Arc::clone(&fulfilled), Arc::clone(&rejected));
        awaitable.then(
            Box::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            }),
            Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(awaitable.registrations(), 1);
        assert_eq!(awaitable.reject(), 1);
        assert_eq!(awaitable.fulfill(), 0);
        assert_eq!(fulfilled.load(Ordering::SeqCst), 0);
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scripted_dispatcher_falls_back_to_default() {
        let next: ScriptedDispatcher<u8, u8> = ScriptedDispatcher::new([9]);
        assert_eq!(next.dispatch(1), 9);
        assert_eq!(next.dispatch(2), 0);
        assert_eq!(next.calls(), 2);
    }

    #[test]
    fn recorder_keeps_order_and_flags() {
        let recorder = SettleRecorder::new();
        recorder.callback()("first");
        recorder.flagged_callback()("second", true);

        assert_eq!(recorder.count(), 2);
        assert_eq!(recorder.calls()[0].ever_awaited, None);
        assert_eq!(
            recorder.last(),
            Some(Notification {
                state: "second",
                ever_awaited: Some(true)
            })
        );
    }
}
