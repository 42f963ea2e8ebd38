//! # Quiescence Core
//!
//! Capability traits for the Quiescence settle tracker.
//!
//! This crate describes the seams between a host store, its dispatch
//! pipeline and the tracker that sits inside that pipeline. It contains no
//! scheduling logic of its own; the counting state machine lives in
//! `quiescence-runtime`.
//!
//! ## Core Concepts
//!
//! - **Dispatch**: The next handler in the pipeline, `action → value`
//! - **`StateReader`**: The store facade, a zero-argument state snapshot accessor
//! - **Thenable**: A value exposing a continuation registration capability
//! - **`MaybeThenable`**: The boundary check that classifies a handler's return value
//! - **Promise**: A multi-consumer awaitable with an external `Resolver`
//!
//! ## Example
//!
//! ```
//! use quiescence_core::{MaybeAwaitable, MaybeThenable, Promise};
//!
//! let plain: MaybeAwaitable<u32, Promise<u32, String>> = MaybeAwaitable::Plain(7);
//! assert!(!plain.is_awaitable());
//!
//! let (_resolver, promise) = Promise::<u32, String>::channel();
//! let pending: MaybeAwaitable<u32, _> = MaybeAwaitable::Awaitable(promise);
//! assert!(pending.is_awaitable());
//! ```

/// Awaitable detection and continuation registration
pub mod thenable;

/// Multi-consumer promise awaitable
pub mod promise;

pub use dispatch::Dispatch;
pub use promise::{Promise, Resolver};
pub use state::StateReader;
pub use thenable::{Continuation, MaybeAwaitable, MaybeThenable, Settlement, Thenable};

/// Dispatch module - The "next handler" abstraction
///
/// A dispatch pipeline is a chain of handlers, each receiving an action and
/// producing a value. Interceptors wrap a `Dispatch` and are themselves a
/// `Dispatch`, so they stack.
pub mod dispatch {
    /// A handler that accepts an action and synchronously returns a value
    ///
    /// Implemented for every `Fn(A) -> V` closure, so plain functions can be
    /// used as the innermost handler of a pipeline.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_core::Dispatch;
    ///
    /// let double = |n: u32| n * 2;
    /// assert_eq!(double.dispatch(21), 42);
    /// ```
    pub trait Dispatch<A> {
        /// The value produced for each action
        type Output;

        /// Handle an action and return the handler's value
        fn dispatch(&self, action: A) -> Self::Output;
    }

    impl<A, V, F> Dispatch<A> for F
    where
        F: Fn(A) -> V,
    {
        type Output = V;

        fn dispatch(&self, action: A) -> V {
            self(action)
        }
    }
}

/// State module - The store facade required by the tracker
pub mod state {
    /// Read-only access to the host store's current state
    ///
    /// The tracker calls `get_state` lazily, at notification time, so the
    /// snapshot reflects the state after everything settled rather than the
    /// state at attachment.
    ///
    /// Implemented for every `Fn() -> S + Send + Sync` closure.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_core::StateReader;
    /// use std::sync::{Arc, RwLock};
    ///
    /// let state = Arc::new(RwLock::new(3_u32));
    /// let reader = {
    ///     let state = Arc::clone(&state);
    ///     move || state.read().map(|s| *s).unwrap_or_default()
    /// };
    ///
    /// *state.write().unwrap() = 4;
    /// assert_eq!(reader.get_state(), 4);
    /// ```
    pub trait StateReader: Send + Sync {
        /// Snapshot type handed to the settle callback
        type State;

        /// Produce the current state snapshot
        fn get_state(&self) -> Self::State;
    }

    impl<S, F> StateReader for F
    where
        F: Fn() -> S + Send + Sync,
    {
        type State = S;

        fn get_state(&self) -> S {
            self()
        }
    }
}
