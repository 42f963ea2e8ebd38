//! A cloneable, multi-consumer awaitable.
//!
//! `Promise` wraps a future producing `Result<T, E>` so that any number of
//! observers can wait for the same outcome: callers `.await` it directly,
//! while a settle tracker registers continuations through [`Thenable`].
//!
//! # Example
//!
//! ```
//! use quiescence_core::Promise;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (resolver, promise) = Promise::<u32, String>::channel();
//! let observer = promise.clone();
//!
//! resolver.resolve(7);
//!
//! assert_eq!(promise.await, Ok(7));
//! assert_eq!(observer.await, Ok(7));
//! # }
//! ```

use crate::thenable::{Continuation, MaybeThenable, Thenable};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// A shared handle to an in-flight operation
///
/// Cloning is cheap; every clone observes the same outcome.
pub struct Promise<T, E> {
    inner: Shared<BoxFuture<'static, Result<T, E>>>,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wrap a future as a promise
    ///
    /// The future is driven by whoever polls the promise or one of its
    /// clones; registering continuations through [`Thenable::then`] spawns
    /// such a poller.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// Create a promise settled by the returned [`Resolver`]
    ///
    /// If the resolver is dropped without settling, the promise stays
    /// pending forever.
    #[must_use]
    pub fn channel() -> (Resolver<T, E>, Self) {
        let (sender, receiver) = oneshot::channel();
        let promise = Self::new(async move {
            match receiver.await {
                Ok(outcome) => outcome,
                Err(_) => future::pending().await,
            }
        });
        (Resolver { sender }, promise)
    }

    /// An already-fulfilled promise
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self::new(future::ready(Ok(value)))
    }

    /// An already-rejected promise
    #[must_use]
    pub fn rejected(reason: E) -> Self {
        Self::new(future::ready(Err(reason)))
    }

    /// A promise that never settles
    #[must_use]
    pub fn never() -> Self {
        Self::new(future::pending())
    }

    /// The outcome, if the promise has already been driven to completion
    #[must_use]
    pub fn peek(&self) -> Option<&Result<T, E>> {
        self.inner.peek()
    }

    /// Whether the promise has settled
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Future for Promise<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<T, E> Thenable for Promise<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Spawn a watcher task that runs exactly one continuation on settlement
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime context.
    fn then(&self, on_fulfilled: Continuation, on_rejected: Continuation) {
        let outcome = self.inner.clone();
        tokio::spawn(async move {
            match outcome.await {
                Ok(_) => on_fulfilled(),
                Err(_) => on_rejected(),
            }
        });
    }
}

impl<T, E> MaybeThenable for Promise<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn as_thenable(&self) -> Option<&dyn Thenable> {
        Some(self)
    }
}

impl<T, E> fmt::Debug for Promise<T, E>
where
    T: Clone + fmt::Debug,
    E: Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.peek() {
            None => f.write_str("Promise(<pending>)"),
            Some(Ok(value)) => f.debug_tuple("Promise::Fulfilled").field(value).finish(),
            Some(Err(reason)) => f.debug_tuple("Promise::Rejected").field(reason).finish(),
        }
    }
}

/// The settling side of [`Promise::channel`]
pub struct Resolver<T, E> {
    sender: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Resolver<T, E> {
    /// Fulfill the promise with a value
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    /// Reject the promise with a reason
    pub fn reject(self, reason: E) {
        self.settle(Err(reason));
    }

    /// Settle the promise with an outcome
    ///
    /// Settling after every clone of the promise was dropped is a no-op.
    pub fn settle(self, outcome: Result<T, E>) {
        let _ = self.sender.send(outcome);
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}
