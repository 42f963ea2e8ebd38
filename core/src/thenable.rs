//! Awaitable detection.
//!
//! A handler's return value counts as awaitable when it exposes the
//! [`Thenable`] capability: a way to register one continuation for
//! fulfillment and one for rejection. Classification happens at the
//! boundary through [`MaybeThenable`], so any type can opt in without being
//! a specific concrete future type.

use std::fmt;
use std::sync::Arc;

/// A continuation registered on an awaitable
///
/// Continuations carry no payload: the settled value and the rejection
/// reason are never handed to the observer.
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// How an awaitable settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Settlement {
    /// The operation completed successfully
    Fulfilled,

    /// The operation failed
    Rejected,
}

impl Settlement {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-flight operation that accepts settlement continuations
///
/// Implementations must invoke at most one of the two continuations, once,
/// when the operation settles. Operations that never settle never invoke
/// either.
pub trait Thenable: Send + Sync {
    /// Register the fulfillment and rejection continuations
    fn then(&self, on_fulfilled: Continuation, on_rejected: Continuation);
}

impl<T> Thenable for Arc<T>
where
    T: Thenable + ?Sized,
{
    fn then(&self, on_fulfilled: Continuation, on_rejected: Continuation) {
        (**self).then(on_fulfilled, on_rejected);
    }
}

/// Classification of a handler's return value
///
/// Returns `Some` when the value carries the [`Thenable`] capability and
/// `None` for ordinary values.
///
/// Handlers returning their own types either declare them ordinary with
/// [`ordinary_values!`](crate::ordinary_values) or return
/// [`MaybeAwaitable::Plain`], which needs no impl at all.
///
/// # Example
///
/// ```
/// use quiescence_core::{MaybeThenable, Promise};
///
/// assert!(!42_u32.is_awaitable());
/// assert!(!None::<Promise<(), ()>>.is_awaitable());
/// assert!(Some(Promise::<(), ()>::resolved(())).is_awaitable());
/// ```
pub trait MaybeThenable {
    /// The continuation capability, if this value has one
    fn as_thenable(&self) -> Option<&dyn Thenable>;

    /// Whether this value is an awaitable
    fn is_awaitable(&self) -> bool {
        self.as_thenable().is_some()
    }
}

impl<T> MaybeThenable for Arc<T>
where
    T: Thenable + ?Sized,
{
    fn as_thenable(&self) -> Option<&dyn Thenable> {
        Some(self)
    }
}

impl<T: MaybeThenable> MaybeThenable for Option<T> {
    fn as_thenable(&self) -> Option<&dyn Thenable> {
        self.as_ref().and_then(MaybeThenable::as_thenable)
    }
}

impl<T: MaybeThenable, E> MaybeThenable for Result<T, E> {
    fn as_thenable(&self) -> Option<&dyn Thenable> {
        self.as_ref().ok().and_then(MaybeThenable::as_thenable)
    }
}

impl<T: MaybeThenable + ?Sized> MaybeThenable for Box<T> {
    fn as_thenable(&self) -> Option<&dyn Thenable> {
        (**self).as_thenable()
    }
}

/// Declare types as ordinary (never awaitable) handler values
///
/// # Example
///
/// ```
/// use quiescence_core::{MaybeThenable, ordinary_values};
///
/// struct Point {
///     x: i32,
/// }
///
/// ordinary_values!(Point);
///
/// let origin = Point { x: 0 };
/// assert!(!origin.is_awaitable());
/// assert_eq!(origin.x, 0);
/// ```
#[macro_export]
macro_rules! ordinary_values {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::MaybeThenable for $ty {
                fn as_thenable(&self) -> ::core::option::Option<&dyn $crate::Thenable> {
                    ::core::option::Option::None
                }
            }
        )*
    };
}

ordinary_values!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
    &'static str,
);

impl<T> MaybeThenable for Vec<T> {
    fn as_thenable(&self) -> Option<&dyn Thenable> {
        None
    }
}

/// Explicit union of "an awaitable" and "an ordinary value"
///
/// Handlers that sometimes start asynchronous work return this so the
/// classification is visible in the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaybeAwaitable<V, P> {
    /// An in-flight operation
    Awaitable(P),

    /// An ordinary value
    Plain(V),
}

impl<V, P> MaybeAwaitable<V, P> {
    /// The awaitable, if this is one
    #[must_use]
    pub const fn as_awaitable(&self) -> Option<&P> {
        match self {
            Self::Awaitable(awaitable) => Some(awaitable),
            Self::Plain(_) => None,
        }
    }

    /// The ordinary value, if this is one
    #[must_use]
    pub const fn as_plain(&self) -> Option<&V> {
        match self {
            Self::Awaitable(_) => None,
            Self::Plain(value) => Some(value),
        }
    }

    /// Consume into the ordinary value, if this is one
    #[must_use]
    pub fn into_plain(self) -> Option<V> {
        match self {
            Self::Awaitable(_) => None,
            Self::Plain(value) => Some(value),
        }
    }
}

impl<V: Default, P> Default for MaybeAwaitable<V, P> {
    fn default() -> Self {
        Self::Plain(V::default())
    }
}

impl<V, P: Thenable> MaybeThenable for MaybeAwaitable<V, P> {
    fn as_thenable(&self) -> Option<&dyn Thenable> {
        match self {
            Self::Awaitable(awaitable) => Some(awaitable),
            Self::Plain(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stores continuations without ever invoking them
    #[derive(Default)]
    struct Parked {
        registered: AtomicUsize,
        continuations: Mutex<Vec<(Continuation, Continuation)>>,
    }

    impl Thenable for Parked {
        fn then(&self, on_fulfilled: Continuation, on_rejected: Continuation) {
            self.registered.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut continuations) = self.continuations.lock() {
                continuations.push((on_fulfilled, on_rejected));
            }
        }
    }

    #[test]
    fn ordinary_values_are_not_awaitable() {
        assert!(!().is_awaitable());
        assert!(!"text".is_awaitable());
        assert!(!String::from("text").is_awaitable());
        assert!(!vec![1, 2, 3].is_awaitable());
        assert!(!None::<Arc<Parked>>.is_awaitable());
    }

    #[test]
    fn any_thenable_behind_arc_is_awaitable() {
        let parked: Arc<dyn Thenable> = Arc::new(Parked::default());
        assert!(parked.is_awaitable());
        assert!(Some(Arc::clone(&parked)).is_awaitable());
        assert!(Ok::<_, ()>(parked).is_awaitable());
    }

    #[test]
    fn errors_are_ordinary_values() {
        let value: Result<Arc<Parked>, &str> = Err("failed");
        assert!(!value.is_awaitable());
    }

    #[test]
    fn maybe_awaitable_classifies_by_variant() {
        let parked = Arc::new(Parked::default());
        let awaitable: MaybeAwaitable<u8, _> = MaybeAwaitable::Awaitable(Arc::clone(&parked));
        let plain: MaybeAwaitable<u8, Arc<Parked>> = MaybeAwaitable::Plain(3);

        assert!(awaitable.is_awaitable());
        assert!(!plain.is_awaitable());
        assert_eq!(plain.as_plain(), Some(&3));
        assert!(awaitable.as_plain().is_none());
        assert_eq!(MaybeAwaitable::<u8, Arc<Parked>>::default().into_plain(), Some(0));
    }

    #[test]
    fn registration_goes_through_the_capability() {
        let parked = Arc::new(Parked::default());
        let value = Some(Arc::clone(&parked));

        if let Some(thenable) = value.as_thenable() {
            thenable.then(Box::new(|| {}), Box::new(|| {}));
        }

        assert_eq!(parked.registered.load(Ordering::SeqCst), 1);
    }

    struct Coordinates {
        x: i32,
    }

    ordinary_values!(Coordinates);

    #[test]
    fn user_types_declared_ordinary_pass_through() {
        let value = Coordinates { x: 1 };
        assert!(!value.is_awaitable());
        assert_eq!(value.x, 1);
        assert!(!Some(Coordinates { x: 2 }).is_awaitable());
    }

    #[test]
    fn settlement_labels() {
        assert_eq!(Settlement::Fulfilled.to_string(), "fulfilled");
        assert_eq!(Settlement::Rejected.as_str(), "rejected");
    }
}
