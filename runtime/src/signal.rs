//! Settle notifications as awaitable signals.
//!
//! A [`SettleHandle`] is the future-shaped counterpart of the settle
//! callback: it resolves each time the tracker notifies.

use crate::error::TrackerError;
use futures::Stream;
use std::time::Duration;
use tokio::sync::watch;

/// Handle for waiting on settle notifications
///
/// Returned by [`Tracker::subscribe()`](crate::Tracker::subscribe). Only
/// notifications issued after the handle was created (or after the previous
/// successful wait) wake it.
///
/// # Example
///
/// ```ignore
/// let mut settled = tracker.subscribe();
/// pipeline.dispatch(Action::Load);
/// settled.wait_with_timeout(Duration::from_secs(5)).await?;
/// // Everything started by Action::Load has settled
/// ```
#[derive(Debug, Clone)]
pub struct SettleHandle {
    notifications: watch::Receiver<u64>,
}

impl SettleHandle {
    pub(crate) const fn new(notifications: watch::Receiver<u64>) -> Self {
        Self { notifications }
    }

    /// Wait for the next settle notification
    ///
    /// # Returns
    ///
    /// The total number of notifications the tracker has issued.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Closed`] if every handle to the tracker was
    /// dropped before it notified again.
    pub async fn wait(&mut self) -> Result<u64, TrackerError> {
        self.notifications
            .changed()
            .await
            .map_err(|_| TrackerError::Closed)?;
        Ok(*self.notifications.borrow_and_update())
    }

    /// Wait for the next settle notification with a timeout
    ///
    /// # Errors
    ///
    /// - [`TrackerError::Timeout`]: no notification arrived in time
    /// - [`TrackerError::Closed`]: the tracker was dropped
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<u64, TrackerError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| TrackerError::Timeout)?
    }

    /// Notifications issued so far, as last observed by this handle
    #[must_use]
    pub fn observed(&self) -> u64 {
        *self.notifications.borrow()
    }

    /// Turn the handle into a stream of notification counts
    ///
    /// The stream ends when the tracker is dropped.
    pub fn into_stream(self) -> impl Stream<Item = u64> {
        futures::stream::unfold(self, |mut handle| async move {
            handle.wait().await.ok().map(|count| (count, handle))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn waits_for_next_notification() {
        let (sender, receiver) = watch::channel(0_u64);
        let mut handle = SettleHandle::new(receiver);
        let mut waiting = task::spawn(handle.wait());

        assert_pending!(waiting.poll());
        sender.send_modify(|count| *count += 1);
        assert!(waiting.is_woken());
        assert!(matches!(assert_ready!(waiting.poll()), Ok(1)));
    }

    #[test]
    fn closed_when_tracker_dropped() {
        let (sender, receiver) = watch::channel(0_u64);
        let mut handle = SettleHandle::new(receiver);
        drop(sender);

        let mut waiting = task::spawn(handle.wait());
        assert!(matches!(assert_ready!(waiting.poll()), Err(TrackerError::Closed)));
    }

    #[tokio::test]
    async fn times_out_without_notification() {
        let (_sender, receiver) = watch::channel(0_u64);
        let mut handle = SettleHandle::new(receiver);

        let result = handle.wait_with_timeout(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(TrackerError::Timeout)));
    }

    #[tokio::test]
    async fn stream_yields_counts_until_closed() {
        let (sender, receiver) = watch::channel(0_u64);
        let stream = SettleHandle::new(receiver).into_stream();
        futures::pin_mut!(stream);

        sender.send_modify(|count| *count += 1);
        assert_eq!(stream.next().await, Some(1));

        drop(sender);
        assert_eq!(stream.next().await, None);
    }
}
