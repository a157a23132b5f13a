//! One-shot timers on the tokio runtime.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a callback scheduled to run once after a delay.
///
/// Dropping the handle detaches the timer; it still fires. Use
/// [`Timer::cancel`] to prevent the callback from running.
#[derive(Debug)]
pub struct Timer {
    handle: JoinHandle<()>,
}

impl Timer {
    /// Schedules `callback` to run once after `delay`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn once<F>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });

        Self { handle }
    }

    /// Cancels the timer. Has no effect if the callback already ran.
    pub fn cancel(self) {
        self.handle.abort();
    }

    /// Returns `true` while the callback has neither run nor been cancelled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.handle.is_finished()
    }
}
