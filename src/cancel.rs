//! Cooperative cancellation.
//!
//! A [`StopToken`] is the "stop flag checked at checkpoints" pattern made
//! explicit: setting it never aborts an in-flight transport call (there
//! is no robust way to know whether the remote side already enqueued the
//! message), it only interrupts waits and prevents the next step from
//! starting. All of the send loop's suspension points select against it
//! so a stop request is never delayed by a backoff window.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

/// Outcome of a cancellable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration elapsed
    Elapsed,
    /// A stop was requested before the duration elapsed
    Cancelled,
}

/// Shared, clonable stop flag with wakeable waiters.
///
/// Level-triggered: observers that check after the stop was requested
/// still see it, unlike a broadcast message they could miss.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<Inner>,
}

impl StopToken {
    /// Create an unset token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop, waking all current waiters
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Clear the flag for a fresh run
    pub fn reset(&self) {
        self.inner.stopped.store(false, Ordering::SeqCst);
    }

    /// Whether a stop has been requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once a stop is requested (immediately if it already was)
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a concurrent
            // `stop()` cannot slip between the check and the await.
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration`, waking early on a stop request.
    pub async fn sleep(&self, duration: Duration) -> WaitOutcome {
        tokio::select! {
            () = tokio::time::sleep(duration) => WaitOutcome::Elapsed,
            () = self.cancelled() => WaitOutcome::Cancelled,
        }
    }
}
