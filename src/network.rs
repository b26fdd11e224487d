//! Transport connectivity observation.
//!
//! Offline is not an error: the send loop blocks on connectivity and
//! continues where it left off once the link returns. The probe is
//! injected so the wait logic is unit-testable without touching a real
//! network.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use tracing::{debug, info};

use crate::cancel::StopToken;

/// A cheap, synchronous connectivity check.
pub trait ConnectivityProbe: Send + Sync + std::fmt::Debug {
    /// Whether the transport is currently reachable
    fn is_online(&self) -> bool;
}

/// Probe that always reports online. The default for environments with
/// no meaningful connectivity signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl ConnectivityProbe for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Probe backed by a shared flag; useful for tests and for callers that
/// receive connectivity events from a platform layer.
#[derive(Debug, Clone, Default)]
pub struct SharedFlagProbe {
    online: Arc<AtomicBool>,
}

impl SharedFlagProbe {
    /// Create a probe with the given initial state
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Update the connectivity state
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for SharedFlagProbe {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// How a connectivity wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineWait {
    /// Connectivity is (or became) available
    Online,
    /// A stop was requested while waiting
    Cancelled,
    /// The configured grace window elapsed with the link still down
    GraceExpired,
}

/// Polls an injected probe and exposes a cancellable wait-until-online.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    poll_interval: Duration,
    /// Give up after this long offline; `None` waits indefinitely
    grace: Option<Duration>,
}

impl NetworkMonitor {
    /// Create a monitor over `probe`
    #[must_use]
    pub fn new(
        probe: Arc<dyn ConnectivityProbe>,
        poll_interval: Duration,
        grace: Option<Duration>,
    ) -> Self {
        Self {
            probe,
            poll_interval,
            grace,
        }
    }

    /// Whether the transport is reachable right now
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.probe.is_online()
    }

    /// Block until the probe reports online, a stop is requested, or the
    /// grace window (if configured) runs out.
    pub async fn wait_until_online(&self, stop: &StopToken) -> OnlineWait {
        if self.probe.is_online() {
            return OnlineWait::Online;
        }

        info!("Transport offline; waiting for connectivity");
        let mut waited = Duration::ZERO;

        loop {
            match stop.sleep(self.poll_interval).await {
                crate::cancel::WaitOutcome::Cancelled => return OnlineWait::Cancelled,
                crate::cancel::WaitOutcome::Elapsed => {}
            }

            if self.probe.is_online() {
                info!("Connectivity restored");
                return OnlineWait::Online;
            }

            waited += self.poll_interval;
            if let Some(grace) = self.grace
                && waited >= grace
            {
                debug!(waited_secs = waited.as_secs(), "Offline grace window expired");
                return OnlineWait::GraceExpired;
            }
        }
    }
}
