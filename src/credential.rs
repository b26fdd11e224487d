//! Bearer credential liveness.
//!
//! Sending against an invalid credential is useless and still burns
//! provider-side quota counters, so the campaign verifies liveness up
//! front and periodically mid-run. A valid credential close to expiry
//! triggers a background refresh; a dead, unrefreshable one halts the
//! campaign with an actionable re-authentication prompt instead of a
//! generic failure.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

/// Snapshot of credential health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
    /// Whether the credential is currently accepted by the provider
    pub valid: bool,
    /// Minutes until expiry, when the provider exposes it
    pub minutes_remaining: Option<i64>,
    /// Whether recovery requires interactive re-authentication
    pub requires_reauth: bool,
}

impl Liveness {
    /// A healthy credential with plenty of lifetime left
    #[must_use]
    pub const fn valid_for(minutes: i64) -> Self {
        Self {
            valid: true,
            minutes_remaining: Some(minutes),
            requires_reauth: false,
        }
    }

    /// A dead credential that only interactive sign-in can fix
    #[must_use]
    pub const fn needs_reauth() -> Self {
        Self {
            valid: false,
            minutes_remaining: None,
            requires_reauth: true,
        }
    }
}

/// The consumed credential/session provider seam.
#[async_trait]
pub trait CredentialProvider: Send + Sync + std::fmt::Debug {
    /// Check whether the bearer credential is still valid
    async fn check(&self) -> Liveness;

    /// Kick off a refresh. Side-effecting; implementations decide whether
    /// this blocks until complete or merely schedules one.
    async fn refresh(&self);

    /// The current bearer credential to hand to the transport, if any
    async fn credential(&self) -> Option<String>;
}

/// Verdict of a liveness verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessVerdict {
    /// Credential is healthy; carry on
    Ok,
    /// Credential is healthy but near expiry; a background refresh was started
    RefreshStarted,
    /// Credential is dead and needs interactive re-authentication
    ReauthRequired,
}

/// Wraps a provider with the proactive-refresh policy.
#[derive(Debug, Clone)]
pub struct LivenessChecker {
    provider: Arc<dyn CredentialProvider>,
    /// Refresh proactively when fewer than this many minutes remain
    refresh_threshold_minutes: i64,
}

impl LivenessChecker {
    /// Create a checker over `provider`
    #[must_use]
    pub fn new(provider: Arc<dyn CredentialProvider>, refresh_threshold_minutes: i64) -> Self {
        Self {
            provider,
            refresh_threshold_minutes,
        }
    }

    /// The wrapped provider
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn CredentialProvider> {
        &self.provider
    }

    /// Verify the credential and apply the refresh policy.
    pub async fn verify(&self) -> LivenessVerdict {
        let liveness = self.provider.check().await;

        if !liveness.valid {
            if liveness.requires_reauth {
                warn!("Credential invalid and unrefreshable; re-authentication required");
                return LivenessVerdict::ReauthRequired;
            }
            // Invalid but refreshable: refresh inline and re-check once.
            info!("Credential invalid; attempting refresh");
            self.provider.refresh().await;
            let after = self.provider.check().await;
            return if after.valid {
                LivenessVerdict::Ok
            } else {
                LivenessVerdict::ReauthRequired
            };
        }

        if let Some(minutes) = liveness.minutes_remaining
            && minutes < self.refresh_threshold_minutes
        {
            info!(minutes_remaining = minutes, "Credential near expiry; refreshing in background");
            let provider = Arc::clone(&self.provider);
            tokio::spawn(async move {
                provider.refresh().await;
            });
            return LivenessVerdict::RefreshStarted;
        }

        LivenessVerdict::Ok
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct FakeProvider {
        minutes: std::sync::atomic::AtomicI64,
        valid: AtomicBool,
        reauth: AtomicBool,
        refreshes: AtomicU32,
        refresh_restores: AtomicBool,
    }

    impl FakeProvider {
        fn healthy(minutes: i64) -> Self {
            let provider = Self::default();
            provider.minutes.store(minutes, Ordering::SeqCst);
            provider.valid.store(true, Ordering::SeqCst);
            provider
        }
    }

    #[async_trait]
    impl CredentialProvider for FakeProvider {
        async fn check(&self) -> Liveness {
            Liveness {
                valid: self.valid.load(Ordering::SeqCst),
                minutes_remaining: Some(self.minutes.load(Ordering::SeqCst)),
                requires_reauth: self.reauth.load(Ordering::SeqCst),
            }
        }

        async fn refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.refresh_restores.load(Ordering::SeqCst) {
                self.valid.store(true, Ordering::SeqCst);
                self.minutes.store(60, Ordering::SeqCst);
            }
        }

        async fn credential(&self) -> Option<String> {
            self.valid
                .load(Ordering::SeqCst)
                .then(|| "bearer-token".to_string())
        }
    }

    #[tokio::test]
    async fn test_healthy_credential_passes() {
        let provider = Arc::new(FakeProvider::healthy(55));
        let checker = LivenessChecker::new(Arc::<FakeProvider>::clone(&provider), 10);

        assert_eq!(checker.verify().await, LivenessVerdict::Ok);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_near_expiry_spawns_refresh() {
        let provider = Arc::new(FakeProvider::healthy(5));
        let checker = LivenessChecker::new(Arc::<FakeProvider>::clone(&provider), 10);

        assert_eq!(checker.verify().await, LivenessVerdict::RefreshStarted);
        // Let the spawned refresh run
        tokio::task::yield_now().await;
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_refreshable_recovers_inline() {
        let provider = Arc::new(FakeProvider::default());
        provider.refresh_restores.store(true, Ordering::SeqCst);
        let checker = LivenessChecker::new(Arc::<FakeProvider>::clone(&provider), 10);

        assert_eq!(checker.verify().await, LivenessVerdict::Ok);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_credential_demands_reauth() {
        let provider = Arc::new(FakeProvider::default());
        provider.reauth.store(true, Ordering::SeqCst);
        let checker = LivenessChecker::new(Arc::<FakeProvider>::clone(&provider), 10);

        assert_eq!(checker.verify().await, LivenessVerdict::ReauthRequired);
    }

    #[tokio::test]
    async fn test_unrecoverable_refresh_demands_reauth() {
        // Invalid, refreshable in principle, but refresh doesn't help
        let provider = Arc::new(FakeProvider::default());
        let checker = LivenessChecker::new(Arc::<FakeProvider>::clone(&provider), 10);

        assert_eq!(checker.verify().await, LivenessVerdict::ReauthRequired);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    }
}
