//! Runner configuration.
//!
//! Every tunable the orchestrator honors, deserializable from the
//! application's config file with sensible per-field defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_inter_task_delay_ms() -> u64 {
    1000
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_transient_retry_delay_ms() -> u64 {
    2000
}

const fn default_liveness_check_every() -> usize {
    10
}

const fn default_backoff_floor_secs() -> u64 {
    60
}

const fn default_backoff_ceiling_secs() -> u64 {
    300
}

const fn default_lock_ttl_secs() -> u64 {
    300
}

const fn default_network_poll_ms() -> u64 {
    1000
}

const fn default_daily_quota() -> u32 {
    500
}

const fn default_reauth_threshold_minutes() -> i64 {
    10
}

/// Configuration for a [`crate::CampaignRunner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Fixed pause between consecutive tasks, to respect provider limits
    ///
    /// Default: 1000 ms
    #[serde(default = "default_inter_task_delay_ms")]
    pub inter_task_delay_ms: u64,

    /// Maximum delivery attempts per task before recording a terminal error
    ///
    /// Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed wait after a transient (retryable, non-throttling) failure
    ///
    /// Default: 2000 ms
    #[serde(default = "default_transient_retry_delay_ms")]
    pub transient_retry_delay_ms: u64,

    /// Re-verify credential liveness (and refresh the send lease) every
    /// this many tasks
    ///
    /// Default: 10
    #[serde(default = "default_liveness_check_every")]
    pub liveness_check_every: usize,

    /// First wait after a throttling signal
    ///
    /// Default: 60 seconds
    #[serde(default = "default_backoff_floor_secs")]
    pub backoff_floor_secs: u64,

    /// Ceiling on the doubling throttle backoff
    ///
    /// Default: 300 seconds (5 minutes)
    #[serde(default = "default_backoff_ceiling_secs")]
    pub backoff_ceiling_secs: u64,

    /// Age past which another context may force-acquire the send lease
    ///
    /// Default: 300 seconds (5 minutes)
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Connectivity probe polling interval while offline
    ///
    /// Default: 1000 ms
    #[serde(default = "default_network_poll_ms")]
    pub network_poll_ms: u64,

    /// Give up on an offline wait after this many seconds and pause the
    /// campaign instead. `None` waits indefinitely.
    ///
    /// Default: `None`
    #[serde(default)]
    pub offline_grace_secs: Option<u64>,

    /// Provider's daily send budget, for the local estimate
    ///
    /// Default: 500
    #[serde(default = "default_daily_quota")]
    pub daily_quota: u32,

    /// Proactively refresh the credential when fewer than this many
    /// minutes remain
    ///
    /// Default: 10
    #[serde(default = "default_reauth_threshold_minutes")]
    pub reauth_threshold_minutes: i64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            inter_task_delay_ms: default_inter_task_delay_ms(),
            max_attempts: default_max_attempts(),
            transient_retry_delay_ms: default_transient_retry_delay_ms(),
            liveness_check_every: default_liveness_check_every(),
            backoff_floor_secs: default_backoff_floor_secs(),
            backoff_ceiling_secs: default_backoff_ceiling_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            network_poll_ms: default_network_poll_ms(),
            offline_grace_secs: None,
            daily_quota: default_daily_quota(),
            reauth_threshold_minutes: default_reauth_threshold_minutes(),
        }
    }
}

impl RunnerConfig {
    /// Inter-task delay as a [`Duration`]
    #[must_use]
    pub const fn inter_task_delay(&self) -> Duration {
        Duration::from_millis(self.inter_task_delay_ms)
    }

    /// Transient-retry delay as a [`Duration`]
    #[must_use]
    pub const fn transient_retry_delay(&self) -> Duration {
        Duration::from_millis(self.transient_retry_delay_ms)
    }

    /// Lease TTL as a [`Duration`]
    #[must_use]
    pub const fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// Probe polling interval as a [`Duration`]
    #[must_use]
    pub const fn network_poll(&self) -> Duration {
        Duration::from_millis(self.network_poll_ms)
    }

    /// Offline grace window as a [`Duration`], if configured
    #[must_use]
    pub fn offline_grace(&self) -> Option<Duration> {
        self.offline_grace_secs.map(Duration::from_secs)
    }

    /// Backoff floor as a [`Duration`]
    #[must_use]
    pub const fn backoff_floor(&self) -> Duration {
        Duration::from_secs(self.backoff_floor_secs)
    }

    /// Backoff ceiling as a [`Duration`]
    #[must_use]
    pub const fn backoff_ceiling(&self) -> Duration {
        Duration::from_secs(self.backoff_ceiling_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.inter_task_delay_ms, 1000);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.transient_retry_delay_ms, 2000);
        assert_eq!(config.liveness_check_every, 10);
        assert_eq!(config.backoff_floor_secs, 60);
        assert_eq!(config.backoff_ceiling_secs, 300);
        assert_eq!(config.lock_ttl_secs, 300);
        assert_eq!(config.daily_quota, 500);
        assert!(config.offline_grace_secs.is_none());
    }

    #[test]
    fn test_duration_accessors() {
        let config = RunnerConfig {
            offline_grace_secs: Some(30),
            ..Default::default()
        };
        assert_eq!(config.inter_task_delay(), Duration::from_secs(1));
        assert_eq!(config.transient_retry_delay(), Duration::from_secs(2));
        assert_eq!(config.lock_ttl(), Duration::from_secs(300));
        assert_eq!(config.offline_grace(), Some(Duration::from_secs(30)));
    }
}
