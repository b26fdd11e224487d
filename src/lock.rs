//! Cooperative mutual-exclusion lease over the durable store.
//!
//! Two execution contexts (browser tabs, processes, retried page loads)
//! must never drive the same campaign concurrently. They do not share
//! memory, so exclusion is a time-bounded lease record in the shared
//! store rather than a language-level lock: a lease older than the TTL
//! is considered abandoned and may be force-acquired.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::StoreError,
    store::{self, StateStore, keys},
};

/// The persisted lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    /// Stable identifier of the owning execution context (not per attempt)
    pub owner: String,
    /// When the lease was acquired or last refreshed
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    /// Whether this lease is older than `ttl`
    #[must_use]
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.acquired_at);
        age.to_std().is_ok_and(|age| age > ttl)
    }
}

/// Manages the send lease for one execution context.
#[derive(Debug, Clone)]
pub struct LockManager {
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl LockManager {
    /// Create a manager with the given lease TTL
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Read the current lease, if any
    pub async fn current(&self) -> Result<Option<LockRecord>, StoreError> {
        store::load_record(self.store.as_ref(), keys::LOCK).await
    }

    /// Attempt to acquire the lease for `owner`.
    ///
    /// Succeeds when no lease exists, the existing lease belongs to the
    /// same owner (re-entry after a reload), or the existing lease has
    /// outlived the TTL. Returns `false` if another context holds a live
    /// lease.
    pub async fn try_acquire(&self, owner: &str) -> Result<bool, StoreError> {
        let now = Utc::now();

        if let Some(existing) = self.current().await? {
            if existing.owner != owner && !existing.is_expired(self.ttl, now) {
                debug!(
                    holder = %existing.owner,
                    contender = %owner,
                    "Send lock held by another session"
                );
                return Ok(false);
            }
            if existing.owner != owner {
                warn!(
                    stale_owner = %existing.owner,
                    new_owner = %owner,
                    "Taking over expired send lock"
                );
            }
        }

        self.write_lease(owner, now).await?;
        Ok(true)
    }

    /// Refresh the lease timestamp.
    ///
    /// Called during a long-running send (periodically, and after every
    /// wait long enough to approach the TTL) so that a well-behaved
    /// concurrent context does not take over the lease via expiry.
    /// Returns `false` without writing when the lease is no longer held
    /// by `owner`; the caller must stop sending.
    pub async fn refresh(&self, owner: &str) -> Result<bool, StoreError> {
        match self.current().await? {
            Some(existing) if existing.owner == owner => {
                self.write_lease(owner, Utc::now()).await?;
                Ok(true)
            }
            _ => {
                warn!(owner = %owner, "Send lock no longer held; refusing to refresh");
                Ok(false)
            }
        }
    }

    /// Release the lease, but only if `owner` still holds it.
    ///
    /// The owner check prevents releasing a lease that another context
    /// legitimately force-acquired after a false-expiry race.
    pub async fn release(&self, owner: &str) -> Result<(), StoreError> {
        match self.current().await? {
            Some(existing) if existing.owner == owner => {
                self.store.delete(keys::LOCK).await?;
                debug!(owner = %owner, "Released send lock");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn write_lease(&self, owner: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let record = LockRecord {
            owner: owner.to_string(),
            acquired_at: at,
        };
        store::save_record(self.store.as_ref(), keys::LOCK, &record).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::store::MemoryStateStore;

    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    fn manager(store: &Arc<MemoryStateStore>) -> LockManager {
        let store: Arc<dyn StateStore> = Arc::<MemoryStateStore>::clone(store);
        LockManager::new(store, TTL)
    }

    #[tokio::test]
    async fn test_mutual_exclusion_within_ttl() {
        let backing = Arc::new(MemoryStateStore::new());
        let lock = manager(&backing);

        assert!(lock.try_acquire("tab-a").await.unwrap());
        // A second owner is refused while the lease is live
        assert!(!lock.try_acquire("tab-b").await.unwrap());
        // The holder can re-acquire (page reload in the same context)
        assert!(lock.try_acquire("tab-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_is_force_acquirable() {
        let backing = Arc::new(MemoryStateStore::new());
        let lock = manager(&backing);

        // Plant a lease acquired well past the TTL ago
        let stale = LockRecord {
            owner: "tab-a".to_string(),
            acquired_at: Utc::now() - chrono::Duration::seconds(600),
        };
        store::save_record(backing.as_ref(), keys::LOCK, &stale)
            .await
            .unwrap();

        assert!(lock.try_acquire("tab-c").await.unwrap());
        let current = lock.current().await.unwrap().expect("lease written");
        assert_eq!(current.owner, "tab-c");
    }

    #[tokio::test]
    async fn test_refresh_extends_lease() {
        let backing = Arc::new(MemoryStateStore::new());
        let lock = manager(&backing);

        let nearly_stale = LockRecord {
            owner: "tab-a".to_string(),
            acquired_at: Utc::now() - chrono::Duration::seconds(290),
        };
        store::save_record(backing.as_ref(), keys::LOCK, &nearly_stale)
            .await
            .unwrap();

        assert!(lock.refresh("tab-a").await.unwrap());
        let current = lock.current().await.unwrap().expect("lease present");
        assert!(!current.is_expired(TTL, Utc::now()));

        // A foreign owner cannot refresh our lease
        assert!(!lock.refresh("tab-b").await.unwrap());
        assert_eq!(lock.current().await.unwrap().unwrap().owner, "tab-a");
    }

    #[tokio::test]
    async fn test_refresh_reports_lost_lease() {
        let backing = Arc::new(MemoryStateStore::new());
        let lock = manager(&backing);

        assert!(lock.try_acquire("tab-a").await.unwrap());

        // Another context took over (e.g. after a TTL-expiry race)
        let usurper = LockRecord {
            owner: "tab-b".to_string(),
            acquired_at: Utc::now(),
        };
        store::save_record(backing.as_ref(), keys::LOCK, &usurper)
            .await
            .unwrap();

        assert!(!lock.refresh("tab-a").await.unwrap());
        assert_eq!(lock.current().await.unwrap().unwrap().owner, "tab-b");

        // With no lease at all, there is nothing to refresh either
        backing.delete(keys::LOCK).await.unwrap();
        assert!(!lock.refresh("tab-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_is_owner_checked() {
        let backing = Arc::new(MemoryStateStore::new());
        let lock = manager(&backing);

        assert!(lock.try_acquire("tab-a").await.unwrap());

        // Foreign release is a no-op
        lock.release("tab-b").await.unwrap();
        assert!(lock.current().await.unwrap().is_some());

        lock.release("tab-a").await.unwrap();
        assert!(lock.current().await.unwrap().is_none());

        // Releasing with no lease present is fine
        lock.release("tab-a").await.unwrap();
    }

    #[test]
    fn test_expiry_math() {
        let record = LockRecord {
            owner: "tab-a".to_string(),
            acquired_at: Utc::now(),
        };
        assert!(!record.is_expired(TTL, Utc::now()));
        assert!(record.is_expired(TTL, Utc::now() + chrono::Duration::seconds(301)));
        // A lease timestamped in the future is not expired
        let future = LockRecord {
            owner: "tab-a".to_string(),
            acquired_at: Utc::now() + chrono::Duration::seconds(60),
        };
        assert!(!future.is_expired(TTL, Utc::now()));
    }
}
