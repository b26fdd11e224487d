//! Rolling daily send-count estimate.
//!
//! The provider enforces its own daily quota server-side; this tracker
//! keeps a best-effort local estimate so callers can warn users before
//! they run into hard provider rejections. The estimate resets whenever
//! the UTC calendar date changes, or on explicit manual reset.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::StoreError,
    store::{self, StateStore, keys},
};

/// The persisted daily budget estimate.
///
/// Invariant: `used() + remaining() == daily_limit`, with `remaining`
/// clamped at zero when the estimate overshoots the limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaInfo {
    /// Fixed daily send budget
    pub daily_limit: u32,
    /// Estimated sends consumed today
    pub used: u32,
    /// When the estimate was last touched
    pub updated_at: DateTime<Utc>,
}

impl QuotaInfo {
    /// A fresh, untouched estimate for today
    #[must_use]
    pub fn fresh(daily_limit: u32) -> Self {
        Self {
            daily_limit,
            used: 0,
            updated_at: Utc::now(),
        }
    }

    /// Estimated sends left today, clamped at zero
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.used)
    }

    /// Whether the estimate says the budget is spent
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Reset the counter if `today` is a different calendar day than the
    /// last update. Returns `true` if a rollover occurred.
    pub fn roll_over_if_stale(&mut self, today: NaiveDate) -> bool {
        if self.updated_at.date_naive() == today {
            return false;
        }
        debug!(
            previous_used = self.used,
            "Quota estimate rolled over to a new day"
        );
        self.used = 0;
        self.updated_at = Utc::now();
        true
    }
}

/// Persisted wrapper around [`QuotaInfo`].
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    store: Arc<dyn StateStore>,
    daily_limit: u32,
}

impl QuotaTracker {
    /// Create a tracker with the configured daily limit
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, daily_limit: u32) -> Self {
        Self { store, daily_limit }
    }

    /// Load the current estimate, applying the day-rollover rule.
    ///
    /// A missing or rolled-over record is persisted back so the store
    /// always holds the estimate other contexts should see.
    pub async fn load(&self) -> Result<QuotaInfo, StoreError> {
        let mut info: QuotaInfo = store::load_record(self.store.as_ref(), keys::QUOTA)
            .await?
            .unwrap_or_else(|| QuotaInfo::fresh(self.daily_limit));

        // Config may have changed between sessions
        info.daily_limit = self.daily_limit;

        if info.roll_over_if_stale(Utc::now().date_naive()) {
            self.save(&info).await?;
        }
        Ok(info)
    }

    /// Count one confirmed successful send.
    pub async fn record_send(&self) -> Result<QuotaInfo, StoreError> {
        let mut info = self.load().await?;
        info.used = info.used.saturating_add(1);
        info.updated_at = Utc::now();
        self.save(&info).await?;
        Ok(info)
    }

    /// Explicitly reset the estimate to an untouched state.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let info = QuotaInfo::fresh(self.daily_limit);
        self.save(&info).await
    }

    async fn save(&self, info: &QuotaInfo) -> Result<(), StoreError> {
        store::save_record(self.store.as_ref(), keys::QUOTA, info).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::store::MemoryStateStore;

    use super::*;

    fn tracker(limit: u32) -> QuotaTracker {
        QuotaTracker::new(Arc::new(MemoryStateStore::new()), limit)
    }

    #[tokio::test]
    async fn test_quota_conservation() {
        let tracker = tracker(500);

        let info = tracker.load().await.unwrap();
        assert_eq!(info.used, 0);
        assert_eq!(info.remaining(), 500);

        for expected_used in 1..=5 {
            let info = tracker.record_send().await.unwrap();
            assert_eq!(info.used, expected_used);
            assert_eq!(info.used + info.remaining(), info.daily_limit);
        }
    }

    #[tokio::test]
    async fn test_remaining_clamped_at_zero() {
        let tracker = tracker(2);

        for _ in 0..4 {
            tracker.record_send().await.unwrap();
        }
        let info = tracker.load().await.unwrap();
        assert_eq!(info.used, 4);
        assert_eq!(info.remaining(), 0);
        assert!(info.is_exhausted());
    }

    #[tokio::test]
    async fn test_day_rollover_resets_estimate() {
        let store = Arc::new(MemoryStateStore::new());
        let backing: Arc<dyn StateStore> = Arc::<MemoryStateStore>::clone(&store);
        let tracker = QuotaTracker::new(backing, 500);

        tracker.record_send().await.unwrap();
        tracker.record_send().await.unwrap();

        // Backdate the stored record to yesterday
        let mut info: QuotaInfo = store::load_record(store.as_ref(), keys::QUOTA)
            .await
            .unwrap()
            .expect("quota persisted");
        info.updated_at -= chrono::Duration::days(1);
        store::save_record(store.as_ref(), keys::QUOTA, &info)
            .await
            .unwrap();

        let rolled = tracker.load().await.unwrap();
        assert_eq!(rolled.used, 0);
        assert_eq!(rolled.remaining(), 500);
    }

    #[tokio::test]
    async fn test_manual_reset() {
        let tracker = tracker(100);
        tracker.record_send().await.unwrap();
        tracker.reset().await.unwrap();

        let info = tracker.load().await.unwrap();
        assert_eq!(info.used, 0);
        assert_eq!(info.remaining(), 100);
    }

    #[test]
    fn test_rollover_predicate() {
        let mut info = QuotaInfo::fresh(100);
        info.used = 7;

        assert!(!info.roll_over_if_stale(info.updated_at.date_naive()));
        assert_eq!(info.used, 7);

        let tomorrow = info.updated_at.date_naive() + chrono::Duration::days(1);
        assert!(info.roll_over_if_stale(tomorrow));
        assert_eq!(info.used, 0);
    }
}
