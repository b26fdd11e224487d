//! Durable, resumable campaign state.
//!
//! A [`CampaignState`] is written before the first send and rewritten
//! after every task completes, so the store always reflects progress up
//! to the previous task even if the process dies mid-loop. It is cleared
//! only when a campaign finishes with zero errors or when the caller
//! explicitly discards it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    store::{self, StateStore, keys},
    types::SendTask,
};

/// Lifecycle of a persisted campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    /// A send loop is (or was, at last write) actively working this campaign
    InProgress,
    /// Halted with work outstanding; eligible for resume
    Paused,
    /// Every task succeeded
    Completed,
}

/// The durable unit of work: a full task list plus per-index progress.
///
/// Invariants maintained by the mutators:
/// - `sent` and `failed` are disjoint
/// - both only ever contain indices of `tasks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignState {
    /// Generated campaign identifier (ULID, time-sortable)
    pub id: String,
    /// Subject line kept purely for human-readable resume prompts
    pub subject: Option<String>,
    /// The full ordered task list for this campaign
    pub tasks: Vec<SendTask>,
    /// Indices confirmed delivered
    pub sent: BTreeSet<usize>,
    /// Indices that ended in terminal failure
    pub failed: BTreeSet<usize>,
    /// Current lifecycle status
    pub status: CampaignStatus,
    /// When the campaign was first started
    pub started_at: DateTime<Utc>,
}

impl CampaignState {
    /// Begin a new campaign over `tasks`, generating a fresh identifier.
    #[must_use]
    pub fn new(tasks: Vec<SendTask>, subject: Option<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            subject,
            tasks,
            sent: BTreeSet::new(),
            failed: BTreeSet::new(),
            status: CampaignStatus::InProgress,
            started_at: Utc::now(),
        }
    }

    /// Record a confirmed delivery for `index`.
    pub fn record_success(&mut self, index: usize) {
        self.failed.remove(&index);
        self.sent.insert(index);
    }

    /// Record a terminal failure for `index`.
    pub fn record_failure(&mut self, index: usize) {
        // A confirmed send is never demoted; the disjointness invariant
        // favors `sent`.
        if !self.sent.contains(&index) {
            self.failed.insert(index);
        }
    }

    /// Tasks whose indices are not yet confirmed sent, ascending by index.
    ///
    /// Failed indices are included: a terminal failure is retryable on an
    /// explicit resume, only confirmed sends are excluded.
    #[must_use]
    pub fn remaining_tasks(&self) -> Vec<SendTask> {
        let mut remaining: Vec<SendTask> = self
            .tasks
            .iter()
            .filter(|t| !self.sent.contains(&t.index))
            .cloned()
            .collect();
        remaining.sort_by_key(|t| t.index);
        remaining
    }

    /// Whether every task has been confirmed sent.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| self.sent.contains(&t.index))
    }
}

/// Typed access to the persisted campaign record.
#[derive(Debug, Clone)]
pub struct CampaignStore {
    store: Arc<dyn StateStore>,
}

impl CampaignStore {
    /// Wrap a state store
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Load the persisted campaign, if one exists
    pub async fn load(&self) -> Result<Option<CampaignState>, StoreError> {
        store::load_record(self.store.as_ref(), keys::CAMPAIGN).await
    }

    /// Persist the campaign, replacing any previous record
    pub async fn save(&self, state: &CampaignState) -> Result<(), StoreError> {
        store::save_record(self.store.as_ref(), keys::CAMPAIGN, state).await
    }

    /// Discard the persisted campaign
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(keys::CAMPAIGN).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::store::MemoryStateStore;

    use super::*;

    fn tasks(n: usize) -> Vec<SendTask> {
        (0..n)
            .map(|i| SendTask::new(i, format!("user{i}@example.com"), "Hi", "Body"))
            .collect()
    }

    #[test]
    fn test_sent_and_failed_stay_disjoint() {
        let mut state = CampaignState::new(tasks(5), None);

        state.record_failure(2);
        assert!(state.failed.contains(&2));

        // A later success for the same index supersedes the failure
        state.record_success(2);
        assert!(state.sent.contains(&2));
        assert!(!state.failed.contains(&2));

        // A failure never demotes a confirmed send
        state.record_failure(2);
        assert!(state.sent.contains(&2));
        assert!(!state.failed.contains(&2));
    }

    #[test]
    fn test_remaining_tasks_ascending_and_excludes_sent_only() {
        let mut state = CampaignState::new(tasks(5), None);
        state.record_success(0);
        state.record_success(1);
        state.record_success(3);
        state.record_failure(2);

        let remaining: Vec<usize> = state.remaining_tasks().iter().map(|t| t.index).collect();
        assert_eq!(remaining, vec![2, 4]);
        assert!(!state.is_complete());

        state.record_success(2);
        state.record_success(4);
        assert!(state.is_complete());
        assert!(state.remaining_tasks().is_empty());
    }

    #[test]
    fn test_sparse_resume_subset_keeps_original_indices() {
        // A resumed run operates on a subset with sparse original indices
        let subset = vec![
            SendTask::new(2, "c@example.com", "Hi", "Body"),
            SendTask::new(4, "e@example.com", "Hi", "Body"),
        ];
        let mut state = CampaignState::new(subset, Some("Launch".to_string()));

        state.record_success(2);
        let remaining: Vec<usize> = state.remaining_tasks().iter().map(|t| t.index).collect();
        assert_eq!(remaining, vec![4]);
    }

    #[tokio::test]
    async fn test_campaign_store_roundtrip() {
        let store = CampaignStore::new(Arc::new(MemoryStateStore::new()));
        assert!(store.load().await.unwrap().is_none());

        let mut state = CampaignState::new(tasks(3), Some("Newsletter".to_string()));
        state.record_success(0);
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap().expect("campaign persisted");
        assert_eq!(loaded.id, state.id);
        assert_eq!(loaded.subject.as_deref(), Some("Newsletter"));
        assert!(loaded.sent.contains(&0));
        assert_eq!(loaded.status, CampaignStatus::InProgress);

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
