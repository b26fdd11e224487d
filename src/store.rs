//! Durable key-value storage seam.
//!
//! Campaign state, the send lease, and the quota counter all live in an
//! external, session-surviving store. The orchestrator only ever needs
//! three byte-valued records under stable keys, so the seam is a minimal
//! get/set/delete trait with typed encode/decode helpers layered on top.
//!
//! Two backends are provided:
//! - [`MemoryStateStore`]: in-process map, for tests and transient use
//! - [`FileStateStore`]: one file per key with atomic replace, for
//!   durable single-host deployments

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::StoreError;

/// Stable keys for the three records the orchestrator owns.
pub mod keys {
    /// The resumable [`crate::CampaignState`] record
    pub const CAMPAIGN: &str = "campaign-state";
    /// The [`crate::LockRecord`] mutual-exclusion lease
    pub const LOCK: &str = "send-lock";
    /// The [`crate::QuotaInfo`] daily budget estimate
    pub const QUOTA: &str = "quota";
}

/// Process-external persistence substrate.
///
/// Implementations must make writes visible to other execution contexts
/// sharing the same store; serialization of concurrent writers is the
/// lock manager's job, not the store's.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Fetch the bytes stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Remove the record under `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Encode and store a typed record under `key`.
pub async fn save_record<T: Serialize + Sync>(
    store: &dyn StateStore,
    key: &str,
    record: &T,
) -> Result<(), StoreError> {
    let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())?;
    store.set(key, &bytes).await
}

/// Load and decode a typed record from `key`, if present.
pub async fn load_record<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(bytes) => {
            let (record, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// In-memory store backed by a `HashMap` behind an `RwLock`.
///
/// Recovers gracefully from lock poisoning by taking the underlying data;
/// the stored bytes are always internally consistent since each record is
/// replaced wholesale.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    records: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStateStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// File-backed store: one `<key>.bin` file per record under a base
/// directory, written via a temp file and rename so readers never observe
/// a torn record.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.tmp"));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty());

        store.set("a", b"hello").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some(&b"hello"[..]));
        assert_eq!(store.len(), 1);

        store.set("a", b"replaced").await.unwrap();
        assert_eq!(
            store.get("a").await.unwrap().as_deref(),
            Some(&b"replaced"[..])
        );

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());

        // Deleting an absent key is fine
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_typed_record_helpers() {
        let store = MemoryStateStore::new();
        let sample = Sample {
            name: "quota".to_string(),
            count: 42,
        };

        save_record(&store, keys::QUOTA, &sample).await.unwrap();
        let loaded: Option<Sample> = load_record(&store, keys::QUOTA).await.unwrap();
        assert_eq!(loaded, Some(sample));

        let absent: Option<Sample> = load_record(&store, keys::CAMPAIGN).await.unwrap();
        assert!(absent.is_none());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStateStore::open(dir.path()).await.unwrap();

        assert!(store.get("campaign-state").await.unwrap().is_none());

        store.set("campaign-state", b"some bytes").await.unwrap();
        assert_eq!(
            store.get("campaign-state").await.unwrap().as_deref(),
            Some(&b"some bytes"[..])
        );

        // Survives reopening the same directory
        let reopened = FileStateStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("campaign-state").await.unwrap().as_deref(),
            Some(&b"some bytes"[..])
        );

        reopened.delete("campaign-state").await.unwrap();
        assert!(store.get("campaign-state").await.unwrap().is_none());
        reopened.delete("campaign-state").await.unwrap();
    }
}
