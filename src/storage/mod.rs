//! Credential persistence
//!
//! Durable storage of session credentials belongs to an external
//! collaborator. The supervisor reads every record at startup and deletes
//! records whose credentials turned out to be invalid. [`MemoryStore`] is the
//! in-process implementation used by tests and the demo.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::session::Identity;

/// Error type for credential store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted credentials of one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Identity the credentials belong to
    pub identity: Identity,
    /// Account display name, if known
    pub display_name: Option<String>,
    /// Opaque credential material owned by the protocol layer
    pub material: Bytes,
}

impl CredentialRecord {
    /// Create a record without credential material
    pub fn new(identity: impl Into<Identity>) -> Self {
        Self {
            identity: identity.into(),
            display_name: None,
            material: Bytes::new(),
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Durable store of credential records
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Load every persisted record
    ///
    /// The store may return duplicates; callers deduplicate by identity.
    async fn load_all(&self) -> Result<Vec<CredentialRecord>, StoreError>;

    /// Insert or replace the record for its identity
    async fn save(&self, record: CredentialRecord) -> Result<(), StoreError>;

    /// Delete the record for `identity`, returning whether it existed
    async fn delete(&self, identity: &Identity) -> Result<bool, StoreError>;
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<Identity, CredentialRecord>>,
    unavailable: Mutex<Option<String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `records`
    pub fn with_records(records: impl IntoIterator<Item = CredentialRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.lock();
            for record in records {
                map.insert(record.identity.clone(), record);
            }
        }
        store
    }

    /// Make every following operation fail with `reason`
    pub fn set_unavailable(&self, reason: impl Into<String>) {
        *self.unavailable.lock() = Some(reason.into());
    }

    /// Check whether a record exists
    pub fn contains(&self, identity: &Identity) -> bool {
        self.records.lock().contains_key(identity)
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        match self.unavailable.lock().as_ref() {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<CredentialRecord>, StoreError> {
        self.check_available()?;
        Ok(self.records.lock().values().cloned().collect())
    }

    async fn save(&self, record: CredentialRecord) -> Result<(), StoreError> {
        self.check_available()?;
        self.records.lock().insert(record.identity.clone(), record);
        Ok(())
    }

    async fn delete(&self, identity: &Identity) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.records.lock().remove(identity).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = MemoryStore::new();
        let id = Identity::new("111:1@s.whatsapp.net");

        store
            .save(CredentialRecord::new(id.clone()).with_display_name("Alice"))
            .await
            .unwrap();
        assert!(store.contains(&id));

        let records = store.load_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_name.as_deref(), Some("Alice"));

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryStore::with_records([CredentialRecord::new("111:1@s")]);
        store.set_unavailable("connection refused");

        let err = store.load_all().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.len(), 1);
    }
}
