//! The key-value store seam.
//!
//! Every persistent byte the client writes goes through a
//! [`KeyValueStore`]: string keys, string values, async, no transactions.
//! Concurrent writes to the same key are last-write-wins.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;

/// Async string-keyed, string-valued store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value for `key`, or `None` when absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or overwrite `key`.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Deleting an absent key succeeds.
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Delete every key.
    async fn clear(&self) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Volatile store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.items.write().await.clear();
        Ok(())
    }
}
