//! Typed JSON access over a [`KeyValueStore`].
//!
//! Reads degrade: a missing, unreadable or unparsable value comes back as
//! `None` (and is logged) so corrupt data never takes the app down.
//! Writes and removals propagate their errors, because the caller asked
//! for a mutation and silently dropping it would be misleading.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;
use crate::kv::KeyValueStore;

#[derive(Clone)]
pub struct StorageHelper {
    store: Arc<dyn KeyValueStore>,
}

impl StorageHelper {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Read and decode `key`. Any failure yields `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Stored value failed to parse, treating as missing");
                None
            }
        }
    }

    /// Read the raw string for `key`. Read failures yield `None`.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        match self.store.get_item(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Storage read failed, treating as missing");
                None
            }
        }
    }

    /// Encode `value` as JSON and store it under `key`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        self.store.set_item(key, &json).await.inspect_err(|e| {
            tracing::error!(key, error = %e, "Storage write failed");
        })
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.store.remove_item(key).await.inspect_err(|e| {
            tracing::error!(key, error = %e, "Storage remove failed");
        })
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::kv::MemoryStore;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        language: String,
        notifications: bool,
    }

    fn helper() -> (StorageHelper, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (StorageHelper::new(store.clone()), store)
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let (helper, _) = helper();
        let prefs = Prefs {
            language: "en".into(),
            notifications: true,
        };
        helper.set("prefs", &prefs).await.unwrap();
        assert_eq!(helper.get::<Prefs>("prefs").await, Some(prefs));
    }

    #[tokio::test]
    async fn corrupt_json_reads_as_missing() {
        let (helper, store) = helper();
        store.set_item("prefs", "{not json").await.unwrap();
        assert_eq!(helper.get::<Prefs>("prefs").await, None);
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let (helper, _) = helper();
        assert_eq!(helper.get::<Prefs>("absent").await, None);
    }
}
