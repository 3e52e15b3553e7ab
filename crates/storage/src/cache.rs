//! TTL-wrapped API response cache.
//!
//! Values are stored as `{data, timestamp, ttl}` under
//! `api_cache:<key>`. An entry is valid while `now - timestamp <= ttl`.
//! Expired entries are evicted lazily on read, or by an explicit
//! [`ApiCache::clear_expired`] sweep; there is no background timer.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use solarcare_core::types::EpochMillis;
use solarcare_core::Clock;

use crate::error::StorageError;
use crate::helper::StorageHelper;
use crate::keys::{API_CACHE_PREFIX, KNOWN_CACHE_KEYS};

/// TTL applied when the caller does not pass one.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// On-disk cache wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Write time, epoch millis.
    pub timestamp: EpochMillis,
    /// Lifetime in milliseconds.
    pub ttl: u64,
}

impl<T> CacheEntry<T> {
    pub fn is_valid_at(&self, now: EpochMillis) -> bool {
        now.saturating_sub(self.timestamp) <= self.ttl as i64
    }
}

#[derive(Clone)]
pub struct ApiCache {
    storage: StorageHelper,
    clock: Arc<dyn Clock>,
}

impl ApiCache {
    pub fn new(storage: StorageHelper, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    fn storage_key(key: &str) -> String {
        format!("{API_CACHE_PREFIX}{key}")
    }

    /// Store `data` under `key` for `ttl` (default five minutes).
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now_millis(),
            ttl: ttl.unwrap_or(DEFAULT_CACHE_TTL).as_millis() as u64,
        };
        self.storage.set(&Self::storage_key(key), &entry).await
    }

    /// Return the cached value for `key`, evicting it if expired.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let storage_key = Self::storage_key(key);
        let entry: CacheEntry<T> = self.storage.get(&storage_key).await?;

        if entry.is_valid_at(self.clock.now_millis()) {
            return Some(entry.data);
        }

        tracing::debug!(key, "Cache entry expired, evicting");
        if let Err(e) = self.storage.remove(&storage_key).await {
            tracing::warn!(key, error = %e, "Failed to evict expired cache entry");
        }
        None
    }

    /// Drop `key` regardless of age.
    pub async fn invalidate(&self, key: &str) -> Result<(), StorageError> {
        self.storage.remove(&Self::storage_key(key)).await
    }

    /// Sweep the app's known cache keys and evict expired entries.
    ///
    /// Returns the number of entries removed.
    pub async fn clear_expired(&self) -> usize {
        self.clear_expired_in(KNOWN_CACHE_KEYS).await
    }

    /// Sweep `keys` and evict expired entries.
    pub async fn clear_expired_in(&self, keys: &[&str]) -> usize {
        let now = self.clock.now_millis();
        let mut removed = 0;

        for key in keys {
            let storage_key = Self::storage_key(key);
            let Some(entry) = self
                .storage
                .get::<CacheEntry<serde_json::Value>>(&storage_key)
                .await
            else {
                continue;
            };
            if entry.is_valid_at(now) {
                continue;
            }
            match self.storage.remove(&storage_key).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(key, error = %e, "Failed to evict expired cache entry"),
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Evicted expired cache entries");
        }
        removed
    }
}
