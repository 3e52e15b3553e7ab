//! In-memory query result cache keyed by endpoint, invalidated by tag.
//!
//! A query stores its result together with the [`CacheTag`]s it
//! provides; a mutation invalidates the tags it names. Entries are
//! served while younger than the freshness window.
//!
//! [`QueryCache::reset`] bumps a generation counter. Writers capture the
//! generation before their request and write only if it is unchanged, so
//! a response that was in flight across a logout never lands in the
//! fresh cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

/// Labels linking cached queries to the mutations that stale them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTag {
    Service,
    ServiceCategory,
    Lead,
    LeadItem(String),
    Quotation,
    Document,
    Profile,
}

impl CacheTag {
    /// Whether invalidating `self` stales an entry providing `provided`.
    ///
    /// Invalidating [`CacheTag::Lead`] stales every lead entry, including
    /// single-lead ones; invalidating a `LeadItem` stales only that lead.
    pub fn covers(&self, provided: &CacheTag) -> bool {
        match (self, provided) {
            (CacheTag::Lead, CacheTag::LeadItem(_)) => true,
            (a, b) => a == b,
        }
    }
}

struct Entry {
    data: Value,
    tags: Vec<CacheTag>,
    stored_at: Instant,
}

#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    generation: Arc<AtomicU64>,
    freshness: Duration,
}

impl QueryCache {
    pub fn new(freshness: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            freshness,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current generation, to pass to [`insert`](Self::insert).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// A fresh cached result for `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() <= self.freshness {
            return Some(entry.data.clone());
        }
        entries.remove(key);
        None
    }

    /// Store `data` unless the cache was reset since `generation`.
    ///
    /// Returns whether the entry was written.
    pub fn insert(&self, key: &str, data: Value, tags: Vec<CacheTag>, generation: u64) -> bool {
        let mut entries = self.lock();
        if self.generation() != generation {
            tracing::debug!(key, "Cache reset while request was in flight, dropping result");
            return false;
        }
        entries.insert(
            key.to_string(),
            Entry {
                data,
                tags,
                stored_at: Instant::now(),
            },
        );
        true
    }

    /// Drop every entry providing a tag covered by `tags`.
    pub fn invalidate(&self, tags: &[CacheTag]) -> usize {
        if tags.is_empty() {
            return 0;
        }
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            !entry
                .tags
                .iter()
                .any(|provided| tags.iter().any(|tag| tag.covers(provided)))
        });
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, ?tags, "Invalidated cached queries");
        }
        removed
    }

    /// Drop everything and start a new generation.
    pub fn reset(&self) {
        let mut entries = self.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
