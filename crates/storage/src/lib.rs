//! Client-side storage for the SolarCare app.
//!
//! - [`kv`] -- the string-keyed async [`KeyValueStore`] seam plus an
//!   in-memory implementation.
//! - [`encrypted`] -- AES-256-GCM file-backed store used on device.
//! - [`helper`] -- typed JSON access over any store.
//! - [`cache`] -- TTL-wrapped API response cache with lazy eviction.
//! - [`offline_queue`] -- durable queue of requests made while offline.

pub mod cache;
pub mod encrypted;
pub mod error;
pub mod helper;
pub mod keys;
pub mod kv;
pub mod offline_queue;

pub use cache::{ApiCache, CacheEntry, DEFAULT_CACHE_TTL};
pub use encrypted::EncryptedFileStore;
pub use error::StorageError;
pub use helper::StorageHelper;
pub use kv::{KeyValueStore, MemoryStore};
pub use offline_queue::{OfflineQueue, QueuedRequest};
