//! Well-known storage keys.

/// Persisted root envelope (auth slice only).
pub const PERSIST_ROOT: &str = "persist:root";

/// Durable queue of requests made while offline.
pub const OFFLINE_QUEUE: &str = "offline_queue";

/// Prefix for every TTL-wrapped API cache entry.
pub const API_CACHE_PREFIX: &str = "api_cache:";

/// Cache keys swept by [`ApiCache::clear_expired`](crate::ApiCache::clear_expired).
pub const CACHE_SERVICES: &str = "services";
pub const CACHE_SERVICE_CATEGORIES: &str = "service_categories";
pub const CACHE_LEADS: &str = "leads";
pub const CACHE_PROFILE: &str = "profile";

/// The finite set of cache keys the app writes.
pub const KNOWN_CACHE_KEYS: &[&str] = &[
    CACHE_SERVICES,
    CACHE_SERVICE_CATEGORIES,
    CACHE_LEADS,
    CACHE_PROFILE,
];
