//! Typed endpoint definitions.
//!
//! Each endpoint names its request, the cache key and [`CacheTag`]s it
//! provides (queries) or the tags it invalidates (mutations), and decodes
//! the response into a DTO. Wire format is camelCase JSON.
//!
//! [`CacheTag`]: crate::CacheTag

pub mod auth;
pub mod leads;
pub mod services;
