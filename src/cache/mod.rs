//! Read-through field cache over a pluggable key/value store.
//!
//! # Field Cache Module
//!
//! Pages and API routes read Airtable-backed resources (agents, listings,
//! leads, report fields) through [`FieldCache`] instead of calling Airtable
//! directly. The cache is cache-aside with whole-value replacement:
//!
//! - fresh entry: returned as stored, no upstream call, no write
//! - absent, expired or forced: the resource's loader runs once, the result
//!   replaces the stored value, and every concurrent caller for that key
//!   shares that single loader call
//! - loader failure: the stored value is left untouched and the error is
//!   surfaced (or the old value served flagged stale, see [`StalePolicy`])
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`FieldCache`] | The read-through service |
//! | [`CacheConfig`] | Prefix, loader timeout, stale policy, lease settings |
//! | [`CacheBackend`] | Trait for key/value stores |
//! | [`MemoryCache`] | In-process store with native TTL |
//! | [`SingleFlight`] | Per-key de-duplication of concurrent work |
//! | [`CacheKeyBuilder`] | Namespaced entry and lease keys |
//!
//! ## Example
//!
//! ```rust
//! use field_cache::cache::{CacheConfig, FieldCache, MemoryCache};
//! use field_cache::resource::{FnLoader, ResourceCacheConfig};
//! use futures::FutureExt;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let cache = FieldCache::new(CacheConfig::new(), Arc::new(MemoryCache::default()));
//! let loader = FnLoader::new("agents", || {
//!     async { Ok(vec![serde_json::json!("Alice"), serde_json::json!("Bob")]) }.boxed()
//! });
//! let agents = ResourceCacheConfig::new("agents", 300, Arc::new(loader));
//!
//! let read = cache.get_field_cache(&agents, false).await.unwrap();
//! assert_eq!(read.records.len(), 2);
//! # });
//! ```

mod backend;
mod entry;
pub mod key;
mod manager;
#[cfg(feature = "redis")]
mod redis;
mod single_flight;

pub use backend::{CacheBackend, MemoryCache};
pub use entry::CacheEntry;
pub use key::{CacheKey, CacheKeyBuilder};
pub use manager::{
    CacheConfig, CacheRead, CacheStats, CacheStatus, FieldCache, LeaseConfig, StalePolicy,
    LEASE_WRITE_MARGIN,
};
#[cfg(feature = "redis")]
pub use self::redis::{RedisCache, RedisConfig};
pub use single_flight::{FlightRole, SingleFlight};
