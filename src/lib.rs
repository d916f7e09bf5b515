//! # field-cache
//!
//! Read-through caching layer for the real-estate command center.
//!
//! Staff-facing pages and API routes read Airtable-backed resources (agents,
//! listings, leads, marketing report fields) through a shared key/value
//! cache. This crate is that layer: a generic field cache keyed by
//! per-resource configs, with forced refresh, per-key single-flight and an
//! explicit failure policy, plus the Airtable loader and route helpers built
//! on it.
//!
//! ## Key Features
//!
//! - **Read-through cache**: [`FieldCache`] returns fresh entries as stored and
//!   refreshes absent or expired ones through the resource's loader
//! - **Force refresh**: bypasses freshness, never bypasses de-duplication
//! - **Single-flight**: one loader call per key per process under a thundering
//!   herd, optionally one per deployment via a store-backed lease
//! - **Distinct failures**: "cache down" ([`Error::CacheBackend`]) vs "data
//!   source down" ([`Error::UpstreamFetch`])
//! - **Airtable loader**: paginated listing with typed field mapping tables
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use field_cache::{FieldCache, FieldCacheSettings, ResourceRegistry};
//! use field_cache::airtable::AirtableClient;
//! use field_cache::cache::MemoryCache;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> field_cache::Result<()> {
//!     let settings = FieldCacheSettings::from_env()?;
//!     let client = Arc::new(AirtableClient::new(&settings.airtable)?);
//!     let registry = ResourceRegistry::from_settings(&settings, client)?;
//!     let cache = FieldCache::new(settings.cache_config(), Arc::new(MemoryCache::default()));
//!
//!     if let Some(agents) = registry.get("agents") {
//!         let read = cache.get_field_cache(agents, false).await?;
//!         println!("{} agents ({:?})", read.records.len(), read.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Field cache service, backing stores, single-flight |
//! | [`resource`] | Per-resource config, loader trait |
//! | [`registry`] | Resource name → config, built at startup |
//! | [`airtable`] | Airtable client, field mapping, loader |
//! | [`http`] | Framework-neutral GET / refresh handler helpers |
//! | [`config`] | YAML settings with environment overrides |
//! | [`telemetry`] | `tracing` subscriber setup |

pub mod airtable;
pub mod cache;
pub mod config;
pub mod error_code;
pub mod http;
pub mod registry;
pub mod resource;
pub mod telemetry;

// Re-export main types for convenience
pub use cache::{CacheRead, CacheStatus, FieldCache, StalePolicy};
pub use config::FieldCacheSettings;
pub use registry::ResourceRegistry;
pub use resource::{Record, RecordLoader, ResourceCacheConfig};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
