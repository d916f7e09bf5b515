//! Field cache service.

use super::backend::CacheBackend;
use super::entry::{now_ms, CacheEntry};
use super::key::{CacheKey, CacheKeyBuilder};
use super::single_flight::{FlightRole, SingleFlight};
use crate::resource::{Record, ResourceCacheConfig};
use crate::{Error, ErrorContext, Result};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What to do when a refresh fails and an older entry is still stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Surface the `UpstreamFetch` error.
    #[default]
    Propagate,
    /// Return the older entry flagged [`CacheStatus::Stale`].
    ServeStale,
}

/// Headroom a lease must keep past the loader timeout for the store write.
pub const LEASE_WRITE_MARGIN: Duration = Duration::from_secs(1);

/// Cross-instance refresh lease settings.
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Lifetime of the lease key; bounds how long a crashed holder blocks others.
    /// Raised to `loader_timeout + LEASE_WRITE_MARGIN` when shorter, so a lease
    /// never expires under a holder that is still loading.
    pub lease_ttl: Duration,
    /// How long a non-holder waits for the holder's write before giving up.
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(35),
            poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub key_prefix: Option<String>,
    pub loader_timeout: Duration,
    pub stale_policy: StalePolicy,
    /// Extra store-native lifetime kept past the TTL when serving stale values.
    pub stale_grace: Duration,
    /// `None` keeps single-flight process-local.
    pub lease: Option<LeaseConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: None,
            loader_timeout: Duration::from_secs(15),
            stale_policy: StalePolicy::Propagate,
            stale_grace: Duration::from_secs(3600),
            lease: None,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_loader_timeout(mut self, timeout: Duration) -> Self {
        self.loader_timeout = timeout;
        self
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn with_stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }

    pub fn with_lease(mut self, lease: LeaseConfig) -> Self {
        self.lease = Some(lease);
        self
    }

    /// The lease actually taken, with `lease_ttl` clamped to outlast a load.
    pub fn effective_lease(&self) -> Option<LeaseConfig> {
        self.lease.as_ref().map(|lease| {
            let floor = self.loader_timeout + LEASE_WRITE_MARGIN;
            LeaseConfig {
                lease_ttl: lease.lease_ttl.max(floor),
                ..lease.clone()
            }
        })
    }

    fn store_ttl(&self, ttl: Duration) -> Duration {
        match self.stale_policy {
            StalePolicy::Propagate => ttl,
            StalePolicy::ServeStale => ttl + self.stale_grace,
        }
    }
}

/// How a read was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Fresh entry, no upstream call.
    Hit,
    /// Populated by a refresh (this caller's, a coalesced one, or a peer instance's).
    Refreshed,
    /// Refresh failed; an older entry was served under [`StalePolicy::ServeStale`].
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead {
    pub records: Vec<Record>,
    pub cached_at_ms: u64,
    pub status: CacheStatus,
}

impl CacheRead {
    fn from_entry(entry: CacheEntry, status: CacheStatus) -> Self {
        Self {
            records: entry.value,
            cached_at_ms: entry.cached_at_ms,
            status,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.status == CacheStatus::Stale
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub forced: u64,
    pub loader_calls: u64,
    pub coalesced: u64,
    pub stale_served: u64,
    pub upstream_failures: u64,
    pub backend_errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    forced: AtomicU64,
    loader_calls: AtomicU64,
    coalesced: AtomicU64,
    stale_served: AtomicU64,
    upstream_failures: AtomicU64,
    backend_errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            forced: self.forced.load(Ordering::Relaxed),
            loader_calls: self.loader_calls.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }
}

/// Generic read-through cache over a [`CacheBackend`].
///
/// Hits never touch the loader or write to the store. Misses and forced
/// reads run one refresh per key at a time within the process (and, with a
/// [`LeaseConfig`], across instances sharing the store); the refreshed value
/// replaces the stored one wholesale.
pub struct FieldCache {
    config: CacheConfig,
    keys: CacheKeyBuilder,
    backend: Arc<dyn CacheBackend>,
    flights: SingleFlight<CacheEntry>,
    stats: Arc<AtomicStats>,
}

impl FieldCache {
    pub fn new(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        let keys = match config.key_prefix {
            Some(ref p) => CacheKeyBuilder::new().with_prefix(p.clone()),
            None => CacheKeyBuilder::new(),
        };
        Self {
            config,
            keys,
            backend,
            flights: SingleFlight::new(),
            stats: Arc::new(AtomicStats::default()),
        }
    }

    /// Returns the records of `resource`, refreshing from upstream when the stored
    /// entry is absent, expired, or `force_refresh` is set.
    pub async fn get_field_cache(&self, resource: &ResourceCacheConfig, force_refresh: bool) -> Result<CacheRead> {
        resource.validate()?;
        let outcome = self.read_through(resource, force_refresh).await;
        if let Err(ref e) = outcome {
            if e.is_backend_failure() {
                self.stats.backend_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        outcome
    }

    async fn read_through(&self, resource: &ResourceCacheConfig, force_refresh: bool) -> Result<CacheRead> {
        let key = self.keys.entry_key(resource.key());
        let mut prior = None;
        if force_refresh {
            self.stats.forced.fetch_add(1, Ordering::Relaxed);
            debug!(resource = resource.key(), forced = true, "field cache refresh requested");
        } else {
            if let Some(entry) = read_entry(self.backend.as_ref(), &key).await? {
                if entry.is_fresh(resource.ttl(), now_ms()) {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(resource = resource.key(), records = entry.value.len(), "field cache hit");
                    return Ok(CacheRead::from_entry(entry, CacheStatus::Hit));
                }
                prior = Some(entry);
            }
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }

        match self.refresh(resource, &key).await {
            Ok(entry) => Ok(CacheRead::from_entry(entry, CacheStatus::Refreshed)),
            Err(err) if err.is_upstream_failure() && self.config.stale_policy == StalePolicy::ServeStale => {
                let fallback = match prior {
                    Some(entry) => Some(entry),
                    // A failed fallback read must not mask the upstream error.
                    None => read_entry(self.backend.as_ref(), &key).await.ok().flatten(),
                };
                match fallback {
                    Some(entry) => {
                        self.stats.stale_served.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            resource = resource.key(),
                            error = %err,
                            age_ms = entry.age_ms(now_ms()),
                            "serving stale field cache entry"
                        );
                        Ok(CacheRead::from_entry(entry, CacheStatus::Stale))
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn refresh(&self, resource: &ResourceCacheConfig, key: &CacheKey) -> Result<CacheEntry> {
        let job = RefreshJob {
            resource: resource.clone(),
            key: key.clone(),
            lease_key: self.keys.lease_key(resource.key()),
            backend: Arc::clone(&self.backend),
            stats: Arc::clone(&self.stats),
            loader_timeout: self.config.loader_timeout,
            store_ttl: self.config.store_ttl(resource.ttl()),
            lease: self.config.effective_lease(),
        };
        let (outcome, role) = self.flights.run(key.as_str(), move || job.run().boxed()).await;
        if role == FlightRole::Follower {
            self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(resource = resource.key(), "joined in-flight refresh");
        }
        outcome
    }

    /// Reads and deserializes each record into `T`.
    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        resource: &ResourceCacheConfig,
        force_refresh: bool,
    ) -> Result<(Vec<T>, CacheStatus)> {
        let read = self.get_field_cache(resource, force_refresh).await?;
        let items = read
            .records
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<T>, _>>()?;
        Ok((items, read.status))
    }

    /// Stored entry for `resource`, fresh or not. Never calls the loader.
    pub async fn peek(&self, resource: &ResourceCacheConfig) -> Result<Option<CacheEntry>> {
        resource.validate()?;
        read_entry(self.backend.as_ref(), &self.keys.entry_key(resource.key())).await
    }

    /// Removes the stored entry so the next read goes upstream.
    pub async fn invalidate(&self, resource: &ResourceCacheConfig) -> Result<bool> {
        resource.validate()?;
        let removed = self.backend.delete(&self.keys.entry_key(resource.key())).await?;
        info!(resource = resource.key(), removed, "field cache invalidated");
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

/// `None` for missing or undecodable entries.
async fn read_entry(backend: &dyn CacheBackend, key: &CacheKey) -> Result<Option<CacheEntry>> {
    let Some(bytes) = backend.get(key).await? else {
        return Ok(None);
    };
    match CacheEntry::decode(&bytes) {
        Some(entry) => Ok(Some(entry)),
        None => {
            warn!(key = key.as_str(), bytes = bytes.len(), "discarding undecodable field cache entry");
            Ok(None)
        }
    }
}

enum LeaseOutcome {
    Acquired(String),
    /// Another instance refreshed while we waited.
    PeerRefreshed(CacheEntry),
}

/// Everything one refresh needs, owned so it can run as a shared flight.
struct RefreshJob {
    resource: ResourceCacheConfig,
    key: CacheKey,
    lease_key: CacheKey,
    backend: Arc<dyn CacheBackend>,
    stats: Arc<AtomicStats>,
    loader_timeout: Duration,
    store_ttl: Duration,
    lease: Option<LeaseConfig>,
}

impl RefreshJob {
    async fn run(self) -> Result<CacheEntry> {
        let started_ms = now_ms();
        let token = match self.lease {
            Some(ref lease) => match self.acquire_lease(lease, started_ms).await? {
                LeaseOutcome::Acquired(token) => Some(token),
                LeaseOutcome::PeerRefreshed(entry) => {
                    debug!(resource = self.resource.key(), "peer instance refreshed entry");
                    return Ok(entry);
                }
            },
            None => None,
        };

        let outcome = self.load_and_store().await;
        if let Some(token) = token {
            self.release_lease(&token).await;
        }
        outcome
    }

    async fn load_and_store(&self) -> Result<CacheEntry> {
        let started = Instant::now();
        let records = match self.load().await {
            Ok(records) => records,
            Err(err) => {
                self.stats.upstream_failures.fetch_add(1, Ordering::Relaxed);
                warn!(resource = self.resource.key(), error = %err, "field cache refresh failed");
                return Err(err);
            }
        };

        let entry = CacheEntry::new(records, self.resource.ttl());
        let bytes = entry.encode()?;
        self.backend.set(&self.key, &bytes, self.store_ttl).await?;
        info!(
            resource = self.resource.key(),
            records = entry.value.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "field cache refreshed"
        );
        Ok(entry)
    }

    async fn load(&self) -> Result<Vec<Record>> {
        let ctx = || ErrorContext::new().with_resource(self.resource.key());
        self.stats.loader_calls.fetch_add(1, Ordering::Relaxed);
        let loaded = match tokio::time::timeout(self.loader_timeout, self.resource.loader().load()).await {
            Ok(Ok(records)) => records,
            Ok(Err(err)) if err.is_upstream_failure() => return Err(err),
            Ok(Err(err)) => {
                let source = self.resource.loader().name().to_string();
                return Err(Error::upstream(err.to_string(), ctx().with_source(source)));
            }
            Err(_) => {
                return Err(Error::upstream(
                    format!("loader timed out after {}ms", self.loader_timeout.as_millis()),
                    ctx().with_source("loader_timeout"),
                ))
            }
        };
        match self.resource.transform() {
            Some(transform) => transform(loaded).map_err(|err| {
                Error::upstream(
                    format!("transform rejected records: {}", err.message()),
                    ctx().with_source("transform"),
                )
            }),
            None => Ok(loaded),
        }
    }

    async fn acquire_lease(&self, lease: &LeaseConfig, started_ms: u64) -> Result<LeaseOutcome> {
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + lease.wait_timeout;
        loop {
            if self.backend.set_if_absent(&self.lease_key, token.as_bytes(), lease.lease_ttl).await? {
                return Ok(LeaseOutcome::Acquired(token));
            }
            if let Some(entry) = read_entry(self.backend.as_ref(), &self.key).await? {
                if entry.cached_at_ms >= started_ms {
                    return Ok(LeaseOutcome::PeerRefreshed(entry));
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::refresh_timeout(
                    format!("refresh lease still held after {}ms", lease.wait_timeout.as_millis()),
                    ErrorContext::new().with_resource(self.resource.key()).with_source("lease"),
                ));
            }
            tokio::time::sleep(lease.poll_interval).await;
        }
    }

    async fn release_lease(&self, token: &str) {
        match self.backend.delete_if_equals(&self.lease_key, token.as_bytes()).await {
            Ok(true) => {}
            Ok(false) => warn!(resource = self.resource.key(), "refresh lease expired before release"),
            Err(err) => warn!(resource = self.resource.key(), error = %err, "failed to release refresh lease"),
        }
    }
}
