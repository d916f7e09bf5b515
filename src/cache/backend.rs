//! Backing store implementations.

use super::key::CacheKey;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct StoredValue {
    data: Vec<u8>,
    created_at: Instant,
    ttl: Duration,
    last_accessed: Instant,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            data,
            created_at: now,
            ttl,
            last_accessed: now,
        }
    }
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// Key/value store the field cache sits on.
///
/// Every operation is atomic at key granularity. `ttl` is the store-native
/// expiry; freshness is decided by the service, not here.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    /// Whole-value overwrite.
    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    /// Writes only when no live value exists. Returns whether the write happened.
    async fn set_if_absent(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<bool>;
    /// Deletes only when the stored value equals `expected`.
    async fn delete_if_equals(&self, key: &CacheKey, expected: &[u8]) -> Result<bool>;
    fn name(&self) -> &'static str;
}

/// In-process store with native TTL and least-recently-used eviction.
///
/// Suits single-instance deployments and tests; the single-flight guarantee
/// then holds for the whole deployment.
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries: max_entries.max(1),
        }
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredValue>>> {
        self.entries.write().map_err(|_| {
            Error::backend(
                "memory store lock poisoned",
                ErrorContext::new().with_source("memory_backend"),
            )
        })
    }

    fn evict_if_needed(&self, entries: &mut HashMap<String, StoredValue>) {
        entries.retain(|_, e| !e.is_expired());
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                entries.remove(&k);
            } else {
                break;
            }
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| !e.is_expired()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let mut entries = self.write()?;
        if let Some(entry) = entries.get_mut(key.as_str()) {
            if entry.is_expired() {
                entries.remove(key.as_str());
                return Ok(None);
            }
            entry.last_accessed = Instant::now();
            return Ok(Some(entry.data.clone()));
        }
        Ok(None)
    }
    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.write()?;
        if !entries.contains_key(key.as_str()) {
            self.evict_if_needed(&mut entries);
        }
        entries.insert(key.full.clone(), StoredValue::new(value.to_vec(), ttl));
        Ok(())
    }
    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.write()?.remove(key.as_str()).is_some())
    }
    async fn set_if_absent(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut entries = self.write()?;
        let live = entries
            .get(key.as_str())
            .map(|e| !e.is_expired())
            .unwrap_or(false);
        if live {
            return Ok(false);
        }
        if !entries.contains_key(key.as_str()) {
            self.evict_if_needed(&mut entries);
        }
        entries.insert(key.full.clone(), StoredValue::new(value.to_vec(), ttl));
        Ok(true)
    }
    async fn delete_if_equals(&self, key: &CacheKey, expected: &[u8]) -> Result<bool> {
        let mut entries = self.write()?;
        let matches = entries
            .get(key.as_str())
            .map(|e| !e.is_expired() && e.data == expected)
            .unwrap_or(false);
        if matches {
            entries.remove(key.as_str());
        }
        Ok(matches)
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}
