//! Stored cache entry.

use crate::resource::Record;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One resource's records as written to the backing store.
///
/// Always replaced wholesale; never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Records in upstream order.
    pub value: Vec<Record>,
    /// Unix epoch milliseconds of the successful population.
    pub cached_at_ms: u64,
    /// Freshness window the entry was written with.
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn new(value: Vec<Record>, ttl: Duration) -> Self {
        Self::at(value, now_ms(), ttl)
    }

    pub fn at(value: Vec<Record>, cached_at_ms: u64, ttl: Duration) -> Self {
        Self {
            value,
            cached_at_ms,
            ttl_secs: ttl.as_secs(),
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.cached_at_ms)
    }

    /// Fresh while age < ttl. `ttl` is the resource's current TTL, so shortening
    /// a TTL in config takes effect on entries written under the old one.
    pub fn is_fresh(&self, ttl: Duration, now_ms: u64) -> bool {
        u128::from(self.age_ms(now_ms)) < ttl.as_millis()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// `None` for payloads that do not parse as an entry.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}
