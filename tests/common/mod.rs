//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use field_cache::cache::{CacheBackend, CacheKey, MemoryCache};
use field_cache::{Error, ErrorContext, Record, RecordLoader, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Loader whose output, latency and failure can be changed between calls.
pub struct ScriptedLoader {
    records: Mutex<Vec<Record>>,
    calls: AtomicUsize,
    fail: AtomicBool,
    delay: Mutex<Duration>,
}

impl ScriptedLoader {
    pub fn new(records: Vec<Record>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn names(names: &[&str]) -> Arc<Self> {
        Self::new(names.iter().map(|n| Value::String(n.to_string())).collect())
    }

    pub fn set_records(&self, records: Vec<Record>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn set_names(&self, names: &[&str]) {
        self.set_records(names.iter().map(|n| Value::String(n.to_string())).collect());
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordLoader for ScriptedLoader {
    async fn load(&self) -> Result<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::upstream(
                "Airtable returned HTTP 503: service unavailable",
                ErrorContext::new().with_source("scripted"),
            ));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Memory store that counts operations.
#[derive(Default)]
pub struct CountingBackend {
    inner: MemoryCache,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
}

impl CountingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for CountingBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn set_if_absent(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete_if_equals(&self, key: &CacheKey, expected: &[u8]) -> Result<bool> {
        self.inner.delete_if_equals(key, expected).await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Store that is unreachable for every operation.
pub struct UnreachableBackend;

fn unreachable_err() -> Error {
    Error::backend("connection refused", ErrorContext::new().with_source("unreachable"))
}

#[async_trait]
impl CacheBackend for UnreachableBackend {
    async fn get(&self, _key: &CacheKey) -> Result<Option<Vec<u8>>> {
        Err(unreachable_err())
    }

    async fn set(&self, _key: &CacheKey, _value: &[u8], _ttl: Duration) -> Result<()> {
        Err(unreachable_err())
    }

    async fn delete(&self, _key: &CacheKey) -> Result<bool> {
        Err(unreachable_err())
    }

    async fn set_if_absent(&self, _key: &CacheKey, _value: &[u8], _ttl: Duration) -> Result<bool> {
        Err(unreachable_err())
    }

    async fn delete_if_equals(&self, _key: &CacheKey, _expected: &[u8]) -> Result<bool> {
        Err(unreachable_err())
    }

    fn name(&self) -> &'static str {
        "unreachable"
    }
}

pub fn names(records: &[Record]) -> Vec<&str> {
    records.iter().filter_map(Value::as_str).collect()
}
