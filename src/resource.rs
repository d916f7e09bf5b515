//! Per-resource cache configuration.
//!
//! A [`ResourceCacheConfig`] pairs plain data (key, TTL) with behavior injected
//! separately: the [`RecordLoader`] that talks to the system of record and an
//! optional pure [`Transform`].

use crate::cache::key::is_valid_resource_key;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One plain key-value record (usually a JSON object).
pub type Record = serde_json::Value;

/// Produces the canonical ordered records of a resource from upstream.
///
/// Implementations must return an error on any upstream failure; an empty
/// vector means "upstream has no records", never "upstream failed".
#[async_trait]
pub trait RecordLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<Record>>;

    /// Short label for logs.
    fn name(&self) -> &str {
        "loader"
    }
}

type LoadFn = dyn Fn() -> BoxFuture<'static, Result<Vec<Record>>> + Send + Sync;

/// Adapts a closure returning a boxed future into a [`RecordLoader`].
pub struct FnLoader {
    name: String,
    f: Box<LoadFn>,
}

impl FnLoader {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Vec<Record>>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

#[async_trait]
impl RecordLoader for FnLoader {
    async fn load(&self) -> Result<Vec<Record>> {
        (self.f)().await
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// Pure normalisation applied to loader output before it is stored.
pub type Transform = Arc<dyn Fn(Vec<Record>) -> Result<Vec<Record>> + Send + Sync>;

#[derive(Clone)]
pub struct ResourceCacheConfig {
    key: String,
    ttl: Duration,
    loader: Arc<dyn RecordLoader>,
    transform: Option<Transform>,
}

impl ResourceCacheConfig {
    pub fn new(key: impl Into<String>, ttl_seconds: u64, loader: Arc<dyn RecordLoader>) -> Self {
        Self {
            key: key.into(),
            ttl: Duration::from_secs(ttl_seconds),
            loader,
            transform: None,
        }
    }

    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Record>) -> Result<Vec<Record>> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn loader(&self) -> &Arc<dyn RecordLoader> {
        &self.loader
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    /// Checked before the backing store is touched.
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(Error::invalid_config(
                "resource key must not be empty",
                ErrorContext::new().with_source("resource_config"),
            ));
        }
        if !is_valid_resource_key(&self.key) {
            return Err(Error::invalid_config(
                "resource key contains whitespace or unsupported characters",
                ErrorContext::new()
                    .with_resource(self.key.clone())
                    .with_source("resource_config"),
            ));
        }
        if self.ttl.as_secs() == 0 {
            return Err(Error::invalid_config(
                "ttl_seconds must be greater than zero",
                ErrorContext::new()
                    .with_resource(self.key.clone())
                    .with_source("resource_config"),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ResourceCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCacheConfig")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("loader", &self.loader.name())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    fn static_loader() -> Arc<dyn RecordLoader> {
        Arc::new(FnLoader::new("static", || {
            async { Ok(vec![json!("Alice")]) }.boxed()
        }))
    }

    #[test]
    fn rejects_empty_key_and_zero_ttl() {
        let err = ResourceCacheConfig::new("", 300, static_loader())
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        let err = ResourceCacheConfig::new("agents", 0, static_loader())
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        assert!(ResourceCacheConfig::new("agents", 300, static_loader())
            .validate()
            .is_ok());
    }

    #[tokio::test]
    async fn fn_loader_delegates() {
        let loader = static_loader();
        assert_eq!(loader.name(), "static");
        assert_eq!(loader.load().await.unwrap(), vec![json!("Alice")]);
    }
}
