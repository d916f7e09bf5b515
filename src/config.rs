//! Settings file and environment configuration.
//!
//! Settings are read from YAML (path from `FIELD_CACHE_CONFIG` or passed
//! explicitly); every field has a default, and a handful of environment
//! variables override the file.

use crate::airtable::FieldSpec;
use crate::cache::{CacheConfig, LeaseConfig, StalePolicy, LEASE_WRITE_MARGIN};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "FIELD_CACHE_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldCacheSettings {
    pub key_prefix: String,
    pub loader_timeout_secs: u64,
    pub stale_policy: StalePolicy,
    pub stale_grace_secs: u64,
    pub distributed_lock: LockSettings,
    pub http: HttpSettings,
    pub airtable: AirtableSettings,
    pub resources: Vec<ResourceSettings>,
}

impl Default for FieldCacheSettings {
    fn default() -> Self {
        Self {
            key_prefix: "command-center".to_string(),
            loader_timeout_secs: 15,
            stale_policy: StalePolicy::Propagate,
            stale_grace_secs: 3600,
            distributed_lock: LockSettings::default(),
            http: HttpSettings::default(),
            airtable: AirtableSettings::default(),
            resources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub enabled: bool,
    pub lease_ttl_ms: u64,
    pub wait_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            lease_ttl_ms: 30_000,
            wait_timeout_ms: 35_000,
            poll_interval_ms: 100,
        }
    }
}

/// Cache-Control values the route handlers emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub public_max_age_secs: u64,
    pub stale_while_revalidate_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            public_max_age_secs: 60,
            stale_while_revalidate_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AirtableSettings {
    pub base_url: String,
    pub base_id: String,
    /// Name of the environment variable holding the personal access token.
    pub api_key_env: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
}

impl Default for AirtableSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.airtable.com/v0".to_string(),
            base_id: String::new(),
            api_key_env: "AIRTABLE_API_KEY".to_string(),
            page_size: 100,
            request_timeout_secs: 30,
        }
    }
}

/// One cacheable Airtable-backed resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSettings {
    pub key: String,
    pub ttl_seconds: u64,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_formula: Option<String>,
    /// Empty means pass every Airtable field through unchanged.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Append a fingerprint of table/view/formula/fields to the store key.
    #[serde(default = "default_true")]
    pub fingerprint: bool,
}

fn default_true() -> bool {
    true
}

fn config_err(msg: impl Into<String>, details: Option<String>) -> Error {
    let mut ctx = ErrorContext::new().with_source("settings");
    if let Some(d) = details {
        ctx = ctx.with_details(d);
    }
    Error::configuration(msg, ctx)
}

impl FieldCacheSettings {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| config_err(format!("invalid settings YAML: {}", e), None))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            config_err(
                format!("cannot read settings file: {}", e),
                Some(path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Settings file named by `FIELD_CACHE_CONFIG` (defaults when unset), with
    /// environment overrides applied and validated.
    pub fn from_env() -> Result<Self> {
        let mut settings = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(prefix) = lookup("FIELD_CACHE_KEY_PREFIX") {
            self.key_prefix = prefix;
        }
        if let Some(secs) = lookup("FIELD_CACHE_LOADER_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            self.loader_timeout_secs = secs;
        }
        if let Some(policy) = lookup("FIELD_CACHE_STALE_POLICY") {
            match policy.trim() {
                "propagate" => self.stale_policy = StalePolicy::Propagate,
                "serve_stale" => self.stale_policy = StalePolicy::ServeStale,
                other => tracing::warn!(value = other, "ignoring unknown FIELD_CACHE_STALE_POLICY"),
            }
        }
        if let Some(url) = lookup("AIRTABLE_BASE_URL") {
            self.airtable.base_url = url;
        }
        if let Some(id) = lookup("AIRTABLE_BASE_ID") {
            self.airtable.base_id = id;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.loader_timeout_secs == 0 {
            return Err(config_err("loader_timeout_secs must be greater than zero", None));
        }
        if self.distributed_lock.enabled
            && (self.distributed_lock.lease_ttl_ms == 0 || self.distributed_lock.poll_interval_ms == 0)
        {
            return Err(config_err(
                "distributed_lock lease_ttl_ms and poll_interval_ms must be greater than zero",
                None,
            ));
        }
        if self.distributed_lock.enabled {
            let floor = Duration::from_secs(self.loader_timeout_secs) + LEASE_WRITE_MARGIN;
            if Duration::from_millis(self.distributed_lock.lease_ttl_ms) < floor {
                return Err(config_err(
                    format!(
                        "distributed_lock.lease_ttl_ms must be at least {}ms (loader_timeout_secs plus write margin)",
                        floor.as_millis()
                    ),
                    None,
                ));
            }
        }
        let mut seen = HashSet::new();
        for resource in &self.resources {
            if resource.key.trim().is_empty() {
                return Err(config_err("resource key must not be empty", None));
            }
            if !seen.insert(resource.key.as_str()) {
                return Err(config_err("duplicate resource key", Some(resource.key.clone())));
            }
            if resource.ttl_seconds == 0 {
                return Err(config_err("ttl_seconds must be greater than zero", Some(resource.key.clone())));
            }
            if resource.table.trim().is_empty() {
                return Err(config_err("table must not be empty", Some(resource.key.clone())));
            }
        }
        Ok(())
    }

    pub fn resource(&self, key: &str) -> Option<&ResourceSettings> {
        self.resources.iter().find(|r| r.key == key)
    }

    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::new()
            .with_key_prefix(self.key_prefix.clone())
            .with_loader_timeout(Duration::from_secs(self.loader_timeout_secs))
            .with_stale_policy(self.stale_policy)
            .with_stale_grace(Duration::from_secs(self.stale_grace_secs));
        if self.distributed_lock.enabled {
            config = config.with_lease(LeaseConfig {
                lease_ttl: Duration::from_millis(self.distributed_lock.lease_ttl_ms),
                wait_timeout: Duration::from_millis(self.distributed_lock.wait_timeout_ms),
                poll_interval: Duration::from_millis(self.distributed_lock.poll_interval_ms),
            });
        }
        config
    }
}
