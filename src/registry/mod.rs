//! Resource registry: resource name → cache config, built once at startup.

use std::collections::btree_map::{self, BTreeMap};
use std::sync::Arc;

use crate::airtable::{AirtableClient, AirtableLoader};
use crate::cache::key::fingerprint;
use crate::config::{FieldCacheSettings, ResourceSettings};
use crate::resource::{RecordLoader, ResourceCacheConfig};
use crate::{Error, ErrorContext, Result};

/// Every cacheable resource the application serves, by name.
///
/// Route handlers look resources up here instead of holding their own
/// configs, so each resource has exactly one key, TTL and loader.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<String, ResourceCacheConfig>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource under `name`. Names are unique; the config is validated.
    pub fn register(&mut self, name: impl Into<String>, config: ResourceCacheConfig) -> Result<()> {
        let name = name.into();
        config.validate()?;
        match self.resources.entry(name) {
            btree_map::Entry::Occupied(e) => Err(Error::invalid_config(
                "resource registered twice",
                ErrorContext::new().with_resource(e.key().clone()).with_source("registry"),
            )),
            btree_map::Entry::Vacant(e) => {
                e.insert(config);
                Ok(())
            }
        }
    }

    pub fn with(mut self, name: impl Into<String>, config: ResourceCacheConfig) -> Result<Self> {
        self.register(name, config)?;
        Ok(self)
    }

    /// Builds one config per settings entry, with loaders from `make_loader`.
    pub fn from_settings_with<F>(settings: &FieldCacheSettings, mut make_loader: F) -> Result<Self>
    where
        F: FnMut(&ResourceSettings) -> Result<Arc<dyn RecordLoader>>,
    {
        settings.validate()?;
        let mut registry = Self::new();
        for resource in &settings.resources {
            let loader = make_loader(resource)?;
            let config = ResourceCacheConfig::new(store_key(resource), resource.ttl_seconds, loader);
            registry.register(resource.key.clone(), config)?;
        }
        Ok(registry)
    }

    /// Airtable-backed registry: every resource loads through `client`.
    pub fn from_settings(settings: &FieldCacheSettings, client: Arc<AirtableClient>) -> Result<Self> {
        let page_size = settings.airtable.page_size;
        Self::from_settings_with(settings, |resource| {
            let loader = AirtableLoader::from_settings(Arc::clone(&client), resource, page_size)?;
            Ok(Arc::new(loader) as Arc<dyn RecordLoader>)
        })
    }

    pub fn get(&self, name: &str) -> Option<&ResourceCacheConfig> {
        self.resources.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceCacheConfig)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Store slot for a configured resource: its name, plus a fingerprint of the
/// upstream query shape unless disabled.
pub fn store_key(resource: &ResourceSettings) -> String {
    if !resource.fingerprint {
        return resource.key.clone();
    }
    let mut params = BTreeMap::new();
    params.insert("table".to_string(), resource.table.clone());
    if let Some(ref view) = resource.view {
        params.insert("view".to_string(), view.clone());
    }
    if let Some(ref formula) = resource.filter_formula {
        params.insert("formula".to_string(), formula.clone());
    }
    if !resource.fields.is_empty() {
        params.insert(
            "fields".to_string(),
            serde_json::to_string(&resource.fields).unwrap_or_default(),
        );
    }
    format!("{}:{}", resource.key, fingerprint(&params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::FnLoader;
    use futures::FutureExt;

    fn loader() -> Arc<dyn RecordLoader> {
        Arc::new(FnLoader::new("empty", || async { Ok(vec![]) }.boxed()))
    }

    fn settings() -> FieldCacheSettings {
        FieldCacheSettings::from_yaml_str(
            r#"
resources:
  - key: agents
    ttl_seconds: 300
    table: Agents
    view: Active
  - key: lead-sources
    ttl_seconds: 600
    table: Lead Sources
    fingerprint: false
"#,
        )
        .unwrap()
    }

    #[test]
    fn register_rejects_duplicates_and_invalid_configs() {
        let mut registry = ResourceRegistry::new();
        registry.register("agents", ResourceCacheConfig::new("agents", 300, loader())).unwrap();
        let dup = registry.register("agents", ResourceCacheConfig::new("agents", 60, loader()));
        assert!(matches!(dup, Err(Error::InvalidConfig { .. })));
        let bad = registry.register("leads", ResourceCacheConfig::new("leads", 0, loader()));
        assert!(bad.is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn builds_from_settings_with_fingerprinted_keys() {
        let registry = ResourceRegistry::from_settings_with(&settings(), |_| Ok(loader())).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["agents", "lead-sources"]);

        let agents = registry.get("agents").unwrap();
        assert!(agents.key().starts_with("agents:"));
        assert_eq!(agents.key().len(), "agents:".len() + 12);
        assert_eq!(agents.ttl().as_secs(), 300);
        assert_eq!(registry.get("lead-sources").unwrap().key(), "lead-sources");
    }

    #[test]
    fn changing_the_view_changes_the_slot() {
        let mut s = settings();
        let before = store_key(&s.resources[0]);
        s.resources[0].view = Some("All".to_string());
        assert_ne!(before, store_key(&s.resources[0]));
    }
}
