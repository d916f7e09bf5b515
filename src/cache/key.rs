//! Cache key derivation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Bumped whenever the stored entry layout changes, so old payloads are never read.
pub const ENTRY_FORMAT_VERSION: &str = "v1";

static RESOURCE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:/-]*$").expect("static regex"));

/// Whether `key` is usable as a resource key (non-empty, no whitespace or control characters).
pub fn is_valid_resource_key(key: &str) -> bool {
    RESOURCE_KEY_RE.is_match(key)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Full key as written to the backing store.
    pub full: String,
    /// Resource key this slot belongs to.
    pub resource: Option<String>,
}

impl CacheKey {
    pub fn new(full: impl Into<String>) -> Self {
        Self { full: full.into(), resource: None }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Builds namespaced store keys for resources and their refresh leases.
///
/// Layout: `<prefix>:fc:<version>:<resource>` for entries and
/// `<prefix>:lock:<resource>` for leases.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    prefix: Option<String>,
}

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let p = prefix.into();
        self.prefix = if p.is_empty() { None } else { Some(p) };
        self
    }

    pub fn entry_key(&self, resource: &str) -> CacheKey {
        let full = match self.prefix {
            Some(ref p) => format!("{}:fc:{}:{}", p, ENTRY_FORMAT_VERSION, resource),
            None => format!("fc:{}:{}", ENTRY_FORMAT_VERSION, resource),
        };
        CacheKey::new(full).with_resource(resource)
    }

    pub fn lease_key(&self, resource: &str) -> CacheKey {
        let full = match self.prefix {
            Some(ref p) => format!("{}:lock:{}", p, resource),
            None => format!("lock:{}", resource),
        };
        CacheKey::new(full).with_resource(resource)
    }
}

impl Default for CacheKeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Short, stable fingerprint of the parameters that shape a resource's upstream query
/// (table, view, formula, mapped fields). Appending it to a resource key means a
/// config change lands in a new slot instead of reading records of the old shape.
pub fn fingerprint(params: &BTreeMap<String, String>) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.finalize().iter().take(6).map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_and_lease_keys_are_namespaced() {
        let keys = CacheKeyBuilder::new().with_prefix("cc");
        assert_eq!(keys.entry_key("agents").as_str(), "cc:fc:v1:agents");
        assert_eq!(keys.lease_key("agents").as_str(), "cc:lock:agents");
        assert_eq!(keys.entry_key("agents").resource.as_deref(), Some("agents"));

        let bare = CacheKeyBuilder::new().with_prefix("");
        assert_eq!(bare.entry_key("agents").as_str(), "fc:v1:agents");
    }

    #[test]
    fn resource_key_validation() {
        assert!(is_valid_resource_key("agents"));
        assert!(is_valid_resource_key("properties:active/v2"));
        assert!(!is_valid_resource_key(""));
        assert!(!is_valid_resource_key(" agents"));
        assert!(!is_valid_resource_key("lead sources"));
    }

    #[test]
    fn fingerprint_is_order_independent_and_short() {
        let mut a = BTreeMap::new();
        a.insert("table".to_string(), "Agents".to_string());
        a.insert("view".to_string(), "Active".to_string());
        let mut b = BTreeMap::new();
        b.insert("view".to_string(), "Active".to_string());
        b.insert("table".to_string(), "Agents".to_string());
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 12);

        b.insert("view".to_string(), "All".to_string());
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
