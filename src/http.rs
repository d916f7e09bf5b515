//! Route handler helpers.
//!
//! Framework-neutral: each helper returns an [`ApiResponse`] (status,
//! headers, JSON body) that the web layer copies onto its own response type.
//! Authentication happens before these are called.

use crate::cache::{CacheRead, CacheStatus, FieldCache};
use crate::config::HttpSettings;
use crate::registry::ResourceRegistry;
use crate::resource::ResourceCacheConfig;
use crate::Error;
use serde_json::{json, Value};
use tracing::error;

pub const CACHE_CONTROL: &str = "Cache-Control";
pub const X_CACHE: &str = "X-Cache";
const NO_STORE: &str = "no-store";

/// Query parameters of the GET route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshQuery {
    pub force_refresh: bool,
}

impl RefreshQuery {
    /// `forceRefresh=true` forces; any other value, or its absence, does not.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let force_refresh = url::form_urlencoded::parse(query.as_bytes())
            .any(|(k, v)| k == "forceRefresh" && v == "true");
        Self { force_refresh }
    }

    pub fn forced() -> Self {
        Self { force_refresh: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(status: u16, body: Value) -> Self {
        Self { status, headers: vec![("Content-Type".to_string(), "application/json".to_string())], body }
    }

    fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// `{"error": <kind>, "code": <FCxxxx>, "message": <text>}` with the kind's
    /// status and `no-store`.
    pub fn from_error(err: &Error) -> Self {
        let code = err.code();
        let body = json!({ "error": code.body_name(), "code": code.code(), "message": err.to_string() });
        Self::json(code.http_status(), body).with_header(CACHE_CONTROL, NO_STORE)
    }

    fn not_found(resource: &str) -> Self {
        Self::json(404, json!({ "error": "NotFound", "message": format!("unknown resource `{}`", resource) }))
            .with_header(CACHE_CONTROL, NO_STORE)
    }
}

/// Headers policy for successful reads.
fn cache_headers(read: &CacheRead, forced: bool, settings: &HttpSettings) -> (String, &'static str) {
    let x_cache = match (read.status, forced) {
        (CacheStatus::Stale, _) => "STALE",
        (CacheStatus::Hit, _) => "HIT",
        (CacheStatus::Refreshed, true) => "REFRESH",
        (CacheStatus::Refreshed, false) => "MISS",
    };
    let control = if forced {
        NO_STORE.to_string()
    } else if read.is_stale() {
        "no-cache".to_string()
    } else {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            settings.public_max_age_secs, settings.stale_while_revalidate_secs
        )
    };
    (control, x_cache)
}

/// GET `/api/<resource>`.
pub async fn handle_get(
    cache: &FieldCache,
    resource: &ResourceCacheConfig,
    query: RefreshQuery,
    settings: &HttpSettings,
) -> ApiResponse {
    match cache.get_field_cache(resource, query.force_refresh).await {
        Ok(read) => {
            let (control, x_cache) = cache_headers(&read, query.force_refresh, settings);
            ApiResponse::json(200, Value::Array(read.records))
                .with_header(CACHE_CONTROL, control)
                .with_header(X_CACHE, x_cache)
        }
        Err(err) => {
            error!(resource = resource.key(), code = err.code().code(), error = %err, "field cache read failed");
            ApiResponse::from_error(&err)
        }
    }
}

/// POST `/api/<resource>/refresh`: always forced, never cacheable.
pub async fn handle_refresh(
    cache: &FieldCache,
    resource: &ResourceCacheConfig,
    settings: &HttpSettings,
) -> ApiResponse {
    handle_get(cache, resource, RefreshQuery::forced(), settings).await
}

/// GET by resource name, 404 for names the registry does not know.
pub async fn handle_get_by_name(
    registry: &ResourceRegistry,
    cache: &FieldCache,
    name: &str,
    query: RefreshQuery,
    settings: &HttpSettings,
) -> ApiResponse {
    match registry.get(name) {
        Some(resource) => handle_get(cache, resource, query, settings).await,
        None => ApiResponse::not_found(name),
    }
}

/// POST refresh by resource name.
pub async fn handle_refresh_by_name(
    registry: &ResourceRegistry,
    cache: &FieldCache,
    name: &str,
    settings: &HttpSettings,
) -> ApiResponse {
    match registry.get(name) {
        Some(resource) => handle_refresh(cache, resource, settings).await,
        None => ApiResponse::not_found(name),
    }
}
