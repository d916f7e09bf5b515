use crate::config::AirtableSettings;
use crate::{Error, ErrorContext, Result};
use keyring::Entry;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::env;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Airtable caps `pageSize` at 100.
const MAX_PAGE_SIZE: u32 = 100;
/// Guards against an upstream that keeps handing out offsets.
const MAX_PAGES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AirtableRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(rename = "createdTime", default)]
    pub created_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListPage {
    records: Vec<AirtableRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub view: Option<String>,
    pub filter_by_formula: Option<String>,
    /// Restrict the returned fields; empty returns all.
    pub fields: Vec<String>,
    pub page_size: Option<u32>,
}

impl ListOptions {
    fn query(&self, offset: Option<&str>) -> Vec<(String, String)> {
        let mut q = Vec::new();
        if let Some(ref view) = self.view {
            q.push(("view".to_string(), view.clone()));
        }
        if let Some(ref formula) = self.filter_by_formula {
            q.push(("filterByFormula".to_string(), formula.clone()));
        }
        for field in &self.fields {
            q.push(("fields[]".to_string(), field.clone()));
        }
        if let Some(size) = self.page_size {
            q.push(("pageSize".to_string(), size.clamp(1, MAX_PAGE_SIZE).to_string()));
        }
        if let Some(offset) = offset {
            q.push(("offset".to_string(), offset.to_string()));
        }
        q
    }
}

/// Thin Airtable REST client: list records of a table, all pages, upstream order.
pub struct AirtableClient {
    client: reqwest::Client,
    base_url: String,
    base_id: String,
    api_key: Option<String>,
}

impl AirtableClient {
    /// Token from the configured environment variable, falling back to the OS keyring.
    pub fn new(settings: &AirtableSettings) -> Result<Self> {
        Self::build(settings, Self::get_api_key(&settings.api_key_env))
    }

    /// Explicit token; skips the environment and keyring lookup.
    pub fn with_credentials(settings: &AirtableSettings, api_key: impl Into<String>) -> Result<Self> {
        Self::build(settings, Some(api_key.into()))
    }

    fn build(settings: &AirtableSettings, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| {
                Error::configuration(
                    format!("cannot build HTTP client: {}", e),
                    ErrorContext::new().with_source("airtable_client"),
                )
            })?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            base_id: settings.base_id.clone(),
            api_key,
        })
    }

    fn get_api_key(env_name: &str) -> Option<String> {
        // 1. Try the configured environment variable
        if let Some(key) = env::var(env_name).ok().filter(|k| !k.is_empty()) {
            return Some(key);
        }

        // 2. Try Keyring
        let entry = Entry::new("field-cache", "airtable").ok()?;
        entry.get_password().ok()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn base_id(&self) -> &str {
        &self.base_id
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        let ctx = || ErrorContext::new().with_source("airtable_client").with_details(table.to_string());
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::configuration(format!("invalid Airtable base URL: {}", e), ctx()))?;
        url.path_segments_mut()
            .map_err(|_| Error::configuration("Airtable base URL cannot be a base", ctx()))?
            .pop_if_empty()
            .push(&self.base_id)
            .push(table);
        Ok(url)
    }

    /// Every record of `table`, following `offset` pagination to the end.
    pub async fn list_records(&self, table: &str, options: &ListOptions) -> Result<Vec<AirtableRecord>> {
        let url = self.table_url(table)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut req = self.client.get(url.clone()).query(&options.query(offset.as_deref()));
            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            let resp = req.send().await.map_err(|e| {
                Error::upstream(
                    format!("Airtable request failed: {}", e),
                    ErrorContext::new().with_source("airtable").with_details(table.to_string()),
                )
            })?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.map_err(|e| e.to_string());
                return Err(status_error(table, status.as_u16(), body));
            }

            let body = resp.bytes().await.map_err(|e| {
                Error::upstream(
                    format!("Airtable response body unreadable: {}", e),
                    ErrorContext::new().with_source("airtable").with_details(table.to_string()),
                )
            })?;
            let parsed: ListPage = serde_json::from_slice(&body).map_err(|e| {
                Error::upstream(
                    format!("malformed Airtable response: {}", e),
                    ErrorContext::new().with_source("airtable").with_details(table.to_string()),
                )
            })?;

            debug!(table, page, records = parsed.records.len(), "fetched Airtable page");
            records.extend(parsed.records);

            match parsed.offset {
                Some(next) if offset.as_deref() == Some(next.as_str()) => {
                    return Err(Error::upstream(
                        "Airtable repeated the same pagination offset",
                        ErrorContext::new().with_source("airtable").with_details(table.to_string()),
                    ));
                }
                Some(next) => offset = Some(next),
                None => return Ok(records),
            }
        }

        Err(Error::upstream(
            format!("Airtable pagination exceeded {} pages", MAX_PAGES),
            ErrorContext::new().with_source("airtable").with_details(table.to_string()),
        ))
    }
}

fn status_error(table: &str, status: u16, body: std::result::Result<String, String>) -> Error {
    let body = match body {
        Ok(text) => truncate(&text, 200).to_string(),
        Err(e) => format!("<body unreadable: {}>", e),
    };
    Error::upstream(
        format!("Airtable returned HTTP {}: {}", status, body),
        ErrorContext::new()
            .with_source("airtable")
            .with_details(format!("table={} status={}", table, status)),
    )
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
