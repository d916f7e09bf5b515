use super::client::{AirtableClient, ListOptions};
use super::mapping::FieldMapping;
use crate::config::ResourceSettings;
use crate::resource::{Record, RecordLoader};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Loads one table (optionally a view/formula) and maps each record through a [`FieldMapping`].
pub struct AirtableLoader {
    name: String,
    client: Arc<AirtableClient>,
    table: String,
    options: ListOptions,
    mapping: FieldMapping,
}

impl AirtableLoader {
    pub fn new(client: Arc<AirtableClient>, table: impl Into<String>, mapping: FieldMapping) -> Self {
        let table = table.into();
        let options = ListOptions { fields: mapping.source_fields(), ..Default::default() };
        Self { name: format!("airtable:{}", table), client, table, options, mapping }
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.options.view = Some(view.into());
        self
    }

    pub fn with_filter_formula(mut self, formula: impl Into<String>) -> Self {
        self.options.filter_by_formula = Some(formula.into());
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.options.page_size = Some(size);
        self
    }

    pub fn from_settings(client: Arc<AirtableClient>, resource: &ResourceSettings, page_size: u32) -> Result<Self> {
        let mapping = if resource.fields.is_empty() {
            FieldMapping::passthrough()
        } else {
            FieldMapping::new(resource.fields.clone())?
        };
        let mut loader = Self::new(client, resource.table.clone(), mapping).with_page_size(page_size);
        if let Some(ref view) = resource.view {
            loader = loader.with_view(view.clone());
        }
        if let Some(ref formula) = resource.filter_formula {
            loader = loader.with_filter_formula(formula.clone());
        }
        Ok(loader)
    }
}

#[async_trait]
impl RecordLoader for AirtableLoader {
    async fn load(&self) -> Result<Vec<Record>> {
        let raw = self.client.list_records(&self.table, &self.options).await?;
        self.mapping.map_records(&raw)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
