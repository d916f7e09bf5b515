//! Explicit field mapping tables from Airtable fields to cached record shape.

use super::client::AirtableRecord;
use crate::resource::Record;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Any,
    Text,
    Number,
    Bool,
    List,
}

impl FieldKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Any => true,
            FieldKind::Text => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::List => value.is_array(),
        }
    }
}

/// One row of a mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Airtable field name.
    pub source: String,
    /// Output name; defaults to `source`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), target: None, required: false, kind: FieldKind::Any }
    }

    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.source)
    }
}

/// Validated mapping table.
///
/// Missing optional fields come out as `null` so every record has the same
/// keys; missing required fields and kind mismatches are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    fields: Vec<FieldSpec>,
}

impl FieldMapping {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        let mut sources = HashSet::new();
        let mut targets = HashSet::new();
        for field in &fields {
            let ctx = || ErrorContext::new().with_source("field_mapping").with_details(field.source.clone());
            if field.source.trim().is_empty() || field.target_name().trim().is_empty() {
                return Err(Error::invalid_config("field names must not be empty", ctx()));
            }
            if field.target_name() == "id" {
                return Err(Error::invalid_config("target name `id` is reserved for the record id", ctx()));
            }
            if !sources.insert(field.source.as_str()) {
                return Err(Error::invalid_config("duplicate source field", ctx()));
            }
            if !targets.insert(field.target_name()) {
                return Err(Error::invalid_config(format!("duplicate target field `{}`", field.target_name()), ctx()));
            }
        }
        Ok(Self { fields })
    }

    /// Copies every field as Airtable returns it.
    pub fn passthrough() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn is_passthrough(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Source names to request from Airtable (`fields[]`); empty for passthrough.
    pub fn source_fields(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.source.clone()).collect()
    }

    pub fn map_record(&self, record: &AirtableRecord) -> Result<Record> {
        let mut out = Map::new();
        out.insert("id".to_string(), Value::String(record.id.clone()));
        if self.is_passthrough() {
            for (name, value) in &record.fields {
                out.insert(name.clone(), value.clone());
            }
            return Ok(Value::Object(out));
        }
        for field in &self.fields {
            let value = match record.fields.get(&field.source) {
                Some(value) if field.kind.accepts(value) => value.clone(),
                Some(value) => {
                    return Err(Error::upstream(
                        format!("field `{}` on record {} is not {:?}: {}", field.source, record.id, field.kind, value),
                        ErrorContext::new().with_source("field_mapping"),
                    ))
                }
                None if field.required => {
                    return Err(Error::upstream(
                        format!("record {} is missing required field `{}`", record.id, field.source),
                        ErrorContext::new().with_source("field_mapping"),
                    ))
                }
                None => Value::Null,
            };
            out.insert(field.target_name().to_string(), value);
        }
        Ok(Value::Object(out))
    }

    pub fn map_records(&self, records: &[AirtableRecord]) -> Result<Vec<Record>> {
        records.iter().map(|r| self.map_record(r)).collect()
    }
}
