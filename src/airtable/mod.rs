//! Airtable access: the loader side of the field cache.
//!
//! [`AirtableLoader`] implements [`RecordLoader`](crate::resource::RecordLoader)
//! for one table. Records come back in the order Airtable lists them, across
//! all pages, shaped by an explicit [`FieldMapping`]. Any upstream problem
//! (transport error, non-2xx status, malformed body, missing required field)
//! is an `UpstreamFetch` error; an empty table is the only way to get an
//! empty result.

mod client;
mod loader;
mod mapping;

pub use client::{AirtableClient, AirtableRecord, ListOptions};
pub use loader::AirtableLoader;
pub use mapping::{FieldKind, FieldMapping, FieldSpec};
