//! Document indexer.
//!
//! Scans a parsed document once and produces a [`DocumentIndex`]: the
//! shared [`Skeleton`] plus one ordered identifier → record map per
//! collection. Records without a usable identifier are skipped with a
//! warning; they are neither chunked nor addressable by fixes.
//!
//! # Skeleton
//!
//! The skeleton is what every chunk sees of the rest of the document:
//!
//! - every top-level scalar field (timezone, difficulty tag, title, …),
//! - the identifiers of all records in both collections,
//! - up to [`TIMESTAMP_SAMPLE_LIMIT`] timestamps found in the candidate
//!   timestamp fields, in document order.
//!
//! Only strict ISO-8601 timestamps with an explicit numeric UTC offset
//! (`2024-01-01T10:00:00+00:00`) are sampled.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::CheckError;
use crate::models::{DocumentSchema, RecordKind};

/// Maximum number of timestamps sampled into the skeleton.
pub const TIMESTAMP_SAMPLE_LIMIT: usize = 50;

fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{1,9})?[+-]\d{2}:\d{2}$")
            .expect("timestamp pattern is valid")
    })
}

/// Returns true for `YYYY-MM-DDTHH:MM:SS[.fff]±HH:MM` values that also
/// denote a real instant.
pub fn is_strict_timestamp(value: &str) -> bool {
    timestamp_pattern().is_match(value) && chrono::DateTime::parse_from_rfc3339(value).is_ok()
}

/// Identifier → record map that remembers document order.
#[derive(Debug, Clone, Default)]
pub struct RecordMap {
    order: Vec<String>,
    records: HashMap<String, Value>,
}

impl RecordMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record. Returns `false` (and keeps the first record) when
    /// the identifier is already present.
    pub fn insert(&mut self, id: String, record: Value) -> bool {
        if self.records.contains_key(&id) {
            return false;
        }
        self.order.push(id.clone());
        self.records.insert(id, record);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Identifiers in document order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// `(id, record)` pairs in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| (id.as_str(), r)))
    }
}

/// Compact summary of a document shared read-only by every chunk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Skeleton {
    pub metadata: Map<String, Value>,
    pub text_record_ids: Vec<String>,
    pub media_record_ids: Vec<String>,
    pub timestamps: Vec<String>,
}

impl Skeleton {
    /// Serialized size in bytes, as it appears inside a scoped view.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }
}

/// Result of indexing one document.
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    pub skeleton: Skeleton,
    pub text: RecordMap,
    pub media: RecordMap,
}

impl DocumentIndex {
    pub fn records(&self, kind: RecordKind) -> &RecordMap {
        match kind {
            RecordKind::Text => &self.text,
            RecordKind::Media => &self.media,
        }
    }

    pub fn record_count(&self) -> usize {
        self.text.len() + self.media.len()
    }
}

/// Parse raw document text and index it.
///
/// Fails only when the text is not a JSON object or a collection key holds
/// something other than an array.
pub fn index_raw(raw: &str, schema: &DocumentSchema) -> Result<(Value, DocumentIndex), CheckError> {
    let document: Value = serde_json::from_str(raw)
        .map_err(|e| CheckError::MalformedDocument(format!("invalid JSON: {}", e)))?;
    let index = index_document(&document, schema)?;
    Ok((document, index))
}

/// Index an already-parsed document.
pub fn index_document(document: &Value, schema: &DocumentSchema) -> Result<DocumentIndex, CheckError> {
    let root = document.as_object().ok_or_else(|| {
        CheckError::MalformedDocument("top-level value must be an object".to_string())
    })?;

    let mut index = DocumentIndex::default();

    for (key, value) in root {
        if key == &schema.text_collection || key == &schema.media_collection {
            continue;
        }
        if !value.is_object() && !value.is_array() {
            index.skeleton.metadata.insert(key.clone(), value.clone());
        }
    }

    for kind in RecordKind::ALL {
        let key = schema.collection_key(kind);
        let records = match root.get(key) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(CheckError::MalformedDocument(format!(
                    "collection '{}' must be an array",
                    key
                )))
            }
        };

        let mut map = RecordMap::new();
        for (position, record) in records.iter().enumerate() {
            let id = match record_id(record, &schema.id_field) {
                Some(id) => id,
                None => {
                    tracing::warn!(
                        collection = key,
                        position,
                        "skipping record without '{}'",
                        schema.id_field
                    );
                    continue;
                }
            };

            for field in &schema.timestamp_fields {
                if index.skeleton.timestamps.len() >= TIMESTAMP_SAMPLE_LIMIT {
                    break;
                }
                if let Some(ts) = record.get(field).and_then(Value::as_str) {
                    if is_strict_timestamp(ts) {
                        index.skeleton.timestamps.push(ts.to_string());
                    }
                }
            }

            if !map.insert(id.clone(), record.clone()) {
                tracing::warn!(collection = key, id = %id, "duplicate record id, keeping first");
            }
        }

        match kind {
            RecordKind::Text => {
                index.skeleton.text_record_ids = map.ids().to_vec();
                index.text = map;
            }
            RecordKind::Media => {
                index.skeleton.media_record_ids = map.ids().to_vec();
                index.media = map;
            }
        }
    }

    Ok(index)
}

/// Non-empty string identifier of a record, if any.
pub fn record_id(record: &Value, id_field: &str) -> Option<String> {
    record
        .get(id_field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
