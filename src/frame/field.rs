//! Field definitions for streaming frames
//!
//! A frame is a set of named, typed columns. Cells are JSON scalars
//! (`serde_json::Value`), with JSON `null` standing in for an undefined
//! cell, so back-filled history for late-created fields serializes naturally.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Scalar type of a field's values.
///
/// Field identity for schema-compatibility checks is the `(name, type)`
/// pair, compared positionally across packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Millisecond epoch timestamps; the first time field drives delta trimming
    Time,
    Number,
    String,
    Boolean,
    Other,
}

/// Schema of a single field, without its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            labels: None,
            config: Value::Null,
        }
    }

    /// True when `other` refers to the same logical field
    pub fn matches(&self, other: &FieldSchema) -> bool {
        self.name == other.name && self.field_type == other.field_type
    }
}

/// A field together with its growable value column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(flatten)]
    pub schema: FieldSchema,
    pub values: Vec<Value>,
}

impl Field {
    /// Creates an empty field from a schema.
    pub fn from_schema(schema: FieldSchema) -> Self {
        Self {
            schema,
            values: Vec::new(),
        }
    }

    /// Creates a field back-filled with `len` undefined cells.
    pub fn backfilled(schema: FieldSchema, len: usize) -> Self {
        Self {
            schema,
            values: vec![Value::Null; len],
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn field_type(&self) -> FieldType {
        self.schema.field_type
    }
}

/// Name-based field filter, as carried by a view request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub fields: Vec<String>,
}

impl FieldFilter {
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, schema: &FieldSchema) -> bool {
        self.fields.iter().any(|name| name == &schema.name)
    }
}

/// Parses a label-group key such as `host=a,region=eu` into a label map.
///
/// An unparsable key is preserved under a single `labels` entry so the
/// group remains addressable.
pub(crate) fn parse_label_key(key: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    if key.is_empty() {
        return labels;
    }
    for pair in key.split(',') {
        match pair.split_once('=') {
            Some((k, v)) => {
                labels.insert(k.trim().to_string(), v.trim().to_string());
            }
            None => {
                labels.clear();
                labels.insert("labels".to_string(), key.to_string());
                return labels;
            }
        }
    }
    labels
}
