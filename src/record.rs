//! Row and record types that flow through an import.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One spreadsheet row: column label -> raw cell value, in column order.
pub type Row = IndexMap<String, String>;

/// How the record sink should interpret a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Already in storage form (canonical dates, reference ids)
    Raw,
    /// Human-facing value the sink may translate
    Display,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: String,
    pub kind: ValueKind,
}

impl FieldValue {
    pub fn raw(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: ValueKind::Raw,
        }
    }

    pub fn display(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: ValueKind::Display,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Target record assembled from one row, keyed by destination field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedRecord {
    fields: IndexMap<String, FieldValue>,
}

impl ResolvedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any earlier value for it.
    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|v| v.value.as_str())
    }

    pub fn get_value(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Plain field -> value view, dropping the value kinds.
    pub fn to_values(&self) -> IndexMap<String, String> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }
}
