//! Mapping configuration: the per-field rules that turn a spreadsheet row
//! into a target record.
//!
//! A mapping document is a JSON array of field-mapping objects. Both the
//! camelCase keys (`destinationField`, `lookupQuery`, ...) and the snake_case
//! keys used by older configuration records (`destination_field`,
//! `script_include`, `merge_fields`, ...) are accepted.
//!
//! ```json
//! [
//!   { "label": "Severity", "destinationField": "severity", "process": "choice",
//!     "lookupTable": "sys_choice", "lookupQuery": "name=finding^value=$1" },
//!   { "label": "Found On", "destinationField": "found_date", "process": "date" },
//!   { "label": "Owner", "destinationField": "owner", "process": "mergeFields",
//!     "fieldsToMerge": ["First", "Last"] }
//! ]
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator used by `mergeFields` when `mergeCharacter` is unset.
pub const DEFAULT_MERGE_CHARACTER: &str = " ";

/// Transformation strategy of a single field mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessKind {
    Copy,
    Date,
    Lookup,
    Dynamic,
    Choice,
    MergeFields,
}

impl ProcessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessKind::Copy => "copy",
            ProcessKind::Date => "date",
            ProcessKind::Lookup => "lookup",
            ProcessKind::Dynamic => "dynamic",
            ProcessKind::Choice => "choice",
            ProcessKind::MergeFields => "mergeFields",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "copy" => Ok(ProcessKind::Copy),
            "date" => Ok(ProcessKind::Date),
            "lookup" => Ok(ProcessKind::Lookup),
            "dynamic" => Ok(ProcessKind::Dynamic),
            "choice" => Ok(ProcessKind::Choice),
            "mergeFields" | "merge_fields" => Ok(ProcessKind::MergeFields),
            other => Err(other.to_string()),
        }
    }
}

/// Why a mapping document was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedSpecError {
    #[error("mapping document is not a valid JSON array of mappings: {0}")]
    InvalidJson(String),

    #[error("duplicate mapping label '{0}'")]
    DuplicateLabel(String),

    #[error("mapping '{label}' has unrecognized process '{process}'")]
    UnknownProcess { label: String, process: String },

    #[error("mapping '{label}' merges {count} field(s); at least 2 are required")]
    TooFewMergeFields { label: String, count: usize },

    #[error("mapping '{label}' with process '{process}' requires '{option}'")]
    MissingOption {
        label: String,
        process: ProcessKind,
        option: &'static str,
    },
}

/// One rule describing how a source column becomes a target field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    /// Spreadsheet column label; unique within a mapping document
    pub label: String,

    /// Field on the target record
    pub destination_field: String,

    pub process: ProcessKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_table: Option<String>,

    /// Encoded query template with a `$1` placeholder for the cell value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_query: Option<String>,

    /// Extension identifier in `module.function` form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_extension: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields_to_merge: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_character: Option<String>,
}

impl FieldMapping {
    /// Mapping with only the required keys set.
    pub fn new(
        label: impl Into<String>,
        destination_field: impl Into<String>,
        process: ProcessKind,
    ) -> Self {
        Self {
            label: label.into(),
            destination_field: destination_field.into(),
            process,
            lookup_table: None,
            lookup_query: None,
            script_extension: None,
            fields_to_merge: Vec::new(),
            merge_character: None,
        }
    }

    pub fn merge_separator(&self) -> &str {
        self.merge_character
            .as_deref()
            .unwrap_or(DEFAULT_MERGE_CHARACTER)
    }

    fn check(&self) -> Result<(), MalformedSpecError> {
        let missing = |option: &'static str| MalformedSpecError::MissingOption {
            label: self.label.clone(),
            process: self.process,
            option,
        };

        match self.process {
            ProcessKind::Lookup => {
                if self.lookup_table.is_none() {
                    return Err(missing("lookupTable"));
                }
                if self.lookup_query.is_none() {
                    return Err(missing("lookupQuery"));
                }
            }
            ProcessKind::Choice => {
                if self.lookup_query.is_none() {
                    return Err(missing("lookupQuery"));
                }
            }
            ProcessKind::MergeFields => {
                if self.fields_to_merge.len() < 2 {
                    return Err(MalformedSpecError::TooFewMergeFields {
                        label: self.label.clone(),
                        count: self.fields_to_merge.len(),
                    });
                }
            }
            ProcessKind::Copy | ProcessKind::Date | ProcessKind::Dynamic => {}
        }

        Ok(())
    }
}

/// Run-wide options that accompany a mapping document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalOptions {
    /// Source date pattern, e.g. `MM/dd/yyyy`
    #[serde(default)]
    pub date_format: String,

    #[serde(default)]
    pub target_table: String,

    #[serde(default)]
    pub logging_enabled: bool,
}

/// Parsed, validated mapping configuration. Read-only for the whole run.
#[derive(Debug, Clone, Default)]
pub struct MappingSpec {
    mappings: Vec<FieldMapping>,
    options: GlobalOptions,
}

impl MappingSpec {
    /// Parse a JSON mapping document.
    ///
    /// Rejects duplicate labels, unknown `process` values, merge rules with
    /// fewer than two source fields, and lookup/choice rules without their
    /// query options. Referenced tables and extensions are not checked here.
    pub fn parse(raw: &str) -> Result<Self, MalformedSpecError> {
        let raw_mappings: Vec<RawFieldMapping> = serde_json::from_str(raw)
            .map_err(|e| MalformedSpecError::InvalidJson(e.to_string()))?;

        let mappings = raw_mappings
            .into_iter()
            .map(RawFieldMapping::into_mapping)
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_mappings(mappings)
    }

    /// Build a spec from mappings constructed in code.
    pub fn from_mappings(mappings: Vec<FieldMapping>) -> Result<Self, MalformedSpecError> {
        let mut seen = HashSet::new();
        for mapping in &mappings {
            if !seen.insert(mapping.label.as_str()) {
                return Err(MalformedSpecError::DuplicateLabel(mapping.label.clone()));
            }
            mapping.check()?;
        }

        Ok(Self {
            mappings,
            options: GlobalOptions::default(),
        })
    }

    pub fn with_options(mut self, options: GlobalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &GlobalOptions {
        &self.options
    }

    pub fn all_mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    /// Computed rules that are applied to every row regardless of its columns.
    pub fn merge_field_mappings(&self) -> impl Iterator<Item = &FieldMapping> {
        self.mappings
            .iter()
            .filter(|m| m.process == ProcessKind::MergeFields)
    }

    /// Whether any mapping uses `process`.
    pub fn uses_process(&self, process: ProcessKind) -> bool {
        self.mappings.iter().any(|m| m.process == process)
    }

    pub fn find_by_label(&self, label: &str) -> Option<&FieldMapping> {
        self.mappings.iter().find(|m| m.label == label)
    }

    /// First mapping writing to `field`.
    pub fn find_by_destination_field(&self, field: &str) -> Option<&FieldMapping> {
        self.mappings.iter().find(|m| m.destination_field == field)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Merge list as written in a document: an array, or a comma-separated string.
#[derive(Deserialize)]
#[serde(untagged)]
enum MergeList {
    List(Vec<String>),
    Csv(String),
}

impl MergeList {
    fn into_fields(self) -> Vec<String> {
        let items: Vec<String> = match self {
            MergeList::List(items) => items,
            MergeList::Csv(csv) => csv.split(',').map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFieldMapping {
    label: String,
    #[serde(alias = "destination_field")]
    destination_field: String,
    #[serde(default)]
    process: Option<String>,
    #[serde(default, alias = "lookup_table")]
    lookup_table: Option<String>,
    #[serde(default, alias = "lookup_query")]
    lookup_query: Option<String>,
    #[serde(default, alias = "script_extension", alias = "script_include")]
    script_extension: Option<String>,
    #[serde(default, alias = "fields_to_merge")]
    fields_to_merge: Option<MergeList>,
    #[serde(default, alias = "merge_character")]
    merge_character: Option<String>,
}

impl RawFieldMapping {
    fn into_mapping(self) -> Result<FieldMapping, MalformedSpecError> {
        // Configuration records store unset options as empty strings.
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

        let process = match non_empty(self.process) {
            None => ProcessKind::Copy,
            Some(p) => p.parse().map_err(|process| MalformedSpecError::UnknownProcess {
                label: self.label.clone(),
                process,
            })?,
        };

        Ok(FieldMapping {
            label: self.label,
            destination_field: self.destination_field,
            process,
            lookup_table: non_empty(self.lookup_table),
            lookup_query: non_empty(self.lookup_query),
            script_extension: non_empty(self.script_extension),
            fields_to_merge: self
                .fields_to_merge
                .map(MergeList::into_fields)
                .unwrap_or_default(),
            merge_character: non_empty(self.merge_character),
        })
    }
}
