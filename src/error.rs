//! Error types shared by the import runtime.
//!
//! Only conditions that abort a run are represented here. Per-cell problems
//! (an unmatched lookup, an unknown extension) are not errors: the resolver
//! returns an empty value and writes a diagnostic to the run log.

use crate::mapping::MalformedSpecError;
use crate::transform_registry::ExtensionError;

/// Failure reported by an external collaborator (store, row source, log sink).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid encoded query '{query}': {reason}")]
    InvalidQuery { query: String, reason: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Fatal, run-aborting error.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("{0} ID is required.")]
    InvalidId(&'static str),

    #[error("Import request not found: {0}")]
    RequestNotFound(String),

    #[error("Invalid import configuration ID: {0}")]
    ConfigNotFound(String),

    #[error("Record {0} does not have any valid spreadsheet attachments to be imported.")]
    NoAttachment(String),

    #[error("Malformed mapping configuration: {0}")]
    MalformedSpec(#[from] MalformedSpecError),

    #[error("Please configure the date format in the import configuration record.")]
    MissingDateFormat,

    #[error("Unsupported date format '{format}': {reason}")]
    InvalidDateFormat { format: String, reason: String },

    #[error("The spreadsheet and the mapping configuration need to have at least the mandatory fields: {}", .missing.join(", "))]
    MissingMandatoryField { missing: Vec<String> },

    #[error("Extension '{identifier}' failed: {source}")]
    Extension {
        identifier: String,
        #[source]
        source: ExtensionError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
