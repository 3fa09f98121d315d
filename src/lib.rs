//! # Sheetmap: Declarative Spreadsheet Import
//!
//! Sheetmap imports spreadsheet rows into a record store by applying a
//! per-field mapping configuration. Each mapping names a source column, a
//! destination field and a transformation strategy.
//!
//! ## Features
//!
//! - **Mapping documents**: JSON arrays of field rules, validated up front
//! - **Six strategies**: `copy`, `date`, `lookup`, `choice`, `dynamic`, `mergeFields`
//! - **Extension registry**: named Rust functions for the `dynamic` strategy
//! - **Partial-failure tolerance**: bad cells resolve to empty values with a
//!   diagnostic; configuration errors abort the run
//! - **Injected collaborators**: storage, attachments and row extraction are
//!   traits, with an in-memory implementation for tests and the CLI
//!
//! ## Example
//!
//! ```json
//! [
//!   { "label": "Severity", "destinationField": "severity", "process": "choice",
//!     "lookupTable": "sys_choice", "lookupQuery": "name=finding^value=$1" },
//!   { "label": "Found On", "destinationField": "found_date", "process": "date" },
//!   { "label": "CVSS", "destinationField": "risk_rating", "process": "dynamic",
//!     "scriptExtension": "cvss.severity" },
//!   { "label": "Tester", "destinationField": "tester", "process": "mergeFields",
//!     "fieldsToMerge": ["First", "Last"] }
//! ]
//! ```

// Core modules
pub mod error;
pub mod mapping;
pub mod record;
pub mod transform_registry;
pub mod extensions;
pub mod serialization;

// Import runtime
pub mod runtime;

// In-memory collaborators and workspace loading
pub mod memory_store;
pub mod config_loader;

// Re-export key types
pub use error::{ImportError, StoreError};
pub use mapping::{FieldMapping, GlobalOptions, MalformedSpecError, MappingSpec, ProcessKind};
pub use record::{FieldValue, ResolvedRecord, Row, ValueKind};
pub use transform_registry::{ExtensionArgs, ExtensionError, ExtensionFn, ExtensionRegistry};

// Re-export runtime types
pub use runtime::{
    Collaborators, FieldResolver, ImportConfig, ImportOrchestrator, ImportOutcome,
    RequestContext, RowValidator, RunContext, RunLog,
};

pub use memory_store::{Attachment, CreatedRecord, MemoryStore, StoredRecord};
pub use config_loader::{load_workspace, Workspace};
pub use serialization::NdjsonWriter;
