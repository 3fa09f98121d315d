//! Interfaces to the systems around the import engine.
//!
//! The runtime never talks to a database or a workbook parser directly. It
//! calls these traits, which are implemented by [`crate::MemoryStore`] for
//! tests and the CLI, and by platform adapters elsewhere. All calls are
//! synchronous and complete before the next step of a run begins.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::mapping::GlobalOptions;
use crate::record::{ResolvedRecord, Row};

/// Content types accepted as spreadsheet attachments (xls and xlsx).
pub const SPREADSHEET_CONTENT_TYPES: [&str; 2] = [
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// Table holding the system choice lists.
pub const CHOICE_TABLE: &str = "sys_choice";

/// Field of a choice record returned by a choice lookup.
pub const CHOICE_VALUE_FIELD: &str = "value";

fn default_parent_field() -> String {
    "assessment_request".to_string()
}

/// Record that owns an import and the configuration it uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub record_id: String,
    pub config_id: String,
}

/// Import configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// JSON mapping document
    pub mapping: String,

    #[serde(default)]
    pub date_format: String,

    #[serde(default)]
    pub logging_enabled: bool,

    pub target_table: String,

    /// Field that receives the request id on every created record; empty to skip
    #[serde(default = "default_parent_field")]
    pub parent_field: String,
}

impl ImportConfig {
    pub fn new(mapping: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            mapping: mapping.into(),
            date_format: String::new(),
            logging_enabled: false,
            target_table: target_table.into(),
            parent_field: default_parent_field(),
        }
    }

    pub fn options(&self) -> GlobalOptions {
        GlobalOptions {
            date_format: self.date_format.clone(),
            target_table: self.target_table.clone(),
            logging_enabled: self.logging_enabled,
        }
    }
}

/// Forward-only pass over the rows of one attachment.
pub type Rows<'a> = Box<dyn Iterator<Item = Result<Row, StoreError>> + 'a>;

pub trait RequestSource {
    fn request_context(&self, request_id: &str) -> Result<Option<RequestContext>, StoreError>;
}

pub trait ConfigSource {
    fn import_config(&self, config_id: &str) -> Result<Option<ImportConfig>, StoreError>;
}

pub trait AttachmentLocator {
    /// Newest attachment of `record_id` with a spreadsheet content type.
    fn latest_spreadsheet_attachment(&self, record_id: &str) -> Result<Option<String>, StoreError>;
}

pub trait RowSource {
    fn open_rows(&self, attachment_id: &str) -> Result<Rows<'_>, StoreError>;
}

pub trait ReferenceLookup {
    /// Id of the first record of `table` matching `query`.
    fn find_reference(&self, table: &str, query: &str) -> Result<Option<String>, StoreError>;
}

pub trait ChoiceLookup {
    /// Stored value of the first choice matching `query`.
    fn find_choice_value(&self, query: &str) -> Result<Option<String>, StoreError>;
}

pub trait RecordSink {
    /// Create a record and return its new id.
    fn create_record(&self, table: &str, record: &ResolvedRecord) -> Result<String, StoreError>;
}

pub trait LogSink {
    fn append_run_log(&self, config_id: &str, text: &str) -> Result<(), StoreError>;
}

/// The full set of collaborators needed by one import run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub requests: &'a dyn RequestSource,
    pub configs: &'a dyn ConfigSource,
    pub attachments: &'a dyn AttachmentLocator,
    pub rows: &'a dyn RowSource,
    pub references: &'a dyn ReferenceLookup,
    pub choices: &'a dyn ChoiceLookup,
    pub records: &'a dyn RecordSink,
    pub logs: &'a dyn LogSink,
}

impl<'a> Collaborators<'a> {
    /// Use one backend for every role.
    pub fn from_store<S>(store: &'a S) -> Self
    where
        S: RequestSource
            + ConfigSource
            + AttachmentLocator
            + RowSource
            + ReferenceLookup
            + ChoiceLookup
            + RecordSink
            + LogSink,
    {
        Self {
            requests: store,
            configs: store,
            attachments: store,
            rows: store,
            references: store,
            choices: store,
            records: store,
            logs: store,
        }
    }
}
