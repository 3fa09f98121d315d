//! In-memory implementation of every import collaborator.
//!
//! Backs the CLI (seeded from a workspace file, see [`crate::config_loader`])
//! and the test suite. Interior mutability is used for the parts a run
//! writes to (created records and run logs); the store is not `Sync` and is
//! meant for a single run at a time.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::{ResolvedRecord, Row};
use crate::runtime::collaborators::{
    AttachmentLocator, ChoiceLookup, ConfigSource, ImportConfig, LogSink, RecordSink,
    ReferenceLookup, RequestContext, RequestSource, RowSource, Rows, CHOICE_TABLE,
    CHOICE_VALUE_FIELD, SPREADSHEET_CONTENT_TYPES,
};
use crate::runtime::query::EncodedQuery;

/// A row of a reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(default)]
    pub fields: IndexMap<String, String>,
}

impl StoredRecord {
    pub fn new<I, K, V>(id: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A file attached to a request, with its already-extracted rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub id: String,
    pub record_id: String,
    pub content_type: String,
    pub created_on: DateTime<Utc>,
    pub rows: Vec<Row>,
}

/// A record written by an import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedRecord {
    pub id: String,
    pub table: String,
    pub fields: ResolvedRecord,
}

/// A persisted run log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLogEntry {
    pub config_id: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    requests: HashMap<String, RequestContext>,
    configs: HashMap<String, ImportConfig>,
    attachments: Vec<Attachment>,
    tables: RefCell<HashMap<String, Vec<StoredRecord>>>,
    created: RefCell<Vec<CreatedRecord>>,
    run_logs: RefCell<Vec<RunLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_request(&mut self, request_id: impl Into<String>, context: RequestContext) {
        self.requests.insert(request_id.into(), context);
    }

    pub fn insert_config(&mut self, config_id: impl Into<String>, config: ImportConfig) {
        self.configs.insert(config_id.into(), config);
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    /// Make sure `table` exists, even if empty.
    pub fn create_table(&mut self, table: impl Into<String>) {
        self.tables.get_mut().entry(table.into()).or_default();
    }

    pub fn insert_record(&mut self, table: impl Into<String>, record: StoredRecord) {
        self.tables
            .get_mut()
            .entry(table.into())
            .or_default()
            .push(record);
    }

    /// Add an entry to the system choice table.
    pub fn add_choice(&mut self, name: &str, element: &str, label: &str, value: &str) {
        let id = format!("choice-{}-{}-{}", name, element, value);
        self.insert_record(
            CHOICE_TABLE,
            StoredRecord::new(
                id,
                [
                    ("name", name),
                    ("element", element),
                    ("label", label),
                    (CHOICE_VALUE_FIELD, value),
                ],
            ),
        );
    }

    /// Records created by import runs, oldest first.
    pub fn created_records(&self) -> Ref<'_, Vec<CreatedRecord>> {
        self.created.borrow()
    }

    pub fn records(&self, table: &str) -> Vec<StoredRecord> {
        self.tables.borrow().get(table).cloned().unwrap_or_default()
    }

    pub fn run_logs(&self) -> Ref<'_, Vec<RunLogEntry>> {
        self.run_logs.borrow()
    }

    fn first_match(&self, table: &str, query: &str) -> Result<Option<StoredRecord>, StoreError> {
        let query = EncodedQuery::parse(query)?;
        let tables = self.tables.borrow();

        let records = match tables.get(table) {
            Some(records) => records,
            None if table == CHOICE_TABLE => return Ok(None),
            None => {
                return Err(StoreError::NotFound {
                    entity: "Table",
                    id: table.to_string(),
                })
            }
        };

        Ok(records.iter().find(|r| query.matches(&r.fields)).cloned())
    }
}

impl RequestSource for MemoryStore {
    fn request_context(&self, request_id: &str) -> Result<Option<RequestContext>, StoreError> {
        Ok(self.requests.get(request_id).cloned())
    }
}

impl ConfigSource for MemoryStore {
    fn import_config(&self, config_id: &str) -> Result<Option<ImportConfig>, StoreError> {
        Ok(self.configs.get(config_id).cloned())
    }
}

impl AttachmentLocator for MemoryStore {
    fn latest_spreadsheet_attachment(&self, record_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .attachments
            .iter()
            .filter(|a| a.record_id == record_id)
            .filter(|a| SPREADSHEET_CONTENT_TYPES.contains(&a.content_type.as_str()))
            .max_by_key(|a| a.created_on)
            .map(|a| a.id.clone()))
    }
}

impl RowSource for MemoryStore {
    fn open_rows(&self, attachment_id: &str) -> Result<Rows<'_>, StoreError> {
        let attachment = self
            .attachments
            .iter()
            .find(|a| a.id == attachment_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "Attachment",
                id: attachment_id.to_string(),
            })?;

        Ok(Box::new(attachment.rows.iter().cloned().map(Ok)))
    }
}

impl ReferenceLookup for MemoryStore {
    fn find_reference(&self, table: &str, query: &str) -> Result<Option<String>, StoreError> {
        Ok(self.first_match(table, query)?.map(|r| r.id))
    }
}

impl ChoiceLookup for MemoryStore {
    fn find_choice_value(&self, query: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .first_match(CHOICE_TABLE, query)?
            .and_then(|r| r.fields.get(CHOICE_VALUE_FIELD).cloned()))
    }
}

impl RecordSink for MemoryStore {
    fn create_record(&self, table: &str, record: &ResolvedRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();

        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .push(StoredRecord {
                id: id.clone(),
                fields: record.to_values(),
            });
        self.created.borrow_mut().push(CreatedRecord {
            id: id.clone(),
            table: table.to_string(),
            fields: record.clone(),
        });

        Ok(id)
    }
}

impl LogSink for MemoryStore {
    fn append_run_log(&self, config_id: &str, text: &str) -> Result<(), StoreError> {
        self.run_logs.borrow_mut().push(RunLogEntry {
            config_id: config_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}
