//! Workspace loader.
//!
//! A workspace YAML file seeds a [`MemoryStore`] with everything an import
//! run needs: requests, import configurations, attachments (with their rows
//! already extracted), reference tables and choice lists.
//!
//! ```yaml
//! requests:
//!   - id: REQ0001
//!     config_id: CFG1
//! configs:
//!   - id: CFG1
//!     target_table: findings
//!     date_format: MM/dd/yyyy
//!     logging_enabled: true
//!     mapping_file: mapping.json
//! attachments:
//!   - id: ATT1
//!     record_id: REQ0001
//!     created_on: 2024-03-14T10:00:00Z
//!     rows_file: findings.ndjson
//! tables:
//!   sys_user:
//!     - id: u1
//!       fields: { user_name: jdoe }
//! choices:
//!   - { name: finding, element: severity, label: High, value: "2" }
//! ```
//!
//! Relative paths are resolved against the workspace file's directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::StoreError;
use crate::memory_store::{Attachment, MemoryStore, StoredRecord};
use crate::record::Row;
use crate::runtime::collaborators::{ImportConfig, RequestContext, SPREADSHEET_CONTENT_TYPES};

fn default_content_type() -> String {
    SPREADSHEET_CONTENT_TYPES[1].to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestDef {
    pub id: String,
    /// Record holding the attachments; defaults to the request id
    #[serde(default)]
    pub record_id: Option<String>,
    pub config_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigDef {
    pub id: String,
    /// Inline mapping: a JSON string or a YAML list of mappings
    #[serde(default)]
    pub mapping: Option<JsonValue>,
    #[serde(default)]
    pub mapping_file: Option<PathBuf>,
    #[serde(default)]
    pub date_format: String,
    #[serde(default)]
    pub logging_enabled: bool,
    pub target_table: String,
    #[serde(default)]
    pub parent_field: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentDef {
    pub id: String,
    pub record_id: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub rows: Option<Vec<IndexMap<String, JsonValue>>>,
    /// NDJSON file, or a JSON array of row objects
    #[serde(default)]
    pub rows_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceDef {
    pub name: String,
    #[serde(default)]
    pub element: String,
    pub label: String,
    pub value: String,
}

/// Deserialized workspace file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub requests: Vec<RequestDef>,
    #[serde(default)]
    pub configs: Vec<ConfigDef>,
    #[serde(default)]
    pub attachments: Vec<AttachmentDef>,
    #[serde(default)]
    pub tables: IndexMap<String, Vec<StoredRecord>>,
    #[serde(default)]
    pub choices: Vec<ChoiceDef>,
}

impl Workspace {
    pub fn from_yaml_str(contents: &str) -> Result<Self, StoreError> {
        serde_yaml::from_str(contents)
            .map_err(|e| StoreError::Decode(format!("Failed to parse workspace YAML: {}", e)))
    }

    /// Build a store, reading referenced files relative to `base_dir`.
    pub fn into_store(self, base_dir: &Path) -> Result<MemoryStore, StoreError> {
        let mut store = MemoryStore::new();

        for request in self.requests {
            let record_id = request.record_id.unwrap_or_else(|| request.id.clone());
            store.insert_request(
                request.id,
                RequestContext {
                    record_id,
                    config_id: request.config_id,
                },
            );
        }

        for def in self.configs {
            let mapping = load_mapping(&def, base_dir)?;
            let mut config = ImportConfig::new(mapping, def.target_table);
            config.date_format = def.date_format;
            config.logging_enabled = def.logging_enabled;
            if let Some(parent_field) = def.parent_field {
                config.parent_field = parent_field;
            }
            store.insert_config(def.id, config);
        }

        for def in self.attachments {
            let rows = load_rows(&def, base_dir)?;
            store.add_attachment(Attachment {
                id: def.id,
                record_id: def.record_id,
                content_type: def.content_type,
                created_on: def.created_on,
                rows,
            });
        }

        for (table, records) in self.tables {
            store.create_table(table.clone());
            for record in records {
                store.insert_record(table.clone(), record);
            }
        }

        for choice in self.choices {
            store.add_choice(&choice.name, &choice.element, &choice.label, &choice.value);
        }

        Ok(store)
    }
}

/// Load a workspace file into a ready-to-use store.
///
/// # Errors
/// Returns error if the file or any file it references cannot be read or
/// decoded
pub fn load_workspace<P: AsRef<Path>>(path: P) -> Result<MemoryStore, StoreError> {
    let path = path.as_ref();

    let contents = fs::read_to_string(path)
        .map_err(|e| StoreError::Io(format!("Failed to read workspace {}: {}", path.display(), e)))?;
    let workspace = Workspace::from_yaml_str(&contents)?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let store = workspace.into_store(base_dir)?;

    tracing::info!(workspace = %path.display(), "workspace loaded");
    Ok(store)
}

fn read_relative(base_dir: &Path, file: &Path) -> Result<String, StoreError> {
    let path = base_dir.join(file);
    fs::read_to_string(&path)
        .map_err(|e| StoreError::Io(format!("Failed to read {}: {}", path.display(), e)))
}

fn load_mapping(def: &ConfigDef, base_dir: &Path) -> Result<String, StoreError> {
    match (&def.mapping, &def.mapping_file) {
        (Some(JsonValue::String(raw)), _) => Ok(raw.clone()),
        (Some(value), _) => serde_json::to_string(value)
            .map_err(|e| StoreError::Decode(format!("Config '{}' mapping: {}", def.id, e))),
        (None, Some(file)) => read_relative(base_dir, file),
        (None, None) => Err(StoreError::Decode(format!(
            "Config '{}' needs either 'mapping' or 'mapping_file'",
            def.id
        ))),
    }
}

fn load_rows(def: &AttachmentDef, base_dir: &Path) -> Result<Vec<Row>, StoreError> {
    let raw_rows = match (&def.rows, &def.rows_file) {
        (Some(rows), _) => rows.clone(),
        (None, Some(file)) => parse_rows(&read_relative(base_dir, file)?)?,
        (None, None) => Vec::new(),
    };

    Ok(raw_rows.into_iter().map(into_row).collect())
}

/// Parse a JSON array of row objects, or one object per line.
pub fn parse_rows(contents: &str) -> Result<Vec<IndexMap<String, JsonValue>>, StoreError> {
    let decode = |e: serde_json::Error| StoreError::Decode(format!("Invalid row data: {}", e));

    if contents.trim_start().starts_with('[') {
        return serde_json::from_str(contents).map_err(decode);
    }

    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(decode))
        .collect()
}

/// Cells are text; numbers and booleans keep their JSON spelling, nulls are empty.
fn into_row(raw: IndexMap<String, JsonValue>) -> Row {
    raw.into_iter()
        .map(|(column, value)| {
            let cell = match value {
                JsonValue::String(s) => s,
                JsonValue::Null => String::new(),
                other => other.to_string(),
            };
            (column, cell)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::collaborators::{
        AttachmentLocator, ChoiceLookup, ConfigSource, ReferenceLookup, RequestSource, RowSource,
    };
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_workspace_with_files() {
        let temp_dir = TempDir::new().unwrap();
        write_file(
            temp_dir.path(),
            "mapping.json",
            r#"[{"label": "Title", "destinationField": "short_description", "process": "copy"}]"#,
        );
        write_file(
            temp_dir.path(),
            "rows.ndjson",
            "{\"Title\": \"XSS\", \"CVSS\": 6.1}\n\n{\"Title\": \"SQLi\", \"CVSS\": null}\n",
        );
        let workspace = write_file(
            temp_dir.path(),
            "workspace.yaml",
            r#"
requests:
  - id: REQ1
    config_id: CFG1
configs:
  - id: CFG1
    target_table: findings
    date_format: MM/dd/yyyy
    logging_enabled: true
    mapping_file: mapping.json
attachments:
  - id: ATT1
    record_id: REQ1
    created_on: 2024-03-14T10:00:00Z
    rows_file: rows.ndjson
tables:
  sys_user:
    - id: u1
      fields: { user_name: jdoe }
choices:
  - { name: finding, element: severity, label: High, value: "2" }
"#,
        );

        let store = load_workspace(&workspace).unwrap();

        let request = store.request_context("REQ1").unwrap().unwrap();
        assert_eq!(request.record_id, "REQ1");

        let config = store.import_config("CFG1").unwrap().unwrap();
        assert!(config.logging_enabled);
        assert_eq!(config.parent_field, "assessment_request");
        assert!(config.mapping.contains("short_description"));

        assert_eq!(
            store.latest_spreadsheet_attachment("REQ1").unwrap(),
            Some("ATT1".to_string())
        );
        let rows: Vec<Row> = store
            .open_rows("ATT1")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["CVSS"], "6.1");
        assert_eq!(rows[1]["CVSS"], "");

        assert_eq!(
            store.find_reference("sys_user", "user_name=jdoe").unwrap(),
            Some("u1".to_string())
        );
        assert_eq!(
            store.find_choice_value("name=finding^label=High").unwrap(),
            Some("2".to_string())
        );
    }

    #[test]
    fn test_inline_yaml_mapping() {
        let workspace = Workspace::from_yaml_str(
            r#"
configs:
  - id: CFG1
    target_table: findings
    parent_field: ""
    mapping:
      - label: Title
        destinationField: short_description
"#,
        )
        .unwrap();

        let store = workspace.into_store(Path::new(".")).unwrap();
        let config = store.import_config("CFG1").unwrap().unwrap();
        assert_eq!(config.parent_field, "");
        let spec = crate::MappingSpec::parse(&config.mapping).unwrap();
        assert_eq!(spec.all_mappings()[0].destination_field, "short_description");
    }

    #[test]
    fn test_config_without_mapping() {
        let workspace = Workspace::from_yaml_str(
            r#"
configs:
  - id: CFG1
    target_table: findings
"#,
        )
        .unwrap();

        assert!(matches!(
            workspace.into_store(Path::new(".")),
            Err(StoreError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_rows_json_array() {
        let rows = parse_rows(r#"[{"A": "1"}, {"A": "2"}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(parse_rows("{not json").is_err());
    }

    #[test]
    fn test_missing_workspace_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_workspace(temp_dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(StoreError::Io(_))));
    }
}
