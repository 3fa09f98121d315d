//! Top-level import driver.
//!
//! Coordinates one run:
//! 1. Resolve the request and its import configuration
//! 2. Parse the mapping document
//! 3. Locate the newest spreadsheet attachment and stream its rows
//! 4. Validate, resolve and create one record per row
//! 5. Persist the run log, whatever the outcome
//!
//! Any fatal error ends the run at the row where it happens. Records created
//! for earlier rows stay committed.

use chrono::Utc;
use serde::Serialize;

use crate::error::ImportError;
use crate::mapping::{MappingSpec, ProcessKind};
use crate::record::{FieldValue, ResolvedRecord, Row};
use crate::runtime::collaborators::{Collaborators, ImportConfig};
use crate::runtime::context::RunContext;
use crate::runtime::resolver::FieldResolver;
use crate::runtime::validator::RowValidator;
use crate::transform_registry::ExtensionRegistry;

/// What the caller of [`ImportOrchestrator::run`] gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub success: bool,
    pub message: String,
    /// Ids of the records created before the run ended
    pub record_ids: Vec<String>,
}

impl ImportOutcome {
    pub fn records_created(&self) -> usize {
        self.record_ids.len()
    }
}

/// Mutable bookkeeping that must survive a failed run.
#[derive(Default)]
struct RunState {
    config_id: Option<String>,
    record_ids: Vec<String>,
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Runs spreadsheet imports against a set of collaborators.
pub struct ImportOrchestrator<'a> {
    collaborators: Collaborators<'a>,
    extensions: &'a ExtensionRegistry,
    validator: RowValidator,
}

impl<'a> ImportOrchestrator<'a> {
    /// Orchestrator using the findings mandatory-field policy.
    pub fn new(collaborators: Collaborators<'a>, extensions: &'a ExtensionRegistry) -> Self {
        Self {
            collaborators,
            extensions,
            validator: RowValidator::findings(),
        }
    }

    pub fn with_validator(mut self, validator: RowValidator) -> Self {
        self.validator = validator;
        self
    }

    fn resolver(&self) -> FieldResolver<'a> {
        FieldResolver::new(
            self.collaborators.references,
            self.collaborators.choices,
            self.extensions,
        )
    }

    /// Import every row of the request's newest spreadsheet attachment.
    ///
    /// Never returns an error: fatal conditions become an unsuccessful
    /// [`ImportOutcome`] carrying the error message.
    pub fn run(&self, request_id: &str) -> ImportOutcome {
        let span = tracing::info_span!("import", request_id);
        let _enter = span.enter();

        let mut ctx = RunContext::default();
        let mut state = RunState::default();

        let outcome = match self.execute(request_id, &mut ctx, &mut state) {
            Ok(()) => {
                ctx.log(format!("Process completed successfully: {}", timestamp()));
                tracing::info!(records = state.record_ids.len(), "import completed");
                ImportOutcome {
                    success: true,
                    message: format!("Imported {} record(s)", state.record_ids.len()),
                    record_ids: state.record_ids,
                }
            }
            Err(e) => {
                let message = format!("There was an error importing the findings: {}", e);
                tracing::error!(records = state.record_ids.len(), "{}", message);
                ctx.log(message.clone());
                ImportOutcome {
                    success: false,
                    message,
                    record_ids: state.record_ids,
                }
            }
        };

        if let Some(config_id) = &state.config_id {
            self.persist_log(config_id, ctx);
        }

        outcome
    }

    fn execute(
        &self,
        request_id: &str,
        ctx: &mut RunContext,
        state: &mut RunState,
    ) -> Result<(), ImportError> {
        if request_id.trim().is_empty() {
            return Err(ImportError::InvalidId("Import request"));
        }

        let request = self
            .collaborators
            .requests
            .request_context(request_id)?
            .ok_or_else(|| ImportError::RequestNotFound(request_id.to_string()))?;

        if request.config_id.is_empty() {
            return Err(ImportError::InvalidId("Import configuration"));
        }
        let config = self
            .collaborators
            .configs
            .import_config(&request.config_id)?
            .ok_or_else(|| ImportError::ConfigNotFound(request.config_id.clone()))?;

        state.config_id = Some(request.config_id.clone());
        ctx.configure(config.options());
        ctx.log(format!(
            "Mapping Details: table={} dateFormat={} loggingEnabled={} parentField={}",
            config.target_table, config.date_format, config.logging_enabled, config.parent_field
        ));

        let spec = MappingSpec::parse(&config.mapping)?.with_options(config.options());
        if spec.uses_process(ProcessKind::Date) {
            let format = ctx.date_format()?;
            tracing::debug!(
                pattern = %format.pattern(),
                strftime = %format.strftime(),
                "date format compiled"
            );
        }
        ctx.log(format!("Process started: {}", timestamp()));

        if request.record_id.is_empty() {
            return Err(ImportError::InvalidId("Attachment record"));
        }
        let attachment_id = self
            .collaborators
            .attachments
            .latest_spreadsheet_attachment(&request.record_id)?
            .ok_or_else(|| ImportError::NoAttachment(request.record_id.clone()))?;
        ctx.log(format!("Attachment ID: {}", attachment_id));
        tracing::info!(
            attachment_id = %attachment_id,
            table = %config.target_table,
            mappings = spec.len(),
            "importing attachment"
        );

        for row in self.collaborators.rows.open_rows(&attachment_id)? {
            let row = row?;
            let record = self.assemble(&spec, &row, seed_record(&config, request_id), ctx)?;

            let id = self
                .collaborators
                .records
                .create_record(&config.target_table, &record)?;
            ctx.log(format!("Record Created: {}", id));
            tracing::debug!(record_id = %id, "record created");
            state.record_ids.push(id);
        }

        Ok(())
    }

    /// Validate `row` and resolve it into a target record.
    pub fn build_record(
        &self,
        spec: &MappingSpec,
        row: &Row,
        ctx: &mut RunContext,
    ) -> Result<ResolvedRecord, ImportError> {
        self.assemble(spec, row, ResolvedRecord::new(), ctx)
    }

    fn assemble(
        &self,
        spec: &MappingSpec,
        row: &Row,
        mut record: ResolvedRecord,
        ctx: &mut RunContext,
    ) -> Result<ResolvedRecord, ImportError> {
        ctx.log(format!("Spreadsheet row: {}", serde_json::to_string(row).unwrap_or_default()));
        self.validator.validate(spec, row)?;

        let resolver = self.resolver();

        // Columns without a mapping are ignored.
        for column in row.keys() {
            ctx.log(format!("Processing column: {}", column));
            let Some(mapping) = spec.find_by_label(column) else {
                continue;
            };
            ctx.log(format!(
                "Column mapping: {}",
                serde_json::to_string(mapping).unwrap_or_default()
            ));

            let value = resolver.resolve_value(mapping, row, column, ctx)?;
            record.set(mapping.destination_field.clone(), value);
        }

        for mapping in spec.merge_field_mappings() {
            ctx.log(format!("Processing fields_to_merge column: {}", mapping.label));
            let value = resolver.resolve_value(mapping, row, &mapping.label, ctx)?;
            record.set(mapping.destination_field.clone(), value);
        }

        Ok(record)
    }

    fn persist_log(&self, config_id: &str, ctx: RunContext) {
        let log = ctx.into_run_log();
        if !log.is_enabled() {
            return;
        }

        if let Err(e) = self.collaborators.logs.append_run_log(config_id, &log.to_text()) {
            tracing::error!(config_id, error = %e, "failed to persist run log");
        }
    }
}

fn seed_record(config: &ImportConfig, request_id: &str) -> ResolvedRecord {
    let mut record = ResolvedRecord::new();
    if !config.parent_field.is_empty() {
        record.set(config.parent_field.clone(), FieldValue::raw(request_id));
    }
    record
}
