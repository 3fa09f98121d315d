//! Per-run state threaded through validation and resolution.
//!
//! A [`RunContext`] owns the run's options and its [`RunLog`]. It is created
//! at the start of an import and dropped after the log is persisted, so the
//! behaviour of a run depends only on what is passed into it.

use crate::error::ImportError;
use crate::mapping::GlobalOptions;
use crate::runtime::date_format::DateFormat;

/// Separator used when a run log is flattened for persistence.
pub const LOG_ENTRY_SEPARATOR: &str = "\n\n";

/// Append-only diagnostic trace of one import run.
///
/// Lines are only kept when logging is enabled. Every line is still emitted
/// as a `tracing` debug event.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    enabled: bool,
    entries: Vec<String>,
}

impl RunLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Vec::new(),
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "sheetmap::run", "{}", message);
        if self.enabled {
            self.entries.push(message);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries joined for the log sink.
    pub fn to_text(&self) -> String {
        self.entries.join(LOG_ENTRY_SEPARATOR)
    }
}

/// Options and log for the import in progress.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    options: GlobalOptions,
    log: RunLog,
    date_format: Option<DateFormat>,
}

impl RunContext {
    pub fn new(options: GlobalOptions) -> Self {
        let log = RunLog::new(options.logging_enabled);
        Self {
            options,
            log,
            date_format: None,
        }
    }

    pub fn options(&self) -> &GlobalOptions {
        &self.options
    }

    /// Replace the options once the run's configuration is known.
    pub fn configure(&mut self, options: GlobalOptions) {
        self.log.set_enabled(options.logging_enabled);
        self.options = options;
        self.date_format = None;
    }

    /// The configured source date format, compiled on first use.
    ///
    /// # Errors
    /// `MissingDateFormat` when no pattern is configured, `InvalidDateFormat`
    /// when the pattern does not compile
    pub fn date_format(&mut self) -> Result<&DateFormat, ImportError> {
        if self.date_format.is_none() {
            let pattern = &self.options.date_format;
            if pattern.trim().is_empty() {
                return Err(ImportError::MissingDateFormat);
            }
            let compiled =
                DateFormat::compile(pattern).map_err(|e| ImportError::InvalidDateFormat {
                    format: pattern.clone(),
                    reason: e.to_string(),
                })?;
            self.date_format = Some(compiled);
        }

        self.date_format.as_ref().ok_or(ImportError::MissingDateFormat)
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.log.log(message);
    }

    pub fn run_log(&self) -> &RunLog {
        &self.log
    }

    pub fn into_run_log(self) -> RunLog {
        self.log
    }
}
