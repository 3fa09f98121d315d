//! Export of created records.

use serde::Serialize;
use std::io::Write;

use crate::memory_store::CreatedRecord;

/// Error type for serialization operations
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// NDJSON (Newline Delimited JSON) writer
///
/// Writes one JSON object per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Write a single value as an NDJSON line
    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), SerializationError> {
        let json = serde_json::to_string(value)?;
        writeln!(self.writer, "{}", json)?;
        self.written += 1;
        Ok(())
    }

    /// Write created records in order and flush.
    pub fn write_records(&mut self, records: &[CreatedRecord]) -> Result<(), SerializationError> {
        for record in records {
            self.write(record)?;
        }
        self.flush()
    }

    /// Lines written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}
