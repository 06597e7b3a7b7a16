//! Storage adapters.
//!
//! The encoding core never sees a file or a database handle. Adapters turn
//! storage into a [`RecordSet`] ([`RecordSource`]) and a [`FeatureTable`]
//! back into storage ([`FeatureSink`]). Each adapter takes its location in
//! its constructor and holds nothing open between calls.

mod csv;
mod json;
mod memory;

pub use csv::{CsvSink, CsvSource};
pub use json::{JsonDocumentSource, JsonLinesSink};
pub use memory::MemorySource;

use crate::config::OutputFormat;
use crate::error::{FeatureError, Result};
use crate::types::{FeatureTable, RecordSet};
use std::path::{Path, PathBuf};

/// Something that yields raw customer records.
pub trait RecordSource {
    /// Short human-readable description, recorded in the run audit.
    fn describe(&self) -> String;

    /// Read every record, in source order.
    fn read(&mut self) -> Result<RecordSet>;
}

/// Something that stores an emitted feature table.
pub trait FeatureSink {
    fn describe(&self) -> String;

    /// Write the table and return where it went.
    fn write(&mut self, table: &FeatureTable) -> Result<PathBuf>;
}

/// Pick a source adapter from a file extension.
///
/// `.csv` reads as a flat file; `.json`, `.jsonl` and `.ndjson` read as a
/// document-store export.
pub fn source_for_path(path: impl AsRef<Path>) -> Result<Box<dyn RecordSource>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("csv") => Ok(Box::new(CsvSource::new(path))),
        Some("json" | "jsonl" | "ndjson") => Ok(Box::new(JsonDocumentSource::new(path))),
        _ => Err(FeatureError::InvalidConfig(format!(
            "don't know how to read '{}' (expected .csv, .json, .jsonl or .ndjson)",
            path.display()
        ))),
    }
}

/// Sink for the configured output format.
pub fn sink_for_format(format: OutputFormat, path: impl Into<PathBuf>) -> Box<dyn FeatureSink> {
    match format {
        OutputFormat::Csv => Box::new(CsvSink::new(path)),
        OutputFormat::JsonLines => Box::new(JsonLinesSink::new(path)),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
