use super::{FeatureSink, RecordSource, ensure_parent_dir};
use crate::error::{Result, ResultExt};
use crate::types::{FeatureTable, RecordSet};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::fs::File;
use std::path::PathBuf;
use tracing::info;

/// Flat-file source.
///
/// Every column is read as text (no schema inference) so `TotalCharges`
/// placeholders and `SeniorCitizen` digits reach the cleaner as they were
/// written.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for CsvSource {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn read(&mut self) -> Result<RecordSet> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(self.path.clone()))
            .context(format!("Failed to open {}", self.path.display()))?
            .finish()
            .context(format!("Failed to parse {}", self.path.display()))?;

        info!(
            "Loaded {} rows x {} columns from {}",
            df.height(),
            df.width(),
            self.path.display()
        );

        RecordSet::from_dataframe(&df)
    }
}

/// Writes a feature table as CSV: feature columns in contract order, then
/// the target.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FeatureSink for CsvSink {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn write(&mut self, table: &FeatureTable) -> Result<PathBuf> {
        let mut df = table.to_dataframe()?;

        ensure_parent_dir(&self.path)?;
        let mut file = File::create(&self.path)
            .context(format!("Failed to create {}", self.path.display()))?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .finish(&mut df)?;

        info!("Feature table saved: {}", self.path.display());
        Ok(self.path.clone())
    }
}
