//! Persisted run output.
//!
//! A run writes its feature table plus the state a model needs to be served
//! with that table, side by side under one base name:
//!
//! ```text
//! output/
//!   telco_features.csv            feature table (or .jsonl)
//!   telco_features.contract.json  encoding contract with fingerprint
//!   telco_features.scaler.json    scaler state, only when scaling ran
//!   telco_features.audit.json     run audit
//! ```

use crate::config::{OutputFormat, PipelineConfig};
use crate::contract::EncodingContract;
use crate::error::{Result, ResultExt};
use crate::scaler::ScalerState;
use crate::sources::sink_for_format;
use crate::types::{FeatureTable, RunAudit};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes the artifacts of one run into a directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    output_name: String,
    format: OutputFormat,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>, output_name: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            output_name: output_name.into(),
            format,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.output_dir.clone(),
            config.output_name.clone(),
            config.output_format,
        )
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn table_path(&self) -> PathBuf {
        self.path_with_suffix(self.format.extension())
    }

    pub fn contract_path(&self) -> PathBuf {
        self.path_with_suffix("contract.json")
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.path_with_suffix("scaler.json")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.path_with_suffix("audit.json")
    }

    fn path_with_suffix(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", self.output_name, suffix))
    }

    /// Write everything and record the written paths in `audit`.
    pub fn write_all(
        &self,
        table: &FeatureTable,
        contract: &EncodingContract,
        scaler: Option<&ScalerState>,
        audit: &mut RunAudit,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.output_dir)
            .context(format!("Failed to create {}", self.output_dir.display()))?;

        let mut written = vec![
            self.write_table(table)?,
            self.write_contract(contract)?,
        ];
        if let Some(state) = scaler {
            written.push(self.write_scaler(state)?);
        }

        let audit_path = self.audit_path();
        audit.artifacts = written.clone();
        audit.artifacts.push(audit_path.clone());
        self.write_json(&audit_path, audit)?;
        written.push(audit_path);

        info!(
            "Wrote {} artifacts to {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }

    pub fn write_table(&self, table: &FeatureTable) -> Result<PathBuf> {
        let mut sink = sink_for_format(self.format, self.table_path());
        sink.write(table)
    }

    pub fn write_contract(&self, contract: &EncodingContract) -> Result<PathBuf> {
        let path = self.contract_path();
        contract.save(&path)?;
        Ok(path)
    }

    pub fn write_scaler(&self, state: &ScalerState) -> Result<PathBuf> {
        let path = self.scaler_path();
        state.save(&path)?;
        debug!("Scaler state saved: {}", path.display());
        Ok(path)
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let mut file = File::create(path).context(format!("Failed to create {}", path.display()))?;
        file.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
        debug!("Saved {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn audit() -> RunAudit {
        RunAudit {
            generated_at: Utc::now(),
            source: "memory:test".to_string(),
            contract_version: "t/v1".to_string(),
            contract_fingerprint: String::new(),
            rows_before: 2,
            rows_after: 2,
            rows_dropped: 0,
            missing_values: 0,
            shape: (2, 1),
            scaled: false,
            duration_ms: 0,
            artifacts: Vec::new(),
        }
    }

    #[test]
    fn test_paths_share_base_name() {
        let writer = ArtifactWriter::new("out", "churn", OutputFormat::JsonLines);
        assert_eq!(writer.table_path(), PathBuf::from("out/churn.jsonl"));
        assert_eq!(writer.contract_path(), PathBuf::from("out/churn.contract.json"));
        assert_eq!(writer.audit_path(), PathBuf::from("out/churn.audit.json"));
    }

    #[test]
    fn test_write_all_lists_artifacts_in_audit() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("run"), "churn", OutputFormat::Csv);
        let contract = EncodingContract::telco_v1();
        let table = FeatureTable::new(
            contract.version(),
            contract.feature_names(),
            vec![vec![0.0; 19], vec![1.0; 19]],
            None,
        )
        .unwrap();

        let mut audit = audit();
        let written = writer.write_all(&table, &contract, None, &mut audit).unwrap();

        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|p| p.exists()));
        assert_eq!(audit.artifacts, written);

        let saved: RunAudit =
            serde_json::from_str(&fs::read_to_string(writer.audit_path()).unwrap()).unwrap();
        assert_eq!(saved.artifacts.len(), 3);
        assert!(EncodingContract::load(writer.contract_path()).is_ok());
    }
}
