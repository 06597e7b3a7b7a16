//! Configuration for the feature encoding pipeline.
//!
//! Built with [`PipelineConfig::builder()`] and validated at `build()`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File format the emit stage writes the feature table in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// Comma-separated, header row of feature names then the target.
    #[default]
    Csv,
    /// One JSON document per row.
    JsonLines,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::JsonLines => "jsonl",
        }
    }
}

/// Configuration for a pipeline run.
///
/// # Example
///
/// ```rust,ignore
/// use churn_features::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_drop_rate(0.01)
///     .enable_scaling(true)
///     .expected_contract_version("telco-churn/v1")
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Largest fraction of rows the cleaner may drop (0.0 - 1.0) before the
    /// run fails with a data quality error.
    /// Default: 0.05 (5%)
    pub max_drop_rate: f64,

    /// Whether to fit a scaler on the encoded table and emit the scaled one.
    /// Default: false
    pub enable_scaling: bool,

    /// Directory for the feature table and persisted state.
    /// Default: "output"
    pub output_dir: PathBuf,

    /// Base name (no extension) of every written file.
    /// Default: "telco_features"
    pub output_name: String,

    /// Format of the written feature table.
    /// Default: Csv
    pub output_format: OutputFormat,

    /// Whether the emit stage writes anything. When false, results stay in
    /// memory only.
    /// Default: true
    pub save_to_disk: bool,

    /// Contract version the consuming model was trained against. A run with
    /// any other contract fails before loading data.
    /// Default: None (no check)
    pub expected_contract_version: Option<String>,

    /// Whether to carry the target labels alongside the features.
    /// Default: true
    pub include_target: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_drop_rate: 0.05,
            enable_scaling: false,
            output_dir: PathBuf::from("output"),
            output_name: "telco_features".to_string(),
            output_format: OutputFormat::default(),
            save_to_disk: true,
            expected_contract_version: None,
            include_target: true,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(0.0..=1.0).contains(&self.max_drop_rate) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "max_drop_rate".to_string(),
                value: self.max_drop_rate,
            });
        }

        let name = self.output_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(ConfigValidationError::InvalidOutputName(
                self.output_name.clone(),
            ));
        }

        if let Some(version) = &self.expected_contract_version
            && version.trim().is_empty()
        {
            return Err(ConfigValidationError::EmptyContractVersion);
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid output name '{0}' (must be a non-empty file stem)")]
    InvalidOutputName(String),

    #[error("Expected contract version must not be empty")]
    EmptyContractVersion,

    #[error("Raw schema does not match the contract: {0}")]
    SchemaMismatch(String),
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    max_drop_rate: Option<f64>,
    enable_scaling: Option<bool>,
    output_dir: Option<PathBuf>,
    output_name: Option<String>,
    output_format: Option<OutputFormat>,
    save_to_disk: Option<bool>,
    expected_contract_version: Option<String>,
    include_target: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Set the largest tolerated drop rate.
    ///
    /// # Arguments
    /// * `rate` - Value between 0.0 and 1.0 (e.g., 0.05 = 5%)
    pub fn max_drop_rate(mut self, rate: f64) -> Self {
        self.max_drop_rate = Some(rate);
        self
    }

    pub fn enable_scaling(mut self, enable: bool) -> Self {
        self.enable_scaling = Some(enable);
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Enable or disable writing results to disk.
    pub fn save_to_disk(mut self, save: bool) -> Self {
        self.save_to_disk = Some(save);
        self
    }

    /// Pin the contract version the consuming model expects.
    pub fn expected_contract_version(mut self, version: impl Into<String>) -> Self {
        self.expected_contract_version = Some(version.into());
        self
    }

    pub fn include_target(mut self, include: bool) -> Self {
        self.include_target = Some(include);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            max_drop_rate: self.max_drop_rate.unwrap_or(defaults.max_drop_rate),
            enable_scaling: self.enable_scaling.unwrap_or(defaults.enable_scaling),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
            output_name: self.output_name.unwrap_or(defaults.output_name),
            output_format: self.output_format.unwrap_or_default(),
            save_to_disk: self.save_to_disk.unwrap_or(defaults.save_to_disk),
            expected_contract_version: self.expected_contract_version,
            include_target: self.include_target.unwrap_or(defaults.include_target),
        };

        config.validate()?;
        Ok(config)
    }
}
