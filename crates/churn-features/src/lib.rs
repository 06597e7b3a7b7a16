//! Churn Feature Encoding Library
//!
//! Turns raw customer records into the exact numeric feature vectors a churn
//! classifier was trained on, the same way for every caller.
//!
//! # Overview
//!
//! - **Schema validation**: required raw columns and their roles
//! - **Cleaning**: numeric coercion, whole-row dropping with a drop-rate guard
//! - **Encoding**: one table-driven encoder behind a versioned contract
//! - **Scaling**: optional standardization with persistable state
//! - **Storage adapters**: CSV files, document-store exports, in-memory rows
//! - **Interactive encoding**: one record through the same encoder
//! - **Progress Reporting**: real-time progress updates with cancellation support
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use churn_features::{CsvSource, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .max_drop_rate(0.01)
//!     .expected_contract_version("telco-churn/v1")
//!     .build()?;
//!
//! let output = Pipeline::builder()
//!     .config(config)
//!     .build()?
//!     .process(&mut CsvSource::new("telco.csv"))?;
//!
//! println!(
//!     "{} -> {} rows, contract {}",
//!     output.rows_before(),
//!     output.rows_after(),
//!     output.contract_version()
//! );
//! ```
//!
//! # Interactive encoding
//!
//! ```rust,ignore
//! use churn_features::{EncodingContract, InferenceSession, RawRecord};
//!
//! let contract = EncodingContract::load("model/telco_features.contract.json")?;
//! let session = InferenceSession::new(contract.into(), "telco-churn/v1")?;
//! let features = session.encode(&record)?;
//! ```

pub mod artifacts;
pub mod cleaner;
pub mod config;
pub mod contract;
pub mod encoder;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod scaler;
pub mod schema;
pub mod sources;
pub mod types;

pub use artifacts::ArtifactWriter;
pub use cleaner::{Cleaner, CleaningOutcome, DropReason, DroppedRow};
pub use config::{ConfigValidationError, OutputFormat, PipelineConfig, PipelineConfigBuilder};
pub use contract::{EncodingContract, FeatureSpec, TELCO_CONTRACT_VERSION, Transform};
pub use encoder::CategoricalEncoder;
pub use error::{FeatureError, Result as FeatureResult, ResultExt};
pub use inference::{InferenceSession, NamedFeature, RiskLevel};
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineOutput,
    PipelineStage, ProgressReporter, ProgressUpdate,
};
pub use scaler::{ScalerState, StandardScaler};
pub use schema::{ColumnRole, ColumnSpec, RawSchema, RoleMap, SchemaValidator};
pub use sources::{
    CsvSink, CsvSource, FeatureSink, JsonDocumentSource, JsonLinesSink, MemorySource,
    RecordSource, source_for_path,
};
pub use types::{CleanedRecord, FeatureTable, RawRecord, RawValue, RecordSet, RunAudit};

use std::path::Path;

/// Run a Telco CSV export through the pipeline with the published contract.
///
/// Fails with [`FeatureError::InvalidConfig`] if `config` does not validate.
pub fn preprocess_file(path: impl AsRef<Path>, config: PipelineConfig) -> error::Result<PipelineOutput> {
    let pipeline = Pipeline::builder()
        .config(config)
        .build()
        .map_err(|e| FeatureError::InvalidConfig(e.to_string()))?;
    pipeline.process(&mut CsvSource::new(path.as_ref()))
}
