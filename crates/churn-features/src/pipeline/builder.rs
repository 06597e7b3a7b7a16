//! The pipeline orchestrator.
//!
//! Stages run in a fixed order, Validate → Clean → Encode → [Scale] → Emit,
//! and the first failure ends the run.

use crate::artifacts::ArtifactWriter;
use crate::cleaner::{Cleaner, DroppedRow};
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::contract::EncodingContract;
use crate::encoder::CategoricalEncoder;
use crate::error::{FeatureError, Result, ResultExt};
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::scaler::{ScalerState, StandardScaler};
use crate::schema::{RawSchema, SchemaValidator};
use crate::sources::{MemorySource, RecordSource};
use crate::types::{FeatureTable, RecordSet, RunAudit};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// What a run hands back.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The emitted table: scaled if scaling ran, encoded otherwise.
    pub table: FeatureTable,
    /// Scaler state the table was scaled with, for reuse at inference time.
    pub scaler_state: Option<ScalerState>,
    /// Row counts, contract version and written files.
    pub audit: RunAudit,
    /// Rows the cleaner removed, with the first offending column of each.
    pub dropped_rows: Vec<DroppedRow>,
}

impl PipelineOutput {
    pub fn contract_version(&self) -> &str {
        &self.audit.contract_version
    }

    pub fn rows_before(&self) -> usize {
        self.audit.rows_before
    }

    pub fn rows_after(&self) -> usize {
        self.audit.rows_after
    }
}

/// The feature encoding pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use churn_features::{CsvSource, Pipeline, PipelineConfig};
///
/// let output = Pipeline::builder()
///     .config(PipelineConfig::builder().max_drop_rate(0.01).build()?)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .process(&mut CsvSource::new("telco.csv"))?;
///
/// println!("{:?} rows x features", output.table.shape());
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    contract: Arc<EncodingContract>,
    validator: SchemaValidator,
    cleaner: Cleaner,
    encoder: CategoricalEncoder,
    scaler_state: Option<ScalerState>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn contract(&self) -> &Arc<EncodingContract> {
        &self.contract
    }

    /// Run every stage over the records of `source`.
    ///
    /// # Errors
    ///
    /// Returns `Err(FeatureError::Cancelled)` if the token was cancelled; in
    /// that case nothing is written.
    pub fn process(&self, source: &mut dyn RecordSource) -> Result<PipelineOutput> {
        match self.process_internal(source) {
            Ok(output) => {
                self.report_progress(ProgressUpdate::complete("Pipeline completed successfully"));
                Ok(output)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Run every stage over records already in memory.
    pub fn process_records(&self, records: RecordSet) -> Result<PipelineOutput> {
        self.process(&mut MemorySource::new("records", records))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(FeatureError::Cancelled);
        }
        Ok(())
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn process_internal(&self, source: &mut dyn RecordSource) -> Result<PipelineOutput> {
        let start_time = Instant::now();
        let source_name = source.describe();

        info!("Starting feature pipeline for {}", source_name);
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            0.0,
            format!("Checking contract '{}'", self.contract.version()),
        ));

        // A wrong contract must fail before any data is touched.
        if let Some(expected) = &self.config.expected_contract_version {
            self.contract.ensure_version(expected)?;
        }
        if let Some(state) = &self.scaler_state {
            state.check_layout(self.contract.version(), &self.contract.feature_names())?;
        }
        self.check_cancelled()?;

        // Step 1: Load
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Loading,
            0.0,
            format!("Reading {}", source_name),
        ));
        let records = source
            .read()
            .context(format!("Failed to load records from {}", source_name))?;
        let missing_values = records.missing_values();
        info!(
            "Loaded {} records with {} columns, {} missing values",
            records.len(),
            records.column_names().len(),
            missing_values
        );
        self.check_cancelled()?;

        // Step 2: Validate
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Validation,
            0.0,
            "Validating raw schema...",
        ));
        let (records, roles) = self.validator.validate(records)?;
        debug!("Validated {} columns", roles.len());
        self.check_cancelled()?;

        // Step 3: Clean
        self.report_progress(ProgressUpdate::with_items(
            PipelineStage::Cleaning,
            0,
            records.len(),
            "Cleaning records...",
        ));
        let outcome = self.cleaner.clean(records, &self.cancellation_token)?;
        self.report_progress(ProgressUpdate::with_items(
            PipelineStage::Cleaning,
            outcome.rows_after(),
            outcome.rows_before,
            format!("Kept {} of {} rows", outcome.rows_after(), outcome.rows_before),
        ));

        // Step 4: Encode
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Encoding,
            0.0,
            format!("Encoding with contract '{}'", self.contract.version()),
        ));
        let encoded = self.encoder.encode_table(
            &outcome.records,
            self.config.include_target,
            &self.cancellation_token,
        )?;
        self.check_cancelled()?;

        // Step 5: Scale (optional)
        let (table, scaler_state) = if self.config.enable_scaling || self.scaler_state.is_some() {
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Scaling,
                0.0,
                "Scaling features...",
            ));
            let state = match &self.scaler_state {
                Some(state) => {
                    info!("Applying supplied scaler state (fitted on {} rows)", state.fitted_rows);
                    state.clone()
                }
                None => StandardScaler::new().fit(&encoded)?,
            };
            (state.transform(&encoded)?, Some(state))
        } else {
            debug!("Scaling disabled");
            (encoded, None)
        };
        self.check_cancelled()?;

        let mut audit = RunAudit {
            generated_at: Utc::now(),
            source: source_name,
            contract_version: self.contract.version().to_string(),
            contract_fingerprint: self.contract.fingerprint(),
            rows_before: outcome.rows_before,
            rows_after: outcome.rows_after(),
            rows_dropped: outcome.rows_dropped(),
            missing_values,
            shape: table.shape(),
            scaled: scaler_state.is_some(),
            duration_ms: 0,
            artifacts: Vec::new(),
        };

        // Step 6: Emit
        if self.config.save_to_disk {
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Emitting,
                0.0,
                "Writing feature table and state...",
            ));
            audit.duration_ms = start_time.elapsed().as_millis() as u64;
            ArtifactWriter::from_config(&self.config).write_all(
                &table,
                &self.contract,
                scaler_state.as_ref(),
                &mut audit,
            )?;
        }
        audit.duration_ms = start_time.elapsed().as_millis() as u64;

        let (n_rows, n_cols) = table.shape();
        info!(
            "Pipeline finished in {}ms: {} -> {} rows, table {} x {}",
            audit.duration_ms, audit.rows_before, audit.rows_after, n_rows, n_cols
        );

        Ok(PipelineOutput {
            table,
            scaler_state,
            audit,
            dropped_rows: outcome.dropped,
        })
    }
}

/// Builder for creating a [`Pipeline`] instance.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    contract: Option<Arc<EncodingContract>>,
    schema: Option<RawSchema>,
    scaler_state: Option<ScalerState>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Encode with `contract` instead of the built-in Telco v1 contract.
    pub fn contract(mut self, contract: Arc<EncodingContract>) -> Self {
        self.contract = Some(contract);
        self
    }

    /// Validate against `schema` instead of the columns derived from the
    /// contract. `build()` fails if it does not cover the contract.
    pub fn schema(mut self, schema: RawSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Apply a previously fitted scaler instead of fitting on this batch.
    pub fn scaler_state(mut self, state: ScalerState) -> Self {
        self.scaler_state = Some(state);
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token. Call [`CancellationToken::cancel()`] on a
    /// clone from any thread to stop the run between rows.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid or the raw schema
    /// does not declare every contract column with a fitting role.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let contract = self.contract.unwrap_or_else(EncodingContract::telco_v1);
        let schema = self
            .schema
            .unwrap_or_else(|| RawSchema::from_contract(&contract));
        schema
            .check_contract(&contract)
            .map_err(|e| ConfigValidationError::SchemaMismatch(e.to_string()))?;

        Ok(Pipeline {
            cleaner: Cleaner::new(&schema, config.max_drop_rate),
            validator: SchemaValidator::new(schema),
            encoder: CategoricalEncoder::new(Arc::clone(&contract)),
            contract,
            config,
            scaler_state: self.scaler_state,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawRecord;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn telco_record(total_charges: &str, churn: &str) -> RawRecord {
        RawRecord::new()
            .with("customerID", "0001-TEST")
            .with("gender", "Female")
            .with("SeniorCitizen", "0")
            .with("Partner", "Yes")
            .with("Dependents", "No")
            .with("tenure", "1")
            .with("PhoneService", "No")
            .with("MultipleLines", "No phone service")
            .with("InternetService", "DSL")
            .with("OnlineSecurity", "No")
            .with("OnlineBackup", "Yes")
            .with("DeviceProtection", "No")
            .with("TechSupport", "No")
            .with("StreamingTV", "No")
            .with("StreamingMovies", "No")
            .with("Contract", "Month-to-month")
            .with("PaperlessBilling", "Yes")
            .with("PaymentMethod", "Electronic check")
            .with("MonthlyCharges", "29.85")
            .with("TotalCharges", total_charges)
            .with("Churn", churn)
    }

    fn in_memory(config: crate::config::PipelineConfigBuilder) -> Pipeline {
        Pipeline::builder()
            .config(config.save_to_disk(false).build().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_pipeline_builder_defaults() {
        let pipeline = Pipeline::builder().build().unwrap();
        assert_eq!(pipeline.contract().version(), "telco-churn/v1");
        assert!(!pipeline.config().enable_scaling);
    }

    #[test]
    fn test_process_records_end_to_end() {
        let pipeline = in_memory(PipelineConfig::builder().max_drop_rate(0.5));
        let records = RecordSet::new(vec![
            telco_record("29.85", "No"),
            telco_record(" ", "Yes"),
            telco_record("1889.5", "Yes"),
        ]);

        let output = pipeline.process_records(records).unwrap();
        assert_eq!(output.rows_before(), 3);
        assert_eq!(output.rows_after(), 2);
        assert_eq!(output.contract_version(), "telco-churn/v1");
        assert_eq!(output.table.shape(), (2, 19));
        assert_eq!(output.table.targets(), Some(&[0.0, 1.0][..]));
        assert_eq!(output.audit.rows_dropped, 1);
        assert_eq!(output.audit.missing_values, 1);
        assert_eq!(output.dropped_rows[0].row, 1);
        assert!(output.audit.artifacts.is_empty());
        assert!(output.scaler_state.is_none());
    }

    #[test]
    fn test_version_mismatch_fails_before_loading() {
        struct Exploding;
        impl RecordSource for Exploding {
            fn describe(&self) -> String {
                "exploding".to_string()
            }
            fn read(&mut self) -> Result<RecordSet> {
                panic!("source must not be read");
            }
        }

        let pipeline = in_memory(PipelineConfig::builder().expected_contract_version("telco-churn/v2"));
        let err = pipeline.process(&mut Exploding).unwrap_err();
        assert_eq!(err.error_code(), "CONTRACT_VERSION_MISMATCH");
    }

    #[test]
    fn test_empty_source_is_rejected() {
        let pipeline = in_memory(PipelineConfig::builder());
        let err = pipeline.process_records(RecordSet::default()).unwrap_err();
        assert_eq!(err.error_code(), "DATA_QUALITY_ERROR");
    }

    #[test]
    fn test_scaling_fits_and_returns_state() {
        let pipeline = in_memory(PipelineConfig::builder().enable_scaling(true));
        let records = RecordSet::new(vec![
            telco_record("29.85", "No"),
            telco_record("1889.5", "Yes"),
        ]);

        let output = pipeline.process_records(records).unwrap();
        let state = output.scaler_state.expect("scaler state");
        assert!(output.audit.scaled);
        assert_eq!(state.fitted_rows, 2);

        let total_idx = 18;
        let column = output.table.column(total_idx).unwrap();
        assert!((column[0] + 1.0).abs() < 1e-9);
        assert!((column[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_supplied_scaler_state_is_applied_not_refit() {
        let reference = in_memory(PipelineConfig::builder().enable_scaling(true))
            .process_records(RecordSet::new(vec![
                telco_record("29.85", "No"),
                telco_record("1889.5", "Yes"),
            ]))
            .unwrap();
        let state = reference.scaler_state.unwrap();

        let pipeline = Pipeline::builder()
            .config(PipelineConfig::builder().save_to_disk(false).build().unwrap())
            .scaler_state(state.clone())
            .build()
            .unwrap();
        let output = pipeline
            .process_records(RecordSet::new(vec![telco_record("29.85", "No")]))
            .unwrap();

        assert_eq!(output.scaler_state, Some(state));
        assert_eq!(output.table.rows()[0], reference.table.rows()[0]);
    }

    #[test]
    fn test_progress_stages_in_order() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let stages_clone = stages.clone();

        let pipeline = Pipeline::builder()
            .config(PipelineConfig::builder().save_to_disk(false).build().unwrap())
            .on_progress(move |update| {
                let mut seen = stages_clone.lock().unwrap();
                if seen.last() != Some(&update.stage) {
                    seen.push(update.stage);
                }
            })
            .build()
            .unwrap();
        pipeline
            .process_records(RecordSet::new(vec![telco_record("29.85", "No")]))
            .unwrap();

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                PipelineStage::Initializing,
                PipelineStage::Loading,
                PipelineStage::Validation,
                PipelineStage::Cleaning,
                PipelineStage::Encoding,
                PipelineStage::Complete,
            ]
        );
    }

    #[test]
    fn test_cancelled_run_reports_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let cancelled = Arc::new(AtomicUsize::new(0));
        let cancelled_clone = cancelled.clone();

        let pipeline = Pipeline::builder()
            .config(PipelineConfig::builder().save_to_disk(false).build().unwrap())
            .cancellation_token(token)
            .on_progress(move |update| {
                if update.stage == PipelineStage::Cancelled {
                    cancelled_clone.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build()
            .unwrap();

        let err = pipeline
            .process_records(RecordSet::new(vec![telco_record("29.85", "No")]))
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    fn discount_contract() -> Arc<EncodingContract> {
        use crate::contract::{FeatureSpec, Transform};

        Arc::new(
            EncodingContract::new(
                "telco-churn/v2".to_string(),
                vec![
                    FeatureSpec::new("tenure", Transform::Numeric),
                    FeatureSpec::new("Discount", Transform::Numeric),
                ],
                FeatureSpec::new("Churn", Transform::binary("Yes", "No")),
            )
            .unwrap(),
        )
    }

    fn discount_pipeline() -> Pipeline {
        Pipeline::builder()
            .config(
                PipelineConfig::builder()
                    .save_to_disk(false)
                    .max_drop_rate(0.5)
                    .build()
                    .unwrap(),
            )
            .contract(discount_contract())
            .build()
            .unwrap()
    }

    #[test]
    fn test_loaded_contract_blank_numeric_drops_row() {
        let records = RecordSet::new(vec![
            telco_record("29.85", "No").with("Discount", "5"),
            telco_record("29.85", "Yes").with("Discount", " "),
        ]);

        let output = discount_pipeline().process_records(records).unwrap();
        assert_eq!(output.table.shape(), (1, 2));
        assert_eq!(output.table.rows()[0], vec![1.0, 5.0]);
        assert_eq!(output.dropped_rows.len(), 1);
        assert_eq!(output.dropped_rows[0].column, "Discount");
    }

    #[test]
    fn test_loaded_contract_missing_column_is_schema_error() {
        let records = RecordSet::new(vec![telco_record("29.85", "No")]);

        let err = discount_pipeline().process_records(records).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
        assert_eq!(err.field(), Some("Discount"));
    }

    #[test]
    fn test_schema_not_covering_contract_fails_build() {
        let result = Pipeline::builder()
            .contract(discount_contract())
            .schema(RawSchema::telco())
            .build();
        assert!(matches!(result, Err(ConfigValidationError::SchemaMismatch(_))));

        assert!(Pipeline::builder().schema(RawSchema::telco()).build().is_ok());
    }

    #[test]
    fn test_check_cancelled() {
        let token = CancellationToken::new();
        let pipeline = Pipeline::builder()
            .cancellation_token(token.clone())
            .build()
            .unwrap();

        assert!(pipeline.check_cancelled().is_ok());
        token.cancel();
        assert!(matches!(
            pipeline.check_cancelled(),
            Err(FeatureError::Cancelled)
        ));
    }
}
