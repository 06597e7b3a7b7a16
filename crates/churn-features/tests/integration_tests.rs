//! Integration tests for the churn feature pipeline.
//!
//! These tests run the Telco sample export through the public API the way a
//! training job and a prediction front end would.

use churn_features::{
    CancellationToken, CsvSource, DropReason, EncodingContract, FeatureError, FeatureTable,
    InferenceSession, JsonDocumentSource, OutputFormat, Pipeline, PipelineConfig, PipelineOutput,
    PipelineStage, RecordSet, RecordSource, ScalerState, TELCO_CONTRACT_VERSION,
    preprocess_file,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ============================================================================
// Helper Functions
// ============================================================================

const SAMPLE_ROWS: usize = 20;
const BLANK_CHARGES_ROW: usize = 14;

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn sample_records() -> RecordSet {
    CsvSource::new(fixtures_path().join("telco_sample.csv"))
        .read()
        .expect("Failed to read sample CSV")
}

fn in_memory_config() -> PipelineConfig {
    PipelineConfig::builder()
        .save_to_disk(false)
        .build()
        .unwrap()
}

fn run(records: RecordSet, config: PipelineConfig) -> Result<PipelineOutput, FeatureError> {
    Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process_records(records)
}

fn sorted_rows(table: &FeatureTable) -> Vec<Vec<f64>> {
    let mut rows = table.rows().to_vec();
    rows.sort_by(|a, b| a.partial_cmp(b).unwrap());
    rows
}

// ============================================================================
// Batch encoding
// ============================================================================

#[test]
fn test_sample_export_end_to_end() {
    let output = run(sample_records(), in_memory_config()).unwrap();

    assert_eq!(output.rows_before(), SAMPLE_ROWS);
    assert_eq!(output.rows_after(), SAMPLE_ROWS - 1);
    assert_eq!(output.contract_version(), TELCO_CONTRACT_VERSION);
    assert_eq!(output.table.shape(), (SAMPLE_ROWS - 1, 19));
    assert_eq!(output.table.feature_names(), EncodingContract::telco_v1().feature_names());
    assert!(output.scaler_state.is_none());
    assert!(output.audit.artifacts.is_empty());

    // The blank TotalCharges of a zero-tenure customer drops that row
    assert_eq!(output.dropped_rows.len(), 1);
    assert_eq!(output.dropped_rows[0].row, BLANK_CHARGES_ROW);
    assert_eq!(output.dropped_rows[0].column, "TotalCharges");
    assert_eq!(output.dropped_rows[0].reason, DropReason::Missing);

    // 7590-VHVEG: Female, DSL, month-to-month, electronic check, stayed
    assert_eq!(
        output.table.row(0).unwrap(),
        &[
            0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0,
            29.85, 29.85
        ]
    );
    let targets = output.table.targets().unwrap();
    assert_eq!(targets.len(), SAMPLE_ROWS - 1);
    assert_eq!(targets[0], 0.0);
    assert_eq!(targets[2], 1.0);
}

#[test]
fn test_every_value_is_finite() {
    let output = run(sample_records(), in_memory_config()).unwrap();
    assert!(output.table.rows().iter().flatten().all(|v| v.is_finite()));
}

#[test]
fn test_row_order_does_not_change_encoding() {
    let baseline = run(sample_records(), in_memory_config()).unwrap();

    let mut records = sample_records().into_records();
    records.shuffle(&mut StdRng::seed_from_u64(7));
    let shuffled = run(records.into(), in_memory_config()).unwrap();

    assert_eq!(sorted_rows(&shuffled.table), sorted_rows(&baseline.table));
}

#[test]
fn test_reencoding_is_bitwise_identical() {
    let first = run(sample_records(), in_memory_config()).unwrap();
    let second = run(sample_records(), in_memory_config()).unwrap();
    assert_eq!(first.table, second.table);
}

#[test]
fn test_csv_and_document_exports_agree() {
    let pipeline = Pipeline::builder().config(in_memory_config()).build().unwrap();

    let from_csv = pipeline
        .process(&mut CsvSource::new(fixtures_path().join("telco_sample.csv")))
        .unwrap();
    let from_documents = pipeline
        .process(&mut JsonDocumentSource::new(
            fixtures_path().join("telco_sample.jsonl"),
        ))
        .unwrap();

    assert_eq!(from_documents.table, from_csv.table);
    assert_eq!(from_documents.dropped_rows, from_csv.dropped_rows);
}

#[test]
fn test_drop_threshold_boundary() {
    // One dropped row out of twenty is exactly 5%
    let at_limit = PipelineConfig::builder()
        .save_to_disk(false)
        .max_drop_rate(0.05)
        .build()
        .unwrap();
    assert!(run(sample_records(), at_limit).is_ok());

    let below_limit = PipelineConfig::builder()
        .save_to_disk(false)
        .max_drop_rate(0.04)
        .build()
        .unwrap();
    match run(sample_records(), below_limit) {
        Err(FeatureError::DataQuality { dropped, total, .. }) => {
            assert_eq!(dropped, 1);
            assert_eq!(total, SAMPLE_ROWS);
        }
        other => panic!("Expected data quality error, got {:?}", other),
    }
}

#[test]
fn test_unknown_category_fails_the_batch() {
    let mut records = sample_records().into_records();
    records[3].insert("Contract", "Weekly");

    let err = run(records.into(), in_memory_config()).unwrap_err();
    assert_eq!(err.error_code(), "ENCODING_ERROR");
    assert_eq!(err.field(), Some("Contract"));
}

#[test]
fn test_missing_column_fails_before_cleaning() {
    let records: Vec<_> = sample_records()
        .into_records()
        .into_iter()
        .map(|mut record| {
            record.remove("PaymentMethod");
            record
        })
        .collect();

    match run(records.into(), in_memory_config()) {
        Err(FeatureError::Schema { missing, .. }) => {
            assert_eq!(missing, vec!["PaymentMethod".to_string()]);
        }
        other => panic!("Expected schema error, got {:?}", other),
    }
}

#[test]
fn test_expected_version_mismatch() {
    let config = PipelineConfig::builder()
        .save_to_disk(false)
        .expected_contract_version("telco-churn/v2")
        .build()
        .unwrap();

    let err = run(sample_records(), config).unwrap_err();
    assert!(matches!(err, FeatureError::ContractVersionMismatch { .. }));
}

// ============================================================================
// Contract and scaler persistence
// ============================================================================

#[test]
fn test_saved_contract_reencodes_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model/telco.contract.json");

    let published = EncodingContract::telco_v1();
    published.save(&path).unwrap();
    let loaded = EncodingContract::load(&path).unwrap();
    assert_eq!(loaded.fingerprint(), published.fingerprint());

    let baseline = run(sample_records(), in_memory_config()).unwrap();
    let reloaded = Pipeline::builder()
        .config(in_memory_config())
        .contract(Arc::new(loaded))
        .build()
        .unwrap()
        .process_records(sample_records())
        .unwrap();

    assert_eq!(reloaded.table, baseline.table);
}

#[test]
fn test_preprocess_file_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .output_dir(dir.path().join("run"))
        .output_name("telco")
        .enable_scaling(true)
        .build()
        .unwrap();

    let output = preprocess_file(fixtures_path().join("telco_sample.csv"), config).unwrap();
    assert_eq!(output.audit.artifacts.len(), 4);
    assert!(output.audit.artifacts.iter().all(|p| p.exists()));
    assert!(output.audit.scaled);

    let table_path = dir.path().join("run/telco.csv");
    let written = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(table_path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file");
    assert_eq!(written.height(), SAMPLE_ROWS - 1);
    assert_eq!(written.width(), 20);
    assert_eq!(written.get_column_names()[19].as_str(), "Churn");

    let contract = EncodingContract::load(dir.path().join("run/telco.contract.json")).unwrap();
    assert_eq!(contract, *EncodingContract::telco_v1());

    let state = ScalerState::load(dir.path().join("run/telco.scaler.json")).unwrap();
    let fitted = output.scaler_state.unwrap();
    assert_eq!(state.feature_names, fitted.feature_names);
    assert_eq!(state.contract_version, TELCO_CONTRACT_VERSION);
    assert_eq!(state.fitted_rows, SAMPLE_ROWS - 1);
    for (saved, live) in state.centers.iter().zip(&fitted.centers) {
        assert!((saved - live).abs() < 1e-9);
    }
}

#[test]
fn test_document_export_to_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .output_dir(dir.path())
        .output_format(OutputFormat::JsonLines)
        .include_target(false)
        .build()
        .unwrap();

    let output = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(&mut JsonDocumentSource::new(
            fixtures_path().join("telco_sample.jsonl"),
        ))
        .unwrap();

    assert!(output.table.targets().is_none());
    let lines = std::fs::read_to_string(dir.path().join("telco_features.jsonl")).unwrap();
    let first: serde_json::Value = serde_json::from_str(lines.lines().next().unwrap()).unwrap();
    assert_eq!(first["tenure"], serde_json::json!(1.0));
    assert!(first.get("Churn").is_none());
    assert_eq!(lines.lines().count(), SAMPLE_ROWS - 1);
}

// ============================================================================
// Interactive encoding
// ============================================================================

#[test]
fn test_interactive_record_matches_training_row() {
    let batch = run(sample_records(), in_memory_config()).unwrap();
    let session =
        InferenceSession::new(EncodingContract::telco_v1(), TELCO_CONTRACT_VERSION).unwrap();

    let records = sample_records();
    let vector = session.encode(&records.records()[1]).unwrap();
    assert_eq!(vector.as_slice(), batch.table.row(1).unwrap());
}

#[test]
fn test_interactive_record_with_training_scaler() {
    let config = PipelineConfig::builder()
        .save_to_disk(false)
        .enable_scaling(true)
        .build()
        .unwrap();
    let batch = run(sample_records(), config).unwrap();
    let state = batch.scaler_state.clone().unwrap();

    let session = InferenceSession::new(EncodingContract::telco_v1(), TELCO_CONTRACT_VERSION)
        .unwrap()
        .with_scaler(state)
        .unwrap();

    let records = sample_records();
    let vector = session.encode(&records.records()[0]).unwrap();
    for (got, want) in vector.iter().zip(batch.table.row(0).unwrap()) {
        assert!((got - want).abs() < 1e-12, "{} != {}", got, want);
    }
}

#[test]
fn test_interactive_blank_charges_names_field() {
    let session =
        InferenceSession::new(EncodingContract::telco_v1(), TELCO_CONTRACT_VERSION).unwrap();
    let records = sample_records();

    let err = session.encode(&records.records()[BLANK_CHARGES_ROW]).unwrap_err();
    assert_eq!(err.field(), Some("TotalCharges"));
}

// ============================================================================
// Progress and Cancellation
// ============================================================================

#[test]
fn test_progress_runs_through_every_stage() {
    let stages = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&stages);

    Pipeline::builder()
        .config(in_memory_config())
        .on_progress(move |update| seen.lock().unwrap().push(update.stage))
        .build()
        .unwrap()
        .process_records(sample_records())
        .unwrap();

    let stages = stages.lock().unwrap();
    for expected in [
        PipelineStage::Validation,
        PipelineStage::Cleaning,
        PipelineStage::Encoding,
        PipelineStage::Complete,
    ] {
        assert!(stages.contains(&expected), "missing stage {:?}", expected);
    }
    assert!(!stages.contains(&PipelineStage::Scaling));
    assert_eq!(stages.last(), Some(&PipelineStage::Complete));
}

#[test]
fn test_cancelled_run_reports_cancellation() {
    let token = CancellationToken::new();
    token.cancel();

    let err = Pipeline::builder()
        .config(in_memory_config())
        .cancellation_token(token)
        .build()
        .unwrap()
        .process_records(sample_records())
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(!err.is_fatal());
}
