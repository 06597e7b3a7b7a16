//! Categorical encoding under an [`EncodingContract`].
//!
//! This is the only place raw categories become numbers. Batch runs and
//! interactive requests both go through [`CategoricalEncoder`], so a given
//! record encodes to the same vector whichever path it took.
//!
//! Per column, in contract order:
//! - `Binary`: synonyms collapse to the negative category first, then the
//!   positive category is 1 and the negative is 0.
//! - `Indicator`: the designated category is 1, any other known category 0.
//! - `Flag`: 0/1 passed through.
//! - `Numeric`: passed through as `f64`.
//!
//! Anything the contract does not cover is an [`FeatureError::Encoding`]
//! error; nothing defaults to 0.

use crate::contract::{EncodingContract, FeatureSpec, Transform};
use crate::error::{FeatureError, Result};
use crate::pipeline::CancellationToken;
use crate::pipeline::progress::CANCEL_CHECK_INTERVAL;
use crate::types::{CleanedRecord, FeatureTable, RawValue};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Encodes cleaned records into feature vectors.
#[derive(Debug, Clone)]
pub struct CategoricalEncoder {
    contract: Arc<EncodingContract>,
}

impl CategoricalEncoder {
    pub fn new(contract: Arc<EncodingContract>) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> &EncodingContract {
        &self.contract
    }

    /// Encode a batch into a new [`FeatureTable`].
    ///
    /// Labels are carried when `include_target` is set and the batch has a
    /// target column; otherwise the table has none. Rows accumulate into a
    /// fresh table, so a cancelled or failed run leaves nothing half-built.
    pub fn encode_table(
        &self,
        records: &[CleanedRecord],
        include_target: bool,
        token: &CancellationToken,
    ) -> Result<FeatureTable> {
        let target_name = &self.contract.target().name;
        let with_target = include_target && records.first().is_some_and(|r| r.contains(target_name));

        debug!(
            "Encoding {} records with contract '{}' (target: {})",
            records.len(),
            self.contract.version(),
            with_target
        );

        let mut rows = Vec::with_capacity(records.len());
        let mut targets = Vec::with_capacity(if with_target { records.len() } else { 0 });

        let mut first_failure: Option<FeatureError> = None;
        let mut failed_rows = 0usize;

        for (idx, record) in records.iter().enumerate() {
            if idx % CANCEL_CHECK_INTERVAL == 0 && token.is_cancelled() {
                return Err(FeatureError::Cancelled);
            }

            match self.encode_labelled(record, idx, with_target) {
                Ok((row, label)) if first_failure.is_none() => {
                    rows.push(row);
                    targets.extend(label);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("{}", e);
                    failed_rows += 1;
                    first_failure.get_or_insert(e);
                }
            }
        }

        // Every bad row is logged; the first one is returned.
        if let Some(e) = first_failure {
            warn!("{} of {} rows failed encoding", failed_rows, records.len());
            return Err(e);
        }

        let table = FeatureTable::new(
            self.contract.version(),
            self.contract.feature_names(),
            rows,
            with_target.then(|| (target_name.clone(), targets)),
        )?;

        let (n_rows, n_cols) = table.shape();
        info!(
            "Encoded feature table: {} rows x {} features (contract '{}')",
            n_rows,
            n_cols,
            self.contract.version()
        );

        Ok(table)
    }

    fn encode_labelled(
        &self,
        record: &CleanedRecord,
        idx: usize,
        with_target: bool,
    ) -> Result<(Vec<f64>, Option<f64>)> {
        let row = self.encode_row(record, Some(idx))?;
        if !with_target {
            return Ok((row, None));
        }

        let target = self.contract.target();
        let value = record.get(&target.name).ok_or_else(|| FeatureError::Encoding {
            row: Some(idx),
            column: target.name.clone(),
            value: "null".to_string(),
            reason: "is missing while other rows carry a label".to_string(),
        })?;
        Ok((row, Some(apply(target, value, Some(idx))?)))
    }

    /// Encode one record's features, in contract order.
    pub fn encode_record(&self, record: &CleanedRecord) -> Result<Vec<f64>> {
        self.encode_row(record, None)
    }

    /// Encode one record's label, if it carries one.
    pub fn encode_target(&self, record: &CleanedRecord) -> Result<Option<f64>> {
        let target = self.contract.target();
        record
            .get(&target.name)
            .map(|value| apply(target, value, None))
            .transpose()
    }

    fn encode_row(&self, record: &CleanedRecord, row: Option<usize>) -> Result<Vec<f64>> {
        self.contract
            .features()
            .iter()
            .map(|spec| {
                let value = record.get(&spec.name).ok_or_else(|| FeatureError::Encoding {
                    row,
                    column: spec.name.clone(),
                    value: "null".to_string(),
                    reason: "is absent from the cleaned record".to_string(),
                })?;
                apply(spec, value, row)
            })
            .collect()
    }
}

/// Apply one column's transform to one value.
fn apply(spec: &FeatureSpec, value: &RawValue, row: Option<usize>) -> Result<f64> {
    let fail = |reason: String| FeatureError::Encoding {
        row,
        column: spec.name.clone(),
        value: value.to_string(),
        reason,
    };

    match &spec.transform {
        Transform::Binary {
            positive,
            negative,
            synonyms,
        } => {
            let text = category(value).ok_or_else(|| fail("is not a category".to_string()))?;
            // Collapse before mapping, or the synonym would have no value.
            let text = if synonyms.iter().any(|s| s == text) {
                negative.as_str()
            } else {
                text
            };

            if text == positive {
                Ok(1.0)
            } else if text == negative {
                Ok(0.0)
            } else {
                Err(fail(format!(
                    "is not a known category (expected '{}' or '{}')",
                    positive, negative
                )))
            }
        }
        Transform::Indicator { category: hot, known } => {
            let text = category(value).ok_or_else(|| fail("is not a category".to_string()))?;
            if text == hot {
                Ok(1.0)
            } else if known.iter().any(|k| k == text) {
                Ok(0.0)
            } else {
                Err(fail(format!("is not a known category (expected one of {:?})", known)))
            }
        }
        Transform::Flag => flag(value).ok_or_else(|| fail("is not a 0/1 flag".to_string())),
        Transform::Numeric => number(value).ok_or_else(|| fail("is not a finite number".to_string())),
    }
}

fn number(value: &RawValue) -> Option<f64> {
    let parsed = match value {
        RawValue::Int(_) | RawValue::Float(_) => value.as_f64(),
        RawValue::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// Text of a categorical cell, trimmed.
fn category(value: &RawValue) -> Option<&str> {
    match value {
        RawValue::Text(s) => Some(s.trim()),
        _ => None,
    }
}

fn flag(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Int(0) | RawValue::Bool(false) => Some(0.0),
        RawValue::Int(1) | RawValue::Bool(true) => Some(1.0),
        RawValue::Float(f) if *f == 0.0 || *f == 1.0 => Some(*f),
        RawValue::Text(s) => match s.trim() {
            "0" => Some(0.0),
            "1" => Some(1.0),
            _ => None,
        },
        _ => None,
    }
}
