//! Record cleaning ahead of encoding.
//!
//! This module provides:
//! - Coercion of numeric-continuous columns (blank placeholders are missing)
//! - Whole-row dropping of records with missing or unparseable values
//! - Identifier stripping, so identifiers never reach the encoder
//! - A drop-rate guard that fails the run instead of silently losing data

mod converters;

use crate::error::{FeatureError, Result};
use crate::pipeline::CancellationToken;
use crate::pipeline::progress::CANCEL_CHECK_INTERVAL;
use crate::schema::{ColumnRole, RawSchema};
use crate::types::{CleanedRecord, RawRecord, RawValue, RecordSet};
use converters::{Coercion, coerce_numeric};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Why a row was dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DropReason {
    /// Null or whitespace-only value.
    Missing,
    /// Value present but not a number.
    Unparseable(String),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "value is missing or blank"),
            Self::Unparseable(raw) => write!(f, "value {:?} is not a number", raw),
        }
    }
}

/// A row removed by the cleaner, with the first offending column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    pub row: usize,
    pub column: String,
    pub reason: DropReason,
}

/// Result of cleaning a batch.
#[derive(Debug, Clone)]
pub struct CleaningOutcome {
    pub records: Vec<CleanedRecord>,
    pub rows_before: usize,
    pub dropped: Vec<DroppedRow>,
}

impl CleaningOutcome {
    pub fn rows_after(&self) -> usize {
        self.records.len()
    }

    pub fn rows_dropped(&self) -> usize {
        self.dropped.len()
    }
}

/// Cleans raw records according to the column roles of a [`RawSchema`].
#[derive(Debug, Clone)]
pub struct Cleaner {
    identifiers: Vec<String>,
    /// Non-identifier columns in schema order, with their roles.
    checked: Vec<(String, ColumnRole)>,
    max_drop_rate: f64,
}

impl Cleaner {
    pub fn new(schema: &RawSchema, max_drop_rate: f64) -> Self {
        let identifiers = schema
            .with_role(ColumnRole::Identifier)
            .map(|spec| spec.name.clone())
            .collect();
        let checked = schema
            .columns()
            .iter()
            .filter(|spec| spec.role != ColumnRole::Identifier)
            .map(|spec| (spec.name.clone(), spec.role))
            .collect();

        Self {
            identifiers,
            checked,
            max_drop_rate,
        }
    }

    pub fn max_drop_rate(&self) -> f64 {
        self.max_drop_rate
    }

    /// Clean a validated batch.
    ///
    /// Output rows are a strict, order-preserving subset of the input. A row
    /// is kept whole or dropped whole; nothing is imputed.
    pub fn clean(&self, records: RecordSet, token: &CancellationToken) -> Result<CleaningOutcome> {
        let rows_before = records.len();
        info!("Cleaning {} records...", rows_before);

        let mut cleaned = Vec::with_capacity(rows_before);
        let mut dropped = Vec::new();

        for (idx, record) in records.into_iter().enumerate() {
            if idx % CANCEL_CHECK_INTERVAL == 0 && token.is_cancelled() {
                return Err(FeatureError::Cancelled);
            }

            match self.clean_row(record) {
                Ok(row) => cleaned.push(row),
                Err((column, reason)) => {
                    debug!("Dropping row {}: column '{}' {}", idx, column, reason);
                    dropped.push(DroppedRow {
                        row: idx,
                        column,
                        reason,
                    });
                }
            }
        }

        if !dropped.is_empty() {
            warn!(
                "Dropped {} of {} rows with missing or unparseable values",
                dropped.len(),
                rows_before
            );
        }

        check_drop_rate(dropped.len(), rows_before, self.max_drop_rate)?;

        info!(
            "Cleaning complete: {} rows kept, {} dropped",
            cleaned.len(),
            dropped.len()
        );

        Ok(CleaningOutcome {
            records: cleaned,
            rows_before,
            dropped,
        })
    }

    /// Clean one interactive record.
    ///
    /// There is no dropping here: a defect is reported against the field a
    /// human has to fix.
    pub fn clean_single(&self, record: RawRecord) -> Result<CleanedRecord> {
        self.clean_row(record)
            .map_err(|(field, reason)| FeatureError::InvalidRecord {
                field,
                reason: reason.to_string(),
            })
    }

    fn clean_row(&self, record: RawRecord) -> std::result::Result<CleanedRecord, (String, DropReason)> {
        let mut values = record.into_inner();

        for identifier in &self.identifiers {
            values.remove(identifier);
        }

        for (column, role) in &self.checked {
            let Some(value) = values.get_mut(column) else {
                continue;
            };

            if *role == ColumnRole::NumericContinuous {
                match coerce_numeric(value) {
                    Coercion::Value(number) => *value = RawValue::Float(number),
                    Coercion::Missing => return Err((column.clone(), DropReason::Missing)),
                    Coercion::Unparseable(raw) => {
                        return Err((column.clone(), DropReason::Unparseable(raw)));
                    }
                }
            } else if value.is_missing() {
                return Err((column.clone(), DropReason::Missing));
            }
        }

        Ok(CleanedRecord::from_map(values))
    }
}

/// Fail when more rows were dropped than `max_rate` of `total` allows.
///
/// A drop count exactly at the threshold passes.
fn check_drop_rate(dropped: usize, total: usize, max_rate: f64) -> Result<()> {
    if total == 0 {
        // Nothing usable came in at all.
        return Err(FeatureError::DataQuality {
            dropped: 0,
            total: 0,
            rate: 1.0,
            threshold: max_rate,
        });
    }

    let allowed = (max_rate * total as f64 + 1e-9).floor() as usize;
    if dropped > allowed {
        return Err(FeatureError::DataQuality {
            dropped,
            total,
            rate: dropped as f64 / total as f64,
            threshold: max_rate,
        });
    }

    Ok(())
}
