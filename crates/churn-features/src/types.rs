use crate::error::{FeatureError, Result};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Raw input
// ============================================================================

/// A single raw cell as delivered by a storage adapter.
///
/// Sources disagree on typing (a CSV hands over text, a document store hands
/// over JSON numbers), so the raw layer keeps whatever arrived and leaves
/// coercion to the cleaner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    /// Null or a whitespace-only string.
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// The value rendered as text, if it is not null.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            RawValue::Null => None,
            RawValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            RawValue::Bool(b) => Some(Cow::Owned(b.to_string())),
            RawValue::Int(i) => Some(Cow::Owned(i.to_string())),
            RawValue::Float(f) => Some(Cow::Owned(f.to_string())),
        }
    }

    /// The value as a number, if it already is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Int(i) => Some(*i as f64),
            RawValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => write!(f, "null"),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Int(i) => write!(f, "{}", i),
            RawValue::Float(x) => write!(f, "{}", x),
            RawValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Int(value as i64)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// One customer: column name to raw value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    values: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for literals in tests and interactive forms.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<RawValue>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.values.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<RawValue> {
        self.values.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of null or blank cells.
    pub fn missing_count(&self) -> usize {
        self.values.values().filter(|v| v.is_missing()).count()
    }

    pub(crate) fn into_inner(self) -> BTreeMap<String, RawValue> {
        self.values
    }
}

impl FromIterator<(String, RawValue)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (String, RawValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// An ordered batch of raw records, as read from one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: Vec<RawRecord>,
}

impl RecordSet {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RawRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<RawRecord> {
        self.records
    }

    /// Union of column names across all records, sorted.
    pub fn column_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.records.iter().flat_map(|r| r.columns()).collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// Total null or blank cells across the batch.
    pub fn missing_values(&self) -> usize {
        self.records.iter().map(RawRecord::missing_count).sum()
    }

    /// Build a record set from a DataFrame, one record per row.
    ///
    /// Every column is read back as text so the raw layer sees exactly what
    /// the file held; polars nulls become [`RawValue::Null`].
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let mut records = vec![RawRecord::new(); df.height()];

        for column in df.get_columns() {
            let name = column.name().to_string();
            let text = column.as_materialized_series().cast(&DataType::String)?;
            let values = text.str()?;
            for (record, value) in records.iter_mut().zip(values.into_iter()) {
                record.insert(name.clone(), value.map(str::to_string));
            }
        }

        Ok(Self { records })
    }
}

impl From<Vec<RawRecord>> for RecordSet {
    fn from(records: Vec<RawRecord>) -> Self {
        Self::new(records)
    }
}

impl IntoIterator for RecordSet {
    type Item = RawRecord;
    type IntoIter = std::vec::IntoIter<RawRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

// ============================================================================
// Cleaned records
// ============================================================================

/// A record that passed cleaning: identifiers removed, numeric columns
/// coerced to [`RawValue::Float`], no missing predictive values.
///
/// Only the cleaner constructs these, so holding one is proof the row is
/// complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedRecord {
    values: BTreeMap<String, RawValue>,
}

impl CleanedRecord {
    pub(crate) fn from_map(values: BTreeMap<String, RawValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.values.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

// ============================================================================
// Feature table
// ============================================================================

/// Numeric feature rows in contract order, with optional aligned labels.
///
/// A table is never mutated once built; scaling produces a new table.
/// Deserialized tables go through [`FeatureTable::new`] and its shape checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FeatureTableDocument")]
pub struct FeatureTable {
    contract_version: String,
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Vec<f64>>,
}

#[derive(Deserialize)]
struct FeatureTableDocument {
    contract_version: String,
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
    #[serde(default)]
    target_name: Option<String>,
    #[serde(default)]
    targets: Option<Vec<f64>>,
}

impl TryFrom<FeatureTableDocument> for FeatureTable {
    type Error = FeatureError;

    fn try_from(doc: FeatureTableDocument) -> Result<Self> {
        let target = match (doc.target_name, doc.targets) {
            (Some(name), Some(values)) => Some((name, values)),
            (None, None) => None,
            (Some(name), None) => {
                return Err(FeatureError::InvalidContract(format!(
                    "target '{}' has no labels",
                    name
                )));
            }
            (None, Some(_)) => {
                return Err(FeatureError::InvalidContract(
                    "labels without a target name".to_string(),
                ));
            }
        };
        Self::new(doc.contract_version, doc.feature_names, doc.rows, target)
    }
}

impl FeatureTable {
    /// Assemble a table, checking every row has one value per feature and
    /// the target vector (if any) is aligned with the rows.
    pub fn new(
        contract_version: impl Into<String>,
        feature_names: Vec<String>,
        rows: Vec<Vec<f64>>,
        target: Option<(String, Vec<f64>)>,
    ) -> Result<Self> {
        let width = feature_names.len();
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(FeatureError::InvalidContract(format!(
                "row {} has {} values, expected {}",
                idx,
                row.len(),
                width
            )));
        }

        let (target_name, targets) = match target {
            Some((name, values)) => {
                if values.len() != rows.len() {
                    return Err(FeatureError::InvalidContract(format!(
                        "target '{}' has {} labels for {} rows",
                        name,
                        values.len(),
                        rows.len()
                    )));
                }
                (Some(name), Some(values))
            }
            None => (None, None),
        };

        Ok(Self {
            contract_version: contract_version.into(),
            feature_names,
            rows,
            target_name,
            targets,
        })
    }

    pub fn contract_version(&self) -> &str {
        &self.contract_version
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&[f64]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    pub fn target_name(&self) -> Option<&str> {
        self.target_name.as_deref()
    }

    pub fn targets(&self) -> Option<&[f64]> {
        self.targets.as_deref()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// (rows, feature columns); the target is not counted.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.n_features())
    }

    /// Values of one feature column.
    pub fn column(&self, idx: usize) -> Option<Vec<f64>> {
        if idx >= self.n_features() {
            return None;
        }
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// A new table with every row replaced, same names and labels.
    pub(crate) fn with_rows(&self, rows: Vec<Vec<f64>>) -> Result<Self> {
        let target = match (&self.target_name, &self.targets) {
            (Some(name), Some(values)) => Some((name.clone(), values.clone())),
            _ => None,
        };
        Self::new(
            self.contract_version.clone(),
            self.feature_names.clone(),
            rows,
            target,
        )
    }

    /// Columnar view for writers: features in contract order, target last.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.n_features() + 1);

        for (idx, name) in self.feature_names.iter().enumerate() {
            let values: Vec<f64> = self.rows.iter().map(|r| r[idx]).collect();
            columns.push(Series::new(name.as_str().into(), values).into());
        }

        if let (Some(name), Some(values)) = (&self.target_name, &self.targets) {
            columns.push(Series::new(name.as_str().into(), values.clone()).into());
        }

        Ok(DataFrame::new(columns)?)
    }
}

// ============================================================================
// Run audit
// ============================================================================

/// What a caller needs to reproduce or debug a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAudit {
    /// When the run finished.
    pub generated_at: DateTime<Utc>,
    /// Human-readable description of the record source.
    pub source: String,
    /// Contract version the table was encoded with.
    pub contract_version: String,
    /// SHA-256 fingerprint of that contract.
    pub contract_fingerprint: String,
    /// Rows delivered by the source.
    pub rows_before: usize,
    /// Rows that survived cleaning and were encoded.
    pub rows_after: usize,
    /// Rows dropped by the cleaner.
    pub rows_dropped: usize,
    /// Null or blank cells in the raw batch.
    pub missing_values: usize,
    /// Shape of the emitted table (rows, feature columns).
    pub shape: (usize, usize),
    /// Whether the emitted table was standardized.
    pub scaled: bool,
    /// Wall time of the run.
    pub duration_ms: u64,
    /// Files written by the emit stage, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
}

impl RunAudit {
    /// Fraction of source rows that were dropped.
    pub fn drop_rate(&self) -> f64 {
        if self.rows_before == 0 {
            0.0
        } else {
            self.rows_dropped as f64 / self.rows_before as f64
        }
    }
}
