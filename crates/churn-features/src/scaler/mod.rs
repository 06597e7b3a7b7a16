//! Standardization of feature tables.
//!
//! Fitting and transforming are separate steps. [`StandardScaler::fit`]
//! derives a [`ScalerState`] from a reference table; the state is then
//! applied, never refitted, to later tables and to single inference rows.

use crate::error::{FeatureError, Result, ResultExt};
use crate::types::FeatureTable;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Fewest rows a reference table may have. A single row has no spread.
pub const MIN_FIT_ROWS: usize = 2;

/// Fits per-feature mean and population standard deviation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardScaler;

impl StandardScaler {
    pub fn new() -> Self {
        Self
    }

    /// Fit on every feature column of `reference`. The target is never
    /// looked at.
    ///
    /// A zero-variance feature gets scale 1.0, so it is centred but not blown
    /// up.
    pub fn fit(&self, reference: &FeatureTable) -> Result<ScalerState> {
        let n = reference.n_rows();
        if n < MIN_FIT_ROWS {
            return Err(FeatureError::Scaler(format!(
                "cannot fit on {} row(s), need at least {}",
                n, MIN_FIT_ROWS
            )));
        }

        let width = reference.n_features();
        let mut centers = vec![0.0; width];
        for row in reference.rows() {
            for (sum, value) in centers.iter_mut().zip(row) {
                *sum += value;
            }
        }
        for center in &mut centers {
            *center /= n as f64;
        }

        let mut scales = vec![0.0; width];
        for row in reference.rows() {
            for ((acc, value), center) in scales.iter_mut().zip(row).zip(&centers) {
                *acc += (value - center).powi(2);
            }
        }
        for (idx, scale) in scales.iter_mut().enumerate() {
            let std = (*scale / n as f64).sqrt();
            *scale = if std > f64::EPSILON {
                std
            } else {
                debug!(
                    "Feature '{}' has zero variance, using scale 1.0",
                    reference.feature_names()[idx]
                );
                1.0
            };
        }

        info!("Fitted scaler on {} rows x {} features", n, width);

        Ok(ScalerState {
            contract_version: reference.contract_version().to_string(),
            feature_names: reference.feature_names().to_vec(),
            centers,
            scales,
            fitted_rows: n,
        })
    }
}

/// Fitted scaling parameters, persisted next to a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub contract_version: String,
    pub feature_names: Vec<String>,
    pub centers: Vec<f64>,
    pub scales: Vec<f64>,
    /// Rows in the reference table.
    pub fitted_rows: usize,
}

impl ScalerState {
    /// Fail unless this state was fitted on tables laid out like
    /// (`version`, `feature_names`).
    pub fn check_layout(&self, version: &str, feature_names: &[String]) -> Result<()> {
        if self.contract_version != version {
            return Err(FeatureError::ContractVersionMismatch {
                expected: self.contract_version.clone(),
                found: version.to_string(),
            });
        }
        if self.feature_names != feature_names {
            return Err(FeatureError::Scaler(format!(
                "fitted on features {:?}, table has {:?}",
                self.feature_names, feature_names
            )));
        }
        self.check_parameters()
    }

    /// Parameter vectors match the feature list and are usable numbers.
    fn check_parameters(&self) -> Result<()> {
        if self.centers.len() != self.feature_names.len() || self.scales.len() != self.feature_names.len() {
            return Err(FeatureError::Scaler(
                "state has parameter vectors of the wrong length".to_string(),
            ));
        }
        if self.centers.iter().any(|c| !c.is_finite()) {
            return Err(FeatureError::Scaler(
                "state has a non-finite center".to_string(),
            ));
        }
        if self.scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(FeatureError::Scaler(
                "state has a non-positive scale".to_string(),
            ));
        }
        Ok(())
    }

    /// Standardize a table into a new one; labels are carried unchanged.
    pub fn transform(&self, table: &FeatureTable) -> Result<FeatureTable> {
        self.check_layout(table.contract_version(), table.feature_names())?;

        let rows = table
            .rows()
            .iter()
            .map(|row| self.scale(row))
            .collect();
        let scaled = table.with_rows(rows)?;

        let (n_rows, n_cols) = scaled.shape();
        info!("Scaled feature table: {} rows x {} features", n_rows, n_cols);
        Ok(scaled)
    }

    /// Standardize one encoded vector.
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.centers.len() {
            return Err(FeatureError::Scaler(format!(
                "row has {} values, scaler was fitted on {}",
                row.len(),
                self.centers.len()
            )));
        }
        self.check_parameters()?;
        Ok(self.scale(row))
    }

    fn scale(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.centers)
            .zip(&self.scales)
            .map(|((value, center), scale)| (value - center) / scale)
            .collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .context(format!("Failed to write scaler state to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .context(format!("Failed to read scaler state from {}", path.display()))?;
        let state: Self = serde_json::from_str(&json)?;
        state
            .check_parameters()
            .context(format!("Invalid scaler state in {}", path.display()))?;
        Ok(state)
    }
}
