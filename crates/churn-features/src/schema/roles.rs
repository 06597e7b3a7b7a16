//! Declared column roles and the Telco raw schema.

use crate::contract::{EncodingContract, FeatureSpec, Transform};
use crate::error::{FeatureError, Result};
use crate::types::RawRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Customer identifier column of the Telco export.
const IDENTIFIER_COLUMN: &str = "customerID";

/// Semantic role of a raw column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Unique per customer, never predictive.
    Identifier,
    /// The label a classifier learns.
    Target,
    /// Two-valued category (yes/no, male/female, 0/1).
    CategoricalBinary,
    /// Category with more than two values.
    CategoricalMulti,
    /// Continuous number, may arrive as text.
    NumericContinuous,
}

impl ColumnRole {
    /// Whether columns with this role feed the feature vector.
    pub fn is_predictive(&self) -> bool {
        !matches!(self, Self::Identifier | Self::Target)
    }

    /// Raw role a column must have to feed `transform`.
    fn for_transform(transform: &Transform) -> Self {
        match transform {
            Transform::Binary { .. } | Transform::Flag => Self::CategoricalBinary,
            Transform::Indicator { .. } => Self::CategoricalMulti,
            Transform::Numeric => Self::NumericContinuous,
        }
    }

    fn accepts(&self, transform: &Transform) -> bool {
        match transform {
            Transform::Numeric => *self == Self::NumericContinuous,
            _ => matches!(self, Self::CategoricalBinary | Self::CategoricalMulti),
        }
    }
}

/// One declared raw column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub role: ColumnRole,
    /// Required columns must be present in every record of a batch.
    pub required: bool,
}

impl ColumnSpec {
    pub fn required(name: impl Into<String>, role: ColumnRole) -> Self {
        Self {
            name: name.into(),
            role,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, role: ColumnRole) -> Self {
        Self {
            name: name.into(),
            role,
            required: false,
        }
    }
}

/// The declared shape of a raw record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSchema {
    columns: Vec<ColumnSpec>,
}

impl RawSchema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// IBM Telco customer churn export.
    ///
    /// `customerID` and `Churn` are optional: document stores may omit the
    /// identifier, and inference batches carry no label.
    pub fn telco() -> Self {
        use ColumnRole::*;

        Self::new(vec![
            ColumnSpec::optional(IDENTIFIER_COLUMN, Identifier),
            ColumnSpec::required("gender", CategoricalBinary),
            ColumnSpec::required("SeniorCitizen", CategoricalBinary),
            ColumnSpec::required("Partner", CategoricalBinary),
            ColumnSpec::required("Dependents", CategoricalBinary),
            ColumnSpec::required("tenure", NumericContinuous),
            ColumnSpec::required("PhoneService", CategoricalBinary),
            ColumnSpec::required("MultipleLines", CategoricalMulti),
            ColumnSpec::required("InternetService", CategoricalMulti),
            ColumnSpec::required("OnlineSecurity", CategoricalMulti),
            ColumnSpec::required("OnlineBackup", CategoricalMulti),
            ColumnSpec::required("DeviceProtection", CategoricalMulti),
            ColumnSpec::required("TechSupport", CategoricalMulti),
            ColumnSpec::required("StreamingTV", CategoricalMulti),
            ColumnSpec::required("StreamingMovies", CategoricalMulti),
            ColumnSpec::required("Contract", CategoricalMulti),
            ColumnSpec::required("PaperlessBilling", CategoricalBinary),
            ColumnSpec::required("PaymentMethod", CategoricalMulti),
            ColumnSpec::required("MonthlyCharges", NumericContinuous),
            ColumnSpec::required("TotalCharges", NumericContinuous),
            ColumnSpec::optional("Churn", Target),
        ])
    }

    /// Raw columns a contract reads: every feature required with the role
    /// its transform needs, the target optional, plus the optional Telco
    /// identifier.
    pub fn from_contract(contract: &EncodingContract) -> Self {
        let mut columns = vec![ColumnSpec::optional(IDENTIFIER_COLUMN, ColumnRole::Identifier)];
        columns.extend(
            contract
                .features()
                .iter()
                .filter(|spec| spec.name != IDENTIFIER_COLUMN)
                .map(|spec| ColumnSpec::required(&spec.name, ColumnRole::for_transform(&spec.transform))),
        );
        columns.push(ColumnSpec::optional(&contract.target().name, ColumnRole::Target));
        Self::new(columns)
    }

    /// Fail unless every contract feature is a required column whose role
    /// fits its transform, and the target is declared as the target.
    ///
    /// Numeric features must be numeric-continuous so blank values reach the
    /// cleaner's drop path instead of failing in the encoder.
    pub fn check_contract(&self, contract: &EncodingContract) -> Result<()> {
        let mut problems = Vec::new();

        for spec in contract.features() {
            match self.column(&spec.name) {
                None => problems.push(format!("feature '{}' is not a declared column", spec.name)),
                Some(column) if !column.required => {
                    problems.push(format!("feature '{}' is declared optional", spec.name));
                }
                Some(column) if !column.role.accepts(&spec.transform) => {
                    problems.push(mismatch(spec, column.role));
                }
                Some(_) => {}
            }
        }

        let target = contract.target();
        match self.column(&target.name) {
            Some(column) if column.role == ColumnRole::Target => {}
            Some(column) => problems.push(format!(
                "target '{}' is declared as {:?}",
                target.name, column.role
            )),
            None => problems.push(format!("target '{}' is not a declared column", target.name)),
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(FeatureError::InvalidContract(format!(
                "contract '{}' does not fit the raw schema: {}",
                contract.version(),
                problems.join("; ")
            )))
        }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn required(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.required)
    }

    pub fn optional(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.required)
    }

    pub fn predictive(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.role.is_predictive())
    }

    pub fn with_role(&self, role: ColumnRole) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(move |c| c.role == role)
    }
}

fn mismatch(spec: &FeatureSpec, role: ColumnRole) -> String {
    format!(
        "feature '{}' uses a {} transform but is declared as {:?}",
        spec.name,
        spec.transform.kind(),
        role
    )
}

/// Roles of the columns actually present in a validated batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMap {
    roles: BTreeMap<String, ColumnRole>,
}

impl RoleMap {
    pub(crate) fn resolve(schema: &RawSchema, sample: &RawRecord) -> Self {
        let roles = schema
            .columns()
            .iter()
            .filter(|spec| sample.contains(&spec.name))
            .map(|spec| (spec.name.clone(), spec.role))
            .collect();
        Self { roles }
    }

    pub fn role_of(&self, column: &str) -> Option<ColumnRole> {
        self.roles.get(column).copied()
    }

    pub fn with_role(&self, role: ColumnRole) -> impl Iterator<Item = &str> {
        self.roles
            .iter()
            .filter(move |(_, r)| **r == role)
            .map(|(name, _)| name.as_str())
    }

    /// The target column, if the batch carries one.
    pub fn target(&self) -> Option<&str> {
        self.with_role(ColumnRole::Target).next()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
