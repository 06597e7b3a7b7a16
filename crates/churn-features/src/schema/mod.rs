//! Schema validation for raw record sets.
//!
//! The validator is a pure check: it either hands the records back untouched
//! together with the resolved role of every column, or fails with
//! [`FeatureError::Schema`] naming the absent columns. Missing columns are
//! never defaulted.

mod roles;

pub use roles::{ColumnRole, ColumnSpec, RawSchema, RoleMap};

use crate::error::{FeatureError, Result};
use crate::types::{RawRecord, RecordSet};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Checks record sets and single records against a [`RawSchema`].
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schema: RawSchema,
}

impl SchemaValidator {
    pub fn new(schema: RawSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &RawSchema {
        &self.schema
    }

    /// Validate a batch.
    ///
    /// Every record must carry every required column. Optional columns
    /// (identifier, target) are all-or-nothing: if the first record has the
    /// target, every record must.
    pub fn validate(&self, records: RecordSet) -> Result<(RecordSet, RoleMap)> {
        info!("Validating {} records against raw schema", records.len());

        if records.is_empty() {
            debug!("Empty record set, nothing to validate");
            return Ok((records, RoleMap::default()));
        }
        let first = &records.records()[0];

        let mut expected: Vec<&ColumnSpec> = self.schema.required().collect();
        expected.extend(
            self.schema
                .optional()
                .filter(|spec| first.contains(&spec.name)),
        );

        let mut missing: BTreeSet<String> = BTreeSet::new();
        let mut first_bad_row = None;

        for (idx, record) in records.iter().enumerate() {
            for spec in &expected {
                if !record.contains(&spec.name) {
                    missing.insert(spec.name.clone());
                    first_bad_row.get_or_insert(idx);
                }
            }
        }

        if !missing.is_empty() {
            return Err(FeatureError::Schema {
                missing: missing.into_iter().collect(),
                row: first_bad_row,
            });
        }

        let roles = RoleMap::resolve(&self.schema, first);
        debug!(
            "Resolved roles: {} identifier, {} target, {} categorical, {} numeric",
            roles.with_role(ColumnRole::Identifier).count(),
            roles.with_role(ColumnRole::Target).count(),
            roles.with_role(ColumnRole::CategoricalBinary).count()
                + roles.with_role(ColumnRole::CategoricalMulti).count(),
            roles.with_role(ColumnRole::NumericContinuous).count()
        );

        Ok((records, roles))
    }

    /// Validate one interactive record.
    ///
    /// Identifier and target are never required here; every predictive
    /// column is.
    pub fn validate_single(&self, record: &RawRecord) -> Result<RoleMap> {
        let missing: Vec<String> = self
            .schema
            .predictive()
            .filter(|spec| !record.contains(&spec.name))
            .map(|spec| spec.name.clone())
            .collect();

        if !missing.is_empty() {
            return Err(FeatureError::Schema { missing, row: None });
        }

        Ok(RoleMap::resolve(&self.schema, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawValue;

    fn full_record() -> RawRecord {
        RawSchema::telco()
            .columns()
            .iter()
            .map(|spec| (spec.name.clone(), RawValue::from("x")))
            .collect()
    }

    #[test]
    fn test_validate_passes_records_through_unchanged() {
        let records = RecordSet::new(vec![full_record(), full_record()]);
        let validator = SchemaValidator::new(RawSchema::telco());

        let (out, roles) = validator.validate(records.clone()).unwrap();
        assert_eq!(out, records);
        assert_eq!(roles.role_of("customerID"), Some(ColumnRole::Identifier));
        assert_eq!(roles.role_of("Churn"), Some(ColumnRole::Target));
        assert_eq!(roles.role_of("TotalCharges"), Some(ColumnRole::NumericContinuous));
    }

    #[test]
    fn test_missing_required_column_fails() {
        let mut broken = full_record();
        broken.remove("tenure");
        let records = RecordSet::new(vec![full_record(), broken]);

        let err = SchemaValidator::new(RawSchema::telco())
            .validate(records)
            .unwrap_err();
        match err {
            FeatureError::Schema { missing, row } => {
                assert_eq!(missing, vec!["tenure".to_string()]);
                assert_eq!(row, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_target_is_optional_but_all_or_nothing() {
        let mut without_target = full_record();
        without_target.remove("Churn");

        let validator = SchemaValidator::new(RawSchema::telco());
        let only_unlabelled = RecordSet::new(vec![without_target.clone(), without_target.clone()]);
        let (_, roles) = validator.validate(only_unlabelled).unwrap();
        assert_eq!(roles.target(), None);

        let mixed = RecordSet::new(vec![full_record(), without_target]);
        assert!(matches!(
            validator.validate(mixed),
            Err(FeatureError::Schema { .. })
        ));
    }

    #[test]
    fn test_validate_single_ignores_identifier_and_target() {
        let mut record = full_record();
        record.remove("customerID");
        record.remove("Churn");

        let validator = SchemaValidator::new(RawSchema::telco());
        assert!(validator.validate_single(&record).is_ok());

        record.remove("PaymentMethod");
        let err = validator.validate_single(&record).unwrap_err();
        assert_eq!(err.field(), Some("PaymentMethod"));
    }
}
