//! Single-record encoding for interactive prediction.
//!
//! An [`InferenceSession`] runs one customer's answers through the same
//! validator, cleaner and [`CategoricalEncoder`] the batch pipeline uses, so
//! the vector it returns is laid out exactly like a training row. A fitted
//! [`ScalerState`] may be attached; it is applied, never refitted.

use crate::cleaner::Cleaner;
use crate::contract::EncodingContract;
use crate::encoder::CategoricalEncoder;
use crate::error::{FeatureError, Result};
use crate::scaler::ScalerState;
use crate::schema::{RawSchema, SchemaValidator};
use crate::types::RawRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Encodes interactive records against a pinned contract.
#[derive(Debug, Clone)]
pub struct InferenceSession {
    validator: SchemaValidator,
    cleaner: Cleaner,
    encoder: CategoricalEncoder,
    scaler: Option<ScalerState>,
}

impl InferenceSession {
    /// Open a session, failing if `contract` is not the version the model
    /// expects. The raw schema is derived from the contract.
    pub fn new(contract: Arc<EncodingContract>, expected_version: &str) -> Result<Self> {
        let schema = RawSchema::from_contract(&contract);
        Self::with_schema(contract, expected_version, schema)
    }

    /// Like [`new`](Self::new) with an explicit raw schema, which must
    /// require every contract feature with a fitting role.
    pub fn with_schema(
        contract: Arc<EncodingContract>,
        expected_version: &str,
        schema: RawSchema,
    ) -> Result<Self> {
        contract.ensure_version(expected_version)?;
        schema.check_contract(&contract)?;

        Ok(Self {
            // Single records are never dropped, so the rate is irrelevant.
            cleaner: Cleaner::new(&schema, 0.0),
            validator: SchemaValidator::new(schema),
            encoder: CategoricalEncoder::new(contract),
            scaler: None,
        })
    }

    /// Attach a scaler fitted on the model's training table.
    pub fn with_scaler(mut self, state: ScalerState) -> Result<Self> {
        let contract = self.encoder.contract();
        state.check_layout(contract.version(), &contract.feature_names())?;
        self.scaler = Some(state);
        Ok(self)
    }

    pub fn contract(&self) -> &EncodingContract {
        self.encoder.contract()
    }

    pub fn is_scaled(&self) -> bool {
        self.scaler.is_some()
    }

    /// Encode one record into a feature vector in contract order.
    ///
    /// Every error names the field to correct: an absent column is a schema
    /// error, a blank or non-numeric value an invalid-record error, and an
    /// unknown category an encoding error.
    pub fn encode(&self, record: &RawRecord) -> Result<Vec<f64>> {
        self.validator.validate_single(record)?;

        let mut record = record.clone();
        // Labels are irrelevant at prediction time, even blank ones.
        record.remove(&self.contract().target().name);

        let cleaned = self.cleaner.clean_single(record)?;
        let vector = self.encoder.encode_record(&cleaned)?;
        debug!("Encoded interactive record into {} features", vector.len());

        match &self.scaler {
            Some(state) => state.transform_row(&vector),
            None => Ok(vector),
        }
    }

    /// Like [`encode`](Self::encode), with each value paired with its
    /// feature name, still in contract order.
    pub fn encode_named(&self, record: &RawRecord) -> Result<Vec<NamedFeature>> {
        let vector = self.encode(record)?;
        Ok(self
            .contract()
            .features()
            .iter()
            .zip(vector)
            .map(|(spec, value)| NamedFeature {
                name: spec.name.clone(),
                value,
            })
            .collect())
    }
}

/// One encoded value and the feature it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedFeature {
    pub name: String,
    pub value: f64,
}

/// Churn risk band for a predicted probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Low up to 0.3, Medium up to 0.7, High above.
    pub fn from_probability(probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(FeatureError::InvalidRecord {
                field: "probability".to_string(),
                reason: format!("{} is not a probability", probability),
            });
        }

        Ok(if probability <= 0.3 {
            Self::Low
        } else if probability <= 0.7 {
            Self::Medium
        } else {
            Self::High
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FeatureSpec, TELCO_CONTRACT_VERSION, Transform};
    use crate::types::RawValue;
    use pretty_assertions::assert_eq;

    fn form() -> RawRecord {
        RawRecord::new()
            .with("gender", "Male")
            .with("SeniorCitizen", "0")
            .with("Partner", "Yes")
            .with("Dependents", "No")
            .with("tenure", "12")
            .with("PhoneService", "Yes")
            .with("MultipleLines", "No phone service")
            .with("InternetService", "Fiber optic")
            .with("OnlineSecurity", "No internet service")
            .with("OnlineBackup", "No")
            .with("DeviceProtection", "No")
            .with("TechSupport", "No")
            .with("StreamingTV", "No")
            .with("StreamingMovies", "No")
            .with("Contract", "Month-to-month")
            .with("PaperlessBilling", "Yes")
            .with("PaymentMethod", "Electronic check")
            .with("MonthlyCharges", "70.35")
            .with("TotalCharges", "845.5")
    }

    fn session() -> InferenceSession {
        InferenceSession::new(EncodingContract::telco_v1(), TELCO_CONTRACT_VERSION).unwrap()
    }

    #[test]
    fn test_form_encodes_like_training_row() {
        let vector = session().encode(&form()).unwrap();
        assert_eq!(
            vector,
            vec![
                1.0, 0.0, 1.0, 0.0, 12.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0,
                1.0, 70.35, 845.5
            ]
        );
    }

    #[test]
    fn test_blank_label_is_ignored() {
        let record = form().with("Churn", RawValue::Null).with("customerID", "x");
        assert_eq!(session().encode(&record).unwrap().len(), 19);
    }

    #[test]
    fn test_version_mismatch_refuses_session() {
        let err = InferenceSession::new(EncodingContract::telco_v1(), "telco-churn/v2").unwrap_err();
        assert!(matches!(err, FeatureError::ContractVersionMismatch { .. }));
    }

    #[test]
    fn test_errors_name_the_field() {
        let mut missing = form();
        missing.remove("Contract");
        assert_eq!(session().encode(&missing).unwrap_err().field(), Some("Contract"));

        let blank = form().with("TotalCharges", " ");
        assert_eq!(session().encode(&blank).unwrap_err().field(), Some("TotalCharges"));

        let unknown = form().with("PaymentMethod", "Bitcoin");
        assert_eq!(session().encode(&unknown).unwrap_err().field(), Some("PaymentMethod"));
    }

    #[test]
    fn test_scaler_must_match_contract() {
        let state = ScalerState {
            contract_version: TELCO_CONTRACT_VERSION.to_string(),
            feature_names: vec!["tenure".to_string()],
            centers: vec![0.0],
            scales: vec![1.0],
            fitted_rows: 10,
        };
        assert!(session().with_scaler(state).is_err());

        let contract = EncodingContract::telco_v1();
        let state = ScalerState {
            contract_version: TELCO_CONTRACT_VERSION.to_string(),
            feature_names: contract.feature_names(),
            centers: vec![1.0; 19],
            scales: vec![2.0; 19],
            fitted_rows: 10,
        };
        let scaled = session().with_scaler(state).unwrap();
        assert!(scaled.is_scaled());
        let vector = scaled.encode(&form()).unwrap();
        assert_eq!(vector[4], 5.5);
    }

    #[test]
    fn test_custom_contract_session() {
        let contract = EncodingContract::new(
            "mini/v1".to_string(),
            vec![FeatureSpec::new("Partner", Transform::binary("Yes", "No"))],
            FeatureSpec::new("Churn", Transform::binary("Yes", "No")),
        )
        .unwrap();
        let session = InferenceSession::new(Arc::new(contract), "mini/v1").unwrap();
        assert_eq!(session.encode(&form()).unwrap(), vec![1.0]);
    }

    fn discount_contract() -> Arc<EncodingContract> {
        let contract = EncodingContract::new(
            "telco-churn/v2".to_string(),
            vec![
                FeatureSpec::new("tenure", Transform::Numeric),
                FeatureSpec::new("Discount", Transform::Numeric),
            ],
            FeatureSpec::new("Churn", Transform::binary("Yes", "No")),
        )
        .unwrap();
        Arc::new(contract)
    }

    #[test]
    fn test_schema_must_cover_contract() {
        let err =
            InferenceSession::with_schema(discount_contract(), "telco-churn/v2", RawSchema::telco())
                .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONTRACT");
        assert!(err.to_string().contains("Discount"));
    }

    #[test]
    fn test_derived_schema_checks_contract_columns() {
        let session = InferenceSession::new(discount_contract(), "telco-churn/v2").unwrap();
        let record = RawRecord::new().with("tenure", "3").with("Discount", "5");
        assert_eq!(session.encode(&record).unwrap(), vec![3.0, 5.0]);

        let blank = record.clone().with("Discount", " ");
        let err = session.encode(&blank).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RECORD");
        assert_eq!(err.field(), Some("Discount"));

        let missing = RawRecord::new().with("tenure", "3");
        let err = session.encode(&missing).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
        assert_eq!(err.field(), Some("Discount"));
    }

    #[test]
    fn test_named_features_keep_contract_order() {
        let named = session().encode_named(&form()).unwrap();
        let names: Vec<&str> = named.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names[..3], ["gender", "SeniorCitizen", "Partner"]);
        assert_eq!(names[18], "TotalCharges");

        let json = serde_json::to_value(&named).unwrap();
        assert_eq!(json[0], serde_json::json!({"name": "gender", "value": 1.0}));
        assert_eq!(json[4], serde_json::json!({"name": "tenure", "value": 12.0}));
    }

    #[test]
    fn test_risk_level_bands() {
        assert_eq!(RiskLevel::from_probability(0.0).unwrap(), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.3).unwrap(), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.31).unwrap(), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.7).unwrap(), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.71).unwrap(), RiskLevel::High);
        assert!(RiskLevel::from_probability(1.2).is_err());
        assert!(RiskLevel::from_probability(f64::NAN).is_err());
    }
}
