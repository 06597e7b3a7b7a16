//! The published Telco churn contract.
//!
//! Changing anything here changes what a trained model's inputs mean; do it
//! under a new version string, never in place.

use super::{EncodingContract, FeatureSpec, Transform};

pub const TELCO_CONTRACT_VERSION: &str = "telco-churn/v1";

const NO_PHONE_SERVICE: &str = "No phone service";
const NO_INTERNET_SERVICE: &str = "No internet service";

/// Add-on columns that only make sense with internet access.
const INTERNET_ADD_ONS: [&str; 6] = [
    "OnlineSecurity",
    "OnlineBackup",
    "DeviceProtection",
    "TechSupport",
    "StreamingTV",
    "StreamingMovies",
];

pub(super) fn telco_v1() -> EncodingContract {
    let yes_no = || Transform::binary("Yes", "No");

    let mut features = vec![
        FeatureSpec::new("gender", Transform::binary("Male", "Female")),
        FeatureSpec::new("SeniorCitizen", Transform::Flag),
        FeatureSpec::new("Partner", yes_no()),
        FeatureSpec::new("Dependents", yes_no()),
        FeatureSpec::new("tenure", Transform::Numeric),
        FeatureSpec::new("PhoneService", yes_no()),
        FeatureSpec::new(
            "MultipleLines",
            Transform::binary_with_synonyms("Yes", "No", &[NO_PHONE_SERVICE]),
        ),
        FeatureSpec::new(
            "InternetService",
            Transform::indicator("Fiber optic", &["DSL", "Fiber optic", "No"]),
        ),
    ];

    features.extend(INTERNET_ADD_ONS.iter().map(|name| {
        FeatureSpec::new(
            *name,
            Transform::binary_with_synonyms("Yes", "No", &[NO_INTERNET_SERVICE]),
        )
    }));

    features.extend([
        FeatureSpec::new(
            "Contract",
            Transform::indicator("Month-to-month", &["Month-to-month", "One year", "Two year"]),
        ),
        FeatureSpec::new("PaperlessBilling", yes_no()),
        FeatureSpec::new(
            "PaymentMethod",
            Transform::indicator(
                "Electronic check",
                &[
                    "Electronic check",
                    "Mailed check",
                    "Bank transfer (automatic)",
                    "Credit card (automatic)",
                ],
            ),
        ),
        FeatureSpec::new("MonthlyCharges", Transform::Numeric),
        FeatureSpec::new("TotalCharges", Transform::Numeric),
    ]);

    EncodingContract::from_parts_unchecked(
        TELCO_CONTRACT_VERSION.to_string(),
        features,
        FeatureSpec::new("Churn", yes_no()),
    )
}
