//! Versioned encoding contract.
//!
//! The contract is the single authority for feature order and category
//! mappings. Batch encoding and interactive encoding both read it; neither
//! derives a mapping of its own. A contract is immutable once built: there
//! are no setters, and a different mapping needs a different version string.
//!
//! On disk a contract is pretty-printed JSON carrying a SHA-256 fingerprint
//! of its canonical (compact) form, so an edited file is rejected on load.

mod telco;
mod transform;

pub use telco::TELCO_CONTRACT_VERSION;
pub use transform::{FeatureSpec, Transform};

use crate::error::{FeatureError, Result, ResultExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `<name>/v<N>`, e.g. `telco-churn/v1`.
static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_.-]*/v[0-9]+$").expect("Invalid regex: contract version"));

static TELCO_V1: Lazy<Arc<EncodingContract>> = Lazy::new(|| Arc::new(telco::telco_v1()));

/// Ordered feature layout plus category mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingContract {
    version: String,
    features: Vec<FeatureSpec>,
    target: FeatureSpec,
}

/// On-disk form: the contract plus its fingerprint.
#[derive(Serialize)]
struct ContractDocumentOut<'a> {
    #[serde(flatten)]
    contract: &'a EncodingContract,
    fingerprint: String,
}

#[derive(Deserialize)]
struct ContractDocumentIn {
    version: String,
    features: Vec<FeatureSpec>,
    target: FeatureSpec,
    #[serde(default)]
    fingerprint: Option<String>,
}

impl EncodingContract {
    /// Build and validate a contract.
    ///
    /// Rejects a malformed version string, duplicate or blank feature names,
    /// inconsistent transform parameters, and a target that is not binary.
    pub fn new(version: String, features: Vec<FeatureSpec>, target: FeatureSpec) -> Result<Self> {
        if !VERSION_PATTERN.is_match(&version) {
            return Err(FeatureError::InvalidContract(format!(
                "version '{}' does not look like '<name>/v<N>'",
                version
            )));
        }
        if features.is_empty() {
            return Err(FeatureError::InvalidContract(
                "contract declares no features".to_string(),
            ));
        }

        let mut names = BTreeSet::new();
        for spec in features.iter().chain(std::iter::once(&target)) {
            if spec.name.trim().is_empty() {
                return Err(FeatureError::InvalidContract(
                    "feature name must not be blank".to_string(),
                ));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(FeatureError::InvalidContract(format!(
                    "column '{}' is declared twice",
                    spec.name
                )));
            }
            spec.transform
                .check()
                .map_err(|reason| FeatureError::InvalidContract(format!("{}: {}", spec.name, reason)))?;
        }

        if !matches!(target.transform, Transform::Binary { .. }) {
            return Err(FeatureError::InvalidContract(format!(
                "target '{}' must use a binary transform, found {}",
                target.name,
                target.transform.kind()
            )));
        }

        Ok(Self::from_parts_unchecked(version, features, target))
    }

    pub(crate) fn from_parts_unchecked(
        version: String,
        features: Vec<FeatureSpec>,
        target: FeatureSpec,
    ) -> Self {
        Self {
            version,
            features,
            target,
        }
    }

    /// The published Telco churn contract (`telco-churn/v1`).
    pub fn telco_v1() -> Arc<EncodingContract> {
        Arc::clone(&TELCO_V1)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn target(&self) -> &FeatureSpec {
        &self.target
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Feature names in vector order.
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Position of a feature in the vector.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    /// Fail unless this contract is the version a model was trained on.
    pub fn ensure_version(&self, expected: &str) -> Result<()> {
        if self.version != expected {
            return Err(FeatureError::ContractVersionMismatch {
                expected: expected.to_string(),
                found: self.version.clone(),
            });
        }
        Ok(())
    }

    /// Hex SHA-256 of the compact JSON form.
    pub fn fingerprint(&self) -> String {
        // Serializing plain strings and vectors cannot fail.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let document = ContractDocumentOut {
            contract: self,
            fingerprint: self.fingerprint(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Parse and validate a contract document.
    ///
    /// A document without a fingerprint is accepted (hand-written contracts);
    /// one whose fingerprint does not match its content is not.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: ContractDocumentIn = serde_json::from_str(json)?;
        let contract = Self::new(document.version, document.features, document.target)?;

        match document.fingerprint {
            Some(stored) if stored != contract.fingerprint() => {
                return Err(FeatureError::InvalidContract(format!(
                    "fingerprint mismatch for '{}': document was modified after publishing",
                    contract.version
                )));
            }
            Some(_) => debug!("Contract fingerprint verified"),
            None => warn!("Contract '{}' carries no fingerprint", contract.version),
        }

        Ok(contract)
    }

    /// Write the contract as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json_pretty()?)
            .context(format!("Failed to write contract to {}", path.display()))?;
        info!("Saved contract '{}' to {}", self.version, path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .context(format!("Failed to read contract from {}", path.display()))?;
        let contract =
            Self::from_json(&json).context(format!("Invalid contract file {}", path.display()))?;
        info!(
            "Loaded contract '{}' ({} features) from {}",
            contract.version,
            contract.feature_count(),
            path.display()
        );
        Ok(contract)
    }
}
