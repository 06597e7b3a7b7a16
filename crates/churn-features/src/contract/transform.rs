use serde::{Deserialize, Serialize};

/// How one raw column becomes one numeric feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// Two-valued category: `positive` is 1, `negative` is 0.
    ///
    /// `synonyms` are "not applicable" categories that collapse into
    /// `negative` before mapping.
    Binary {
        positive: String,
        negative: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        synonyms: Vec<String>,
    },
    /// Multi-valued category reduced to one indicator: `category` is 1, every
    /// other value in `known` is 0.
    Indicator { category: String, known: Vec<String> },
    /// Already 0/1 (number or digit text).
    Flag,
    /// Continuous number passed through.
    Numeric,
}

impl Transform {
    pub fn binary(positive: &str, negative: &str) -> Self {
        Self::Binary {
            positive: positive.to_string(),
            negative: negative.to_string(),
            synonyms: Vec::new(),
        }
    }

    pub fn binary_with_synonyms(positive: &str, negative: &str, synonyms: &[&str]) -> Self {
        Self::Binary {
            positive: positive.to_string(),
            negative: negative.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn indicator(category: &str, known: &[&str]) -> Self {
        Self::Indicator {
            category: category.to_string(),
            known: known.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Binary { .. } => "binary",
            Self::Indicator { .. } => "indicator",
            Self::Flag => "flag",
            Self::Numeric => "numeric",
        }
    }

    /// Internal consistency of the parameters, independent of any data.
    pub(crate) fn check(&self) -> Result<(), String> {
        match self {
            Self::Binary {
                positive,
                negative,
                synonyms,
            } => {
                if positive.trim().is_empty() || negative.trim().is_empty() {
                    return Err("binary categories must not be blank".to_string());
                }
                if positive == negative {
                    return Err(format!("positive and negative are both '{}'", positive));
                }
                if let Some(s) = synonyms.iter().find(|s| *s == positive) {
                    return Err(format!("synonym '{}' collides with the positive category", s));
                }
                Ok(())
            }
            Self::Indicator { category, known } => {
                if !known.contains(category) {
                    return Err(format!("indicator category '{}' is not in its known set", category));
                }
                if known.len() < 2 {
                    return Err("indicator needs at least two known categories".to_string());
                }
                let mut seen = std::collections::BTreeSet::new();
                if let Some(dup) = known.iter().find(|k| !seen.insert(k.as_str())) {
                    return Err(format!("category '{}' is listed twice", dup));
                }
                Ok(())
            }
            Self::Flag | Self::Numeric => Ok(()),
        }
    }
}

/// A named feature and its transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(flatten)]
    pub transform: Transform,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            transform,
        }
    }
}
