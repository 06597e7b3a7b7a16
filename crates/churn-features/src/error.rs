//! Error taxonomy for the feature encoding pipeline.
//!
//! Four failure families are structural and never retried:
//!
//! - [`FeatureError::Schema`]: required raw columns are absent.
//! - [`FeatureError::DataQuality`]: cleaning dropped more rows than the
//!   configured threshold tolerates.
//! - [`FeatureError::Encoding`]: a value is not covered by the contract.
//! - [`FeatureError::ContractVersionMismatch`]: the loaded contract is not
//!   the one the model was trained against.
//!
//! Errors are serializable as `{code, message}` so a front end can show the
//! offending field without parsing the message text.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the feature pipeline.
#[derive(Error, Debug)]
pub enum FeatureError {
    /// Required columns are missing from the raw record set.
    #[error("Schema error: missing required column(s) {missing:?}{}", row_suffix(.row))]
    Schema {
        missing: Vec<String>,
        /// First record (0-based) where a column was found missing.
        row: Option<usize>,
    },

    /// Too many rows were dropped during cleaning.
    #[error(
        "Data quality error: {dropped} of {total} rows unusable ({:.2}%), threshold is {:.2}%",
        .rate * 100.0,
        .threshold * 100.0
    )]
    DataQuality {
        dropped: usize,
        total: usize,
        rate: f64,
        threshold: f64,
    },

    /// A value could not be encoded under the contract.
    #[error("Encoding error in column '{column}'{}: value {value} {reason}", row_suffix(.row))]
    Encoding {
        row: Option<usize>,
        column: String,
        value: String,
        reason: String,
    },

    /// The contract version does not match the one the model expects.
    #[error("Contract version mismatch: model expects '{expected}', contract is '{found}'")]
    ContractVersionMismatch { expected: String, found: String },

    /// An interactive record has an unusable field.
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidRecord { field: String, reason: String },

    /// The contract document is malformed or inconsistent.
    #[error("Invalid encoding contract: {0}")]
    InvalidContract(String),

    /// Scaler fit or transform failed.
    #[error("Scaler error: {0}")]
    Scaler(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pipeline was cancelled by the caller.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FeatureError>,
    },
}

fn row_suffix(row: &Option<usize>) -> String {
    match row {
        Some(row) => format!(" at row {}", row),
        None => String::new(),
    }
}

impl FeatureError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FeatureError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for callers that branch on the failure family.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "SCHEMA_ERROR",
            Self::DataQuality { .. } => "DATA_QUALITY_ERROR",
            Self::Encoding { .. } => "ENCODING_ERROR",
            Self::ContractVersionMismatch { .. } => "CONTRACT_VERSION_MISMATCH",
            Self::InvalidRecord { .. } => "INVALID_RECORD",
            Self::InvalidContract(_) => "INVALID_CONTRACT",
            Self::Scaler(_) => "SCALER_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Cancelled => "CANCELLED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether the error comes from the data, contract or configuration
    /// rather than from the environment or the caller.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Cancelled | Self::Io(_) => false,
            Self::WithContext { source, .. } => source.is_fatal(),
            _ => true,
        }
    }

    /// The field a human should correct, when the error points at one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Encoding { column, .. } => Some(column),
            Self::InvalidRecord { field, .. } => Some(field),
            Self::Schema { missing, .. } => missing.first().map(String::as_str),
            Self::WithContext { source, .. } => source.field(),
            _ => None,
        }
    }
}

/// Errors are serialized as a struct with `code`, `message` and, when
/// known, the offending `field`.
impl Serialize for FeatureError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("FeatureError", 3)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.serialize_field("field", &self.field())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, FeatureError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FeatureError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FeatureError::Io(e).with_context(context))
    }
}
