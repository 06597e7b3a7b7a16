//! Value coercion for numeric-continuous columns.

use crate::types::RawValue;

/// Outcome of coercing one raw cell to a number.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Coercion {
    Value(f64),
    /// Null, or a blank/whitespace-only string.
    Missing,
    /// Present but not a finite number.
    Unparseable(String),
}

/// Coerce a raw cell to `f64`.
///
/// Strict: surrounding whitespace is ignored, but currency symbols,
/// separators or error markers are not stripped. A blank placeholder and a
/// parse failure are distinct outcomes only for reporting; the caller drops
/// the row either way.
pub(crate) fn coerce_numeric(value: &RawValue) -> Coercion {
    match value {
        RawValue::Null => Coercion::Missing,
        RawValue::Int(i) => Coercion::Value(*i as f64),
        RawValue::Float(f) if f.is_finite() => Coercion::Value(*f),
        RawValue::Float(f) => Coercion::Unparseable(f.to_string()),
        RawValue::Bool(b) => Coercion::Unparseable(b.to_string()),
        RawValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Coercion::Missing;
            }
            match trimmed.parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => Coercion::Value(parsed),
                _ => Coercion::Unparseable(s.clone()),
            }
        }
    }
}
