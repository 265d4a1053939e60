//! Error types for AMIGrid
//!
//! This module defines the validation taxonomy used at the stream gate and
//! the crate-level error for configuration and I/O.

use thiserror::Error;

/// Result type alias for AMIGrid operations
pub type Result<T> = std::result::Result<T, AmiError>;

/// Main error type for AMIGrid operations
#[derive(Error, Debug)]
pub enum AmiError {
    /// A record failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid or unrecognized configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error while writing rows or reading config
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a raw record is rejected by the validator
///
/// Validation errors are always recoverable at the stream level: the
/// offending record goes to the dead-letter sink and processing continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Payload is not a JSON object
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Required field missing or not parseable as its type
    #[error("Schema error on `{field}`: {reason}")]
    Schema { field: &'static str, reason: String },

    /// Field parsed but its value is outside the accepted range
    #[error("Range error on `{field}`: {value} {reason}")]
    Range {
        field: &'static str,
        value: f64,
        reason: String,
    },
}

impl ValidationError {
    /// Stable machine-readable kind, used as a dead-letter label
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Malformed(_) => "json_decode_error",
            ValidationError::Schema { .. } => "schema_error",
            ValidationError::Range { .. } => "range_error",
        }
    }

    pub(crate) fn missing(field: &'static str) -> Self {
        ValidationError::Schema {
            field,
            reason: "missing required field".to_string(),
        }
    }

    pub(crate) fn schema(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Schema {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            ValidationError::Malformed("eof".into()).kind(),
            "json_decode_error"
        );
        assert_eq!(ValidationError::missing("voltage").kind(), "schema_error");
        let range = ValidationError::Range {
            field: "voltage",
            value: -1.0,
            reason: "below zero".into(),
        };
        assert_eq!(range.kind(), "range_error");
    }

    #[test]
    fn test_display() {
        let err = ValidationError::missing("device_id");
        assert_eq!(
            err.to_string(),
            "Schema error on `device_id`: missing required field"
        );
    }

    #[test]
    fn test_from_validation() {
        let err: AmiError = ValidationError::missing("group_id").into();
        assert!(matches!(err, AmiError::Validation(_)));
    }
}
