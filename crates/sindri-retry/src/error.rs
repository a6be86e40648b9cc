//! Error types for sindri-retry
//!
//! These are construction-time errors: a policy that fails to validate, or a
//! policy file that cannot be read. Failures of the retried operation never
//! surface here; they are recorded in the run's context instead.

use thiserror::Error;

/// Result type alias using sindri-retry's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building a retry policy
#[derive(Error, Debug)]
pub enum Error {
    /// Numeric option is not a real number (NaN)
    #[error("'{name}' should be a number")]
    NotANumber { name: &'static str },

    /// Numeric option is below its minimum
    #[error("'{name}' should be >= {min}")]
    OutOfRange { name: &'static str, min: f64 },

    /// Numeric option is above its maximum
    #[error("'{name}' should be <= {max}")]
    TooLarge { name: &'static str, max: f64 },

    /// Numeric option must be finite
    #[error("'{name}' should be finite")]
    NotFinite { name: &'static str },

    /// Numeric option must be a whole number
    #[error("'{name}' should be an integer")]
    NotInteger { name: &'static str },

    /// Policy file not found
    #[error("Retry policy file not found: {path}")]
    ConfigNotFound { path: String },

    /// No policy registered under the requested operation name
    #[error("Unknown retry operation: {operation}")]
    UnknownOperation { operation: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an unknown operation error
    pub fn unknown_operation(operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            operation: operation.into(),
        }
    }

    /// Whether this is the type-mismatch class of validation failure
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::NotANumber { .. })
    }

    /// Whether this is the range class of validation failure
    pub fn is_range_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. }
                | Self::TooLarge { .. }
                | Self::NotFinite { .. }
                | Self::NotInteger { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_classes() {
        assert!(Error::NotANumber { name: "tries" }.is_type_mismatch());
        assert!(Error::OutOfRange {
            name: "tries",
            min: 1.0
        }
        .is_range_error());
        assert!(Error::NotFinite { name: "factor" }.is_range_error());
        assert!(!Error::config_not_found("retry.yaml").is_range_error());
    }

    #[test]
    fn test_display() {
        let err = Error::OutOfRange {
            name: "concurrency",
            min: 1.0,
        };
        assert_eq!(err.to_string(), "'concurrency' should be >= 1");

        let err = Error::unknown_operation("download");
        assert!(err.to_string().contains("download"));
    }
}
