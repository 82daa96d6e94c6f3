use thiserror::Error;

/// Configuration error type
///
/// Raised before any file or database I/O takes place.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("Conflicting configuration: {first} and {second} cannot both be set")]
    Conflict { first: String, second: String },

    #[error("Invalid database URL: {message}")]
    InvalidUrl { message: String },
}

impl ConfigError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn validation_failed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::Conflict {
            first: first.into(),
            second: second.into(),
        }
    }
}

/// Check that `value` is a plain SQL identifier.
///
/// Ledger schema and table names are interpolated into DDL, so only
/// `[A-Za-z_][A-Za-z0-9_]*` up to 63 bytes is accepted.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    let mut chars = value.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || value.len() > 63 {
        return Err(ConfigError::invalid_value(
            field,
            value,
            "an identifier of letters, digits and underscores (max 63 chars)",
        ));
    }
    Ok(())
}
