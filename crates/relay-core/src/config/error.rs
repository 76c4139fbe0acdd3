//! Configuration error types.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("invalid configuration value for {key}: {value} (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("parsing error: {0}")]
    ParseError(String),

    #[error("required field missing: {0}")]
    RequiredFieldMissing(String),
}

impl ConfigError {
    /// Build an [`EnvVarNotFound`](ConfigError::EnvVarNotFound), optionally
    /// noting a hint about how to set it.
    pub fn env_var_not_found(key: &str, hint: Option<&str>) -> Self {
        match hint {
            Some(hint) => ConfigError::EnvVarNotFound(format!("{} ({})", key, hint)),
            None => ConfigError::EnvVarNotFound(key.to_string()),
        }
    }

    /// Build a [`ParseError`](ConfigError::ParseError) tagging the source
    /// (e.g. `"environment variable"`) and field name.
    pub fn parse_error(message: impl Into<String>, source: &str, field: &str) -> Self {
        ConfigError::ParseError(format!("{} ({} {})", message.into(), source, field))
    }

    /// Build an [`InvalidValue`](ConfigError::InvalidValue).
    pub fn invalid_value(key: &str, value: &str, expected: &str, _source: &str) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Build a [`ValidationFailed`](ConfigError::ValidationFailed), folding
    /// in a suggestion and the offending fields.
    pub fn validation_failed(
        message: impl Into<String>,
        category: &str,
        suggestion: &str,
        fields: Vec<(String, String)>,
    ) -> Self {
        let field_summary = fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        ConfigError::ValidationFailed(format!(
            "{} [{}] suggestion: {} ({})",
            message.into(),
            category,
            suggestion,
            field_summary
        ))
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
