//! Configuration validation helpers used by `RelayConfig::validate`.

use crate::config::{ConfigError, ConfigResult};

/// Validate that a string is not empty.
pub fn validate_non_empty_string(value: &str, field_name: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationFailed(format!("{} cannot be empty", field_name)));
    }
    Ok(())
}

/// Validate URL format.
pub fn validate_url(url: &str, field_name: &str) -> ConfigResult<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::ValidationFailed(format!("{} must be a valid HTTP(S) URL", field_name)));
    }
    Ok(())
}
