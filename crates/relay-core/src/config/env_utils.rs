//! Environment variable loading with type conversion and default values,
//! shared by every field `RelayConfig::from_env` reads.

use crate::config::{ConfigError, ConfigResult};
use std::env;
use std::str::FromStr;

/// Environment variable loader with type conversion and validation.
pub struct EnvLoader;

impl EnvLoader {
    /// Load an optional environment variable with a default value.
    pub fn load_with_default<T>(key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::parse_error(format!("{}: {}", key, e), "environment variable", key)),
            Err(_) => Ok(default),
        }
    }

    /// Load a boolean environment variable with common string variations.
    pub fn load_bool(key: &str, default: bool) -> bool {
        match env::var(key).as_deref() {
            Ok("true" | "True" | "TRUE" | "1" | "yes" | "Yes" | "YES" | "on" | "On" | "ON") => true,
            Ok("false" | "False" | "FALSE" | "0" | "no" | "No" | "NO" | "off" | "Off" | "OFF") => false,
            _ => default,
        }
    }

    /// Load a duration given in whole seconds, falling back to `default_seconds`.
    pub fn load_duration_seconds(key: &str, default_seconds: u64) -> ConfigResult<std::time::Duration> {
        let seconds = Self::load_with_default(key, default_seconds)?;
        Ok(std::time::Duration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_with_default_parses_present_value() {
        env::set_var("TEST_ENV_UTILS_DEFAULT", "100");
        let result: ConfigResult<i32> = EnvLoader::load_with_default("TEST_ENV_UTILS_DEFAULT", 50);
        assert_eq!(result.unwrap(), 100);
        env::remove_var("TEST_ENV_UTILS_DEFAULT");
    }

    #[test]
    fn load_with_default_falls_back_when_absent() {
        env::remove_var("TEST_ENV_UTILS_MISSING");
        let result: ConfigResult<i32> = EnvLoader::load_with_default("TEST_ENV_UTILS_MISSING", 50);
        assert_eq!(result.unwrap(), 50);
    }

    #[test]
    fn load_bool_recognizes_common_variants() {
        env::set_var("TEST_ENV_UTILS_BOOL_TRUE", "true");
        assert!(EnvLoader::load_bool("TEST_ENV_UTILS_BOOL_TRUE", false));

        env::set_var("TEST_ENV_UTILS_BOOL_FALSE", "0");
        assert!(!EnvLoader::load_bool("TEST_ENV_UTILS_BOOL_FALSE", true));

        env::remove_var("TEST_ENV_UTILS_BOOL_MISSING");
        assert!(EnvLoader::load_bool("TEST_ENV_UTILS_BOOL_MISSING", true));

        env::remove_var("TEST_ENV_UTILS_BOOL_TRUE");
        env::remove_var("TEST_ENV_UTILS_BOOL_FALSE");
    }

    #[test]
    fn load_duration_seconds_converts_to_duration() {
        env::set_var("TEST_ENV_UTILS_DURATION", "30");
        let result = EnvLoader::load_duration_seconds("TEST_ENV_UTILS_DURATION", 10);
        assert_eq!(result.unwrap(), std::time::Duration::from_secs(30));
        env::remove_var("TEST_ENV_UTILS_DURATION");
    }
}
