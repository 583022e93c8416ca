//! Typed environment variable parsing.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::ConfigError;

/// Read an optional environment variable.
pub fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode {
            key: key.to_string(),
        }),
    }
}

/// Read and parse an optional environment variable, falling back to
/// `default` when unset.
pub fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
        .map(|v| v.unwrap_or(default))
}

/// Read an optional boolean environment variable.
pub fn bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be 'true' or 'false'".to_string(),
            })
        })
        .transpose()
        .map(|v| v.unwrap_or(default))
}
