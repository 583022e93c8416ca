//! Crate-level error types shared across modules.

use thiserror::Error;

/// Configuration resolution errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that failed to parse.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// An environment variable was set but not valid unicode.
    #[error("environment variable {key} is not valid unicode")]
    NotUnicode {
        /// Environment variable name.
        key: String,
    },
}
