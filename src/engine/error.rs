//! Error types for container engine access.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while talking to the container engine.
///
/// These are transport-level failures; the supervisor translates them into
/// the operation-specific errors its callers branch on.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary is not installed (or not on PATH).
    #[error("container engine is not installed")]
    NotInstalled,

    /// The engine is installed but its daemon is not responding.
    #[error("container engine daemon is not running")]
    DaemonDown,

    /// An engine CLI command exited with a non-zero status.
    #[error("`{command}` failed with exit code {code}: {stderr}")]
    CommandFailed {
        /// The command that was run (program plus arguments).
        command: String,
        /// Exit code reported by the process.
        code: i32,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The engine API returned an error.
    #[error("engine API error: {reason}")]
    Api {
        /// Reason reported by the API client.
        reason: String,
    },

    /// Engine output could not be parsed.
    #[error("failed to parse engine output: {reason}")]
    Parse {
        /// What failed to parse.
        reason: String,
    },

    /// I/O error while spawning or reading from the engine process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bollard::errors::Error> for EngineError {
    fn from(e: bollard::errors::Error) -> Self {
        EngineError::Api {
            reason: e.to_string(),
        }
    }
}
