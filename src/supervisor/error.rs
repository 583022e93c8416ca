//! Error taxonomy for the service supervisor.

use thiserror::Error;

use crate::engine::EngineError;

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors the presentation layer branches on.
///
/// Engine-level failures arrive as [`EngineError`] and are translated into
/// the specific member the caller needs ("install the engine", "start the
/// engine", "check for port conflicts") at the operation that owns the
/// context.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The container engine is not installed.
    #[error("container engine is not installed")]
    EngineNotInstalled,

    /// The engine is installed but its daemon is not running.
    #[error("container engine daemon is not running")]
    EngineDaemonDown,

    /// No free port in the scanned range.
    #[error("no available port in range {start}-{end}")]
    NoAvailablePort {
        /// First port scanned.
        start: u16,
        /// Last port scanned.
        end: u16,
    },

    /// Pulling the service image failed.
    #[error("failed to pull image '{image}': {reason}")]
    ImagePullFailed {
        /// Image reference.
        image: String,
        /// Reason for failure.
        reason: String,
    },

    /// The run command failed.
    #[error("failed to run container '{name}': {reason}")]
    ContainerRunFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// The service never answered its liveness endpoint within budget.
    #[error("service at {url} not healthy after {attempts} attempts")]
    HealthTimeout {
        /// Probed URL.
        url: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Startup was cancelled before the service became ready.
    #[error("startup cancelled")]
    Cancelled,

    /// A previous startup attempt failed; an explicit retry is required
    /// before the sequence can run again.
    #[error("previous startup attempt failed; reset before retrying")]
    PreviousAttemptFailed,

    /// An engine call failed outside the cases above.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
