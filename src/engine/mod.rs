//! Typed surface over the container engine.
//!
//! The supervisor never parses engine output directly; it goes through
//! [`ContainerEngine`], an async trait with typed results. Two
//! implementations exist behind it:
//!
//! - [`api::ApiEngine`] — structured requests over the engine socket
//!   (primary).
//! - [`cli::CliEngine`] — drives the `docker` binary and parses its output
//!   (fallback for setups where the socket is unreachable).
//!
//! [`connect`] picks between them: socket first, CLI when the socket fails
//! but the binary works.

pub mod api;
pub mod cli;
pub mod error;
pub mod types;

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

pub use api::ApiEngine;
pub use cli::CliEngine;
pub use error::{EngineError, Result};
pub use types::{
    ContainerSpec, ContainerState, EngineKind, EngineStatus, ExecOutput, ImageSummary, Mount,
    MountSource, PortMapping, PullProgress, PullSink,
};

/// Container engine operations, each translating one engine call into a
/// typed result.
///
/// All state reported here is engine-reported, never cached: callers that
/// need to know whether a container is running ask again.
#[async_trait::async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Which backend this is (for diagnostics and logging).
    fn kind(&self) -> EngineKind;

    /// Two-step availability probe: binary version first, then daemon
    /// liveness. Must be checked before any provisioning attempt.
    async fn status(&self) -> EngineStatus;

    /// State of the named container, in any state, or `Absent`.
    async fn container_state(&self, name: &str) -> Result<ContainerState>;

    /// Start an existing container. Starting an already-running container
    /// is a no-op success.
    async fn start_container(&self, name: &str) -> Result<()>;

    /// Stop a running container.
    async fn stop_container(&self, name: &str) -> Result<()>;

    /// Remove a container.
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Create and start a container from a spec; returns the container id.
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Whether the image exists locally. Probe failures are treated as
    /// "not present", not surfaced as errors.
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull an image, streaming progress events to `progress` as they
    /// arrive (pulls can take many minutes).
    async fn pull_image(&self, image: &str, progress: PullSink<'_>) -> Result<()>;

    /// Ensure a named volume exists. Creation is idempotent: pre-existence
    /// is success.
    async fn create_volume(&self, name: &str) -> Result<()>;

    /// Tail of the container's logs.
    async fn logs(&self, name: &str, tail: u32) -> Result<String>;

    /// Execute a command inside a running container.
    async fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput>;

    /// Locally available images.
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    /// Names of containers (in any state) matching `name` exactly.
    async fn list_containers(&self, name: &str) -> Result<Vec<String>>;
}

/// Which backend to use when connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePreference {
    /// Socket API first, CLI fallback.
    #[default]
    Auto,
    /// Socket API only.
    Api,
    /// Command-line only.
    Cli,
}

impl std::str::FromStr for EnginePreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(EnginePreference::Auto),
            "api" => Ok(EnginePreference::Api),
            "cli" => Ok(EnginePreference::Cli),
            other => Err(format!("unknown engine preference '{other}'")),
        }
    }
}

/// Version string reported by the engine binary, if it is installed.
///
/// This is the first step of the availability probe: no version output
/// means no binary on PATH.
pub async fn binary_version() -> Option<String> {
    let output = Command::new("docker")
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;

    if output.status.success() {
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!version.is_empty()).then_some(version)
    } else {
        None
    }
}

/// Connect to the container engine according to `preference`.
///
/// `Auto` prefers the socket API and falls back to the CLI when the socket
/// is unreachable but the binary responds. The choice is logged so a
/// degraded fallback is visible in diagnostics.
pub async fn connect(preference: EnginePreference) -> Result<Arc<dyn ContainerEngine>> {
    match preference {
        EnginePreference::Api => {
            let engine = ApiEngine::connect().await?;
            Ok(Arc::new(engine))
        }
        EnginePreference::Cli => {
            if binary_version().await.is_none() {
                return Err(EngineError::NotInstalled);
            }
            Ok(Arc::new(CliEngine::new()))
        }
        EnginePreference::Auto => {
            match ApiEngine::connect().await {
                Ok(engine) => Ok(Arc::new(engine)),
                Err(e) => {
                    if binary_version().await.is_none() {
                        return Err(EngineError::NotInstalled);
                    }
                    tracing::warn!(
                        error = %e,
                        "engine socket unreachable, falling back to command-line engine"
                    );
                    Ok(Arc::new(CliEngine::new()))
                }
            }
        }
    }
}
