//! Shared types for the container engine surface.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Engine-reported state of a named container.
///
/// Always derived from a fresh engine query, never cached: a container can
/// crash between calls and the next query must say so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// No container with that name exists.
    Absent,
    /// The container exists but is not running (created, exited, dead...).
    Stopped,
    /// The container is currently running.
    Running,
}

impl ContainerState {
    /// Map an engine status string ("running", "exited", ...) to a state.
    pub fn from_status(status: &str) -> Self {
        match status.trim() {
            "running" | "restarting" => ContainerState::Running,
            _ => ContainerState::Stopped,
        }
    }
}

/// Availability of the container engine itself.
///
/// Orthogonal to [`ContainerState`]: the engine can be fully up while the
/// managed container is absent, and vice versa the container cannot be
/// queried at all while the daemon is down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// Binary present and daemon responding.
    Running {
        /// Version string reported by the engine.
        version: String,
    },
    /// Binary present but the daemon did not respond.
    DaemonDown {
        /// Version string reported by the engine binary.
        version: String,
    },
    /// Engine binary not found.
    NotInstalled,
}

impl EngineStatus {
    /// Returns true if the engine is ready for provisioning.
    pub fn is_running(&self) -> bool {
        matches!(self, EngineStatus::Running { .. })
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::Running { version } => write!(f, "running ({version})"),
            EngineStatus::DaemonDown { version } => {
                write!(f, "installed but daemon down ({version})")
            }
            EngineStatus::NotInstalled => write!(f, "not installed"),
        }
    }
}

/// Which backend is serving engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Structured API over the engine socket.
    Api,
    /// Command-line fallback, parsing process output.
    Cli,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Api => write!(f, "api"),
            EngineKind::Cli => write!(f, "cli"),
        }
    }
}

/// A host-to-container TCP port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port bound on the host.
    pub host: u16,
    /// Port inside the container.
    pub container: u16,
}

impl PortMapping {
    pub fn new(host: u16, container: u16) -> Self {
        Self { host, container }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

/// Source side of a volume mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// A host path bind-mounted into the container.
    Bind(PathBuf),
    /// A named volume managed by the engine.
    Volume(String),
}

/// A volume mount for a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: MountSource,
    /// Mount point inside the container.
    pub target: String,
}

impl Mount {
    /// Bind-mount a host path.
    pub fn bind(host_path: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: MountSource::Bind(host_path.into()),
            target: target.into(),
        }
    }

    /// Mount a named volume.
    pub fn volume(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: MountSource::Volume(name.into()),
            target: target.into(),
        }
    }

    /// Render as a `source:target` bind string understood by the engine.
    pub fn to_bind_string(&self) -> String {
        match &self.source {
            MountSource::Bind(path) => format!("{}:{}", path.display(), self.target),
            MountSource::Volume(name) => format!("{}:{}", name, self.target),
        }
    }
}

/// A complete run request for a container.
///
/// For the supervised service this is a fixed, compile-time-known value
/// (see `config::ServiceConfig::to_container_spec`), not user-editable.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Image reference, including tag.
    pub image: String,
    /// Container name; at most one container per name is managed.
    pub name: String,
    /// Host-to-container port mappings.
    pub ports: Vec<PortMapping>,
    /// Bind and named-volume mounts.
    pub mounts: Vec<Mount>,
    /// Environment variables passed to the container.
    pub env: Vec<(String, String)>,
    /// Run detached (background).
    pub detached: bool,
    /// Remove the container when it exits.
    pub remove_on_exit: bool,
}

impl ContainerSpec {
    /// Names of the persistent volumes this spec mounts.
    ///
    /// These must exist before the run command is issued.
    pub fn named_volumes(&self) -> impl Iterator<Item = &str> {
        self.mounts.iter().filter_map(|m| match &m.source {
            MountSource::Volume(name) => Some(name.as_str()),
            MountSource::Bind(_) => None,
        })
    }
}

/// One streamed progress event from an image pull.
#[derive(Debug, Clone)]
pub struct PullProgress {
    /// Layer identifier, when the engine reports one.
    pub layer: Option<String>,
    /// Status line ("Downloading", "Extracting", ...).
    pub status: String,
    /// Human-readable progress detail, when present.
    pub detail: Option<String>,
}

/// Callback invoked with streamed pull progress.
///
/// Image pulls can take many minutes; the caller renders these as they
/// arrive rather than waiting for completion.
pub type PullSink<'a> = &'a (dyn Fn(PullProgress) + Send + Sync);

/// Output of a command executed inside a running container.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Exit code from the command.
    pub exit_code: i64,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ExecOutput {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Summary of a locally available image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSummary {
    /// Repository name.
    pub repository: String,
    /// Tag.
    pub tag: String,
    /// Image identifier.
    pub id: String,
    /// Size as reported by the engine (human-readable on the CLI path).
    pub size: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_state_from_status() {
        assert_eq!(ContainerState::from_status("running"), ContainerState::Running);
        assert_eq!(ContainerState::from_status("exited"), ContainerState::Stopped);
        assert_eq!(ContainerState::from_status("created"), ContainerState::Stopped);
        assert_eq!(ContainerState::from_status("dead"), ContainerState::Stopped);
    }

    #[test]
    fn mount_bind_strings() {
        let sock = Mount::bind("/var/run/docker.sock", "/var/run/docker.sock");
        assert_eq!(
            sock.to_bind_string(),
            "/var/run/docker.sock:/var/run/docker.sock"
        );

        let data = Mount::volume("neuroinsight-data", "/data");
        assert_eq!(data.to_bind_string(), "neuroinsight-data:/data");
    }

    #[test]
    fn named_volumes_skips_binds() {
        let spec = ContainerSpec {
            image: "img".into(),
            name: "svc".into(),
            ports: vec![],
            mounts: vec![
                Mount::bind("/var/run/docker.sock", "/var/run/docker.sock"),
                Mount::volume("svc-data", "/data"),
            ],
            env: vec![],
            detached: true,
            remove_on_exit: false,
        };

        let volumes: Vec<_> = spec.named_volumes().collect();
        assert_eq!(volumes, vec!["svc-data"]);
    }

    #[test]
    fn engine_status_display() {
        let status = EngineStatus::Running {
            version: "Docker version 27.0.1".into(),
        };
        assert!(status.is_running());
        assert!(status.to_string().contains("running"));
        assert!(!EngineStatus::NotInstalled.is_running());
    }
}
