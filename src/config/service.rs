//! Service container configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::helpers::{bool_env, optional_env, parse_optional_env};
use crate::engine::{ContainerSpec, Mount, PortMapping};
use crate::error::ConfigError;
use crate::supervisor::PollBudget;

/// Port the service listens on inside its container.
const SERVICE_CONTAINER_PORT: u16 = 8000;

/// Engine socket bind-mounted into the container so the service can manage
/// its sibling processing containers.
const ENGINE_SOCKET: &str = "/var/run/docker.sock";

/// Configuration for the supervised analysis service.
///
/// Everything here has a fixed default; environment variables exist for
/// the handful of knobs a support engineer might need to turn, not for
/// end users.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service image reference.
    pub image: String,
    /// Managed container name. At most one container of this name exists
    /// per host; a second application instance finds it and adopts it
    /// rather than provisioning a conflicting twin.
    pub container_name: String,
    /// Preferred host port for the service.
    pub service_port: u16,
    /// Upper bound of the fallback port scan.
    pub port_range_end: u16,
    /// Auxiliary ports mapped host:container one-to-one (object store).
    pub aux_ports: Vec<u16>,
    /// Named persistent volume for uploads and outputs.
    pub data_volume: String,
    /// Image that performs the MRI processing, run by the service as
    /// sibling containers through the mounted engine socket.
    pub processing_image: String,
    /// Per-user staging directory on the host.
    pub data_dir: PathBuf,
    /// Health poll attempt ceiling.
    pub health_max_attempts: u32,
    /// Fixed wait between health poll attempts.
    pub health_interval_ms: u64,
    /// Timeout for a single liveness request.
    pub request_timeout_secs: u64,
    /// Leave the container running when the application exits.
    pub keep_on_exit: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            image: "phindagijimana321/neuroinsight:latest".to_string(),
            container_name: "neuroinsight".to_string(),
            service_port: 8000,
            port_range_end: 8050,
            aux_ports: vec![9000, 9001],
            data_volume: "neuroinsight-data".to_string(),
            processing_image: "freesurfer/freesurfer:7.4.1".to_string(),
            data_dir: default_data_dir(),
            health_max_attempts: 30,
            health_interval_ms: 1000,
            request_timeout_secs: 2,
            keep_on_exit: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("neuroinsight")
}

impl ServiceConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            image: optional_env("NEUROINSIGHT_IMAGE")?.unwrap_or(defaults.image),
            container_name: optional_env("NEUROINSIGHT_CONTAINER")?
                .unwrap_or(defaults.container_name),
            service_port: parse_optional_env("NEUROINSIGHT_PORT", defaults.service_port)?,
            port_range_end: parse_optional_env(
                "NEUROINSIGHT_PORT_RANGE_END",
                defaults.port_range_end,
            )?,
            aux_ports: defaults.aux_ports,
            data_volume: optional_env("NEUROINSIGHT_DATA_VOLUME")?
                .unwrap_or(defaults.data_volume),
            processing_image: optional_env("NEUROINSIGHT_PROCESSING_IMAGE")?
                .unwrap_or(defaults.processing_image),
            data_dir: optional_env("NEUROINSIGHT_DATA_DIR")?
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            health_max_attempts: parse_optional_env(
                "NEUROINSIGHT_HEALTH_ATTEMPTS",
                defaults.health_max_attempts,
            )?,
            health_interval_ms: parse_optional_env(
                "NEUROINSIGHT_HEALTH_INTERVAL_MS",
                defaults.health_interval_ms,
            )?,
            request_timeout_secs: parse_optional_env(
                "NEUROINSIGHT_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            keep_on_exit: bool_env("NEUROINSIGHT_KEEP_ON_EXIT", defaults.keep_on_exit)?,
        })
    }

    /// Host-side path of the data volume's contents.
    fn volume_data_path(&self) -> String {
        format!("/var/lib/docker/volumes/{}/_data", self.data_volume)
    }

    /// The fixed run request, with the dynamically resolved service port
    /// plugged in.
    pub fn to_container_spec(&self, service_port: u16) -> ContainerSpec {
        let mut ports = vec![PortMapping::new(service_port, SERVICE_CONTAINER_PORT)];
        ports.extend(self.aux_ports.iter().map(|&p| PortMapping::new(p, p)));

        let data_path = self.volume_data_path();

        ContainerSpec {
            image: self.image.clone(),
            name: self.container_name.clone(),
            ports,
            mounts: vec![
                Mount::bind(ENGINE_SOCKET, ENGINE_SOCKET),
                Mount::volume(self.data_volume.clone(), "/data"),
            ],
            env: vec![
                (
                    "HOST_UPLOAD_DIR".to_string(),
                    format!("{data_path}/uploads"),
                ),
                (
                    "HOST_OUTPUT_DIR".to_string(),
                    format!("{data_path}/outputs"),
                ),
            ],
            detached: true,
            remove_on_exit: false,
        }
    }

    /// Poll budget for the startup health wait.
    pub fn poll_budget(&self) -> PollBudget {
        PollBudget {
            max_attempts: self.health_max_attempts,
            interval: Duration::from_millis(self.health_interval_ms),
            request_timeout: self.request_timeout(),
        }
    }

    /// Timeout for a single liveness request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
