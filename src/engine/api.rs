//! Structured engine client over the Docker socket.
//!
//! Primary [`ContainerEngine`] implementation: typed requests and responses
//! via `bollard` instead of parsing free-form CLI output. The CLI path in
//! [`super::cli`] remains available as a fallback behind the same trait.

use std::collections::HashMap;

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{ContainerStateStatusEnum, HostConfig, PortBinding};
use bollard::volume::CreateVolumeOptions;
use futures::StreamExt;

use crate::engine::error::{EngineError, Result};
use crate::engine::types::{
    ContainerSpec, ContainerState, EngineKind, EngineStatus, ExecOutput, ImageSummary,
    PullProgress, PullSink,
};
use crate::engine::{ContainerEngine, binary_version};

/// Connect to the Docker daemon, trying the default socket first and then
/// the per-user socket locations used by Docker Desktop and rootless
/// installs.
pub async fn connect_docker() -> Result<Docker> {
    if let Ok(docker) = Docker::connect_with_local_defaults()
        && docker.ping().await.is_ok()
    {
        return Ok(docker);
    }

    #[cfg(unix)]
    for socket in user_socket_candidates() {
        if let Ok(docker) =
            Docker::connect_with_socket(&socket, 5, bollard::API_DEFAULT_VERSION)
            && docker.ping().await.is_ok()
        {
            return Ok(docker);
        }
    }

    Err(EngineError::DaemonDown)
}

#[cfg(unix)]
fn user_socket_candidates() -> Vec<String> {
    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        candidates.push(format!("{}/.docker/run/docker.sock", home.display()));
    }
    if let Ok(uid) = std::env::var("UID") {
        candidates.push(format!("/run/user/{uid}/docker.sock"));
    }
    candidates
}

/// Docker engine reached through the socket API.
pub struct ApiEngine {
    docker: Docker,
}

impl ApiEngine {
    /// Connect to the local daemon.
    pub async fn connect() -> Result<Self> {
        let docker = connect_docker().await?;
        Ok(Self { docker })
    }

    /// Wrap an existing connection (used by `engine::connect`).
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

fn is_not_found(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn is_not_modified(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

#[async_trait::async_trait]
impl ContainerEngine for ApiEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Api
    }

    async fn status(&self) -> EngineStatus {
        let Some(version) = binary_version().await else {
            return EngineStatus::NotInstalled;
        };
        if self.docker.ping().await.is_ok() {
            EngineStatus::Running { version }
        } else {
            EngineStatus::DaemonDown { version }
        }
    }

    async fn container_state(&self, name: &str) -> Result<ContainerState> {
        match self.docker.inspect_container(name, None).await {
            Ok(info) => {
                let status = info.state.and_then(|s| s.status);
                Ok(match status {
                    Some(ContainerStateStatusEnum::RUNNING)
                    | Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Running,
                    _ => ContainerState::Stopped,
                })
            }
            Err(e) if is_not_found(&e) => Ok(ContainerState::Absent),
            Err(e) => Err(e.into()),
        }
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        match self
            .docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // 304: already running. Starting a running container is a no-op.
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        match self
            .docker
            .stop_container(name, Some(StopContainerOptions { t: 10 }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.docker
            .remove_container(name, None::<RemoveContainerOptions>)
            .await?;
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut port_bindings = HashMap::new();
        for mapping in &spec.ports {
            port_bindings.insert(
                format!("{}/tcp", mapping.container),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(mapping.host.to_string()),
                }]),
            );
        }

        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .iter()
            .map(|m| (format!("{}/tcp", m.container), HashMap::new()))
            .collect();

        let binds: Vec<String> = spec.mounts.iter().map(|m| m.to_bind_string()).collect();

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: if binds.is_empty() { None } else { Some(binds) },
            auto_remove: Some(spec.remove_on_exit),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: if env.is_empty() { None } else { Some(env) },
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self.docker.create_container(Some(options), config).await?;
        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await?;

        tracing::info!(container = %spec.name, id = %response.id, "started container");
        Ok(response.id)
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.docker.inspect_image(image).await.is_ok())
    }

    async fn pull_image(&self, image: &str, progress: PullSink<'_>) -> Result<()> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                progress(PullProgress {
                    layer: info.id,
                    status,
                    detail: info.progress,
                });
            }
        }

        tracing::info!(image, "pulled image");
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        // The engine API treats volume creation as idempotent by name.
        self.docker
            .create_volume(CreateVolumeOptions {
                name: name.to_string(),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn logs(&self, name: &str, tail: u32) -> Result<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk? {
                LogOutput::StdOut { message } | LogOutput::StdErr { message } => {
                    out.push_str(&String::from_utf8_lossy(&message));
                }
                _ => {}
            }
        }
        Ok(out)
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput> {
        let exec = self
            .docker
            .create_exec(
                name,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = output.next().await {
                match chunk? {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(0),
            stdout,
            stderr,
        })
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        Ok(images
            .into_iter()
            .map(|img| {
                let (repository, tag) = img
                    .repo_tags
                    .first()
                    .and_then(|rt| rt.rsplit_once(':'))
                    .map(|(r, t)| (r.to_string(), t.to_string()))
                    .unwrap_or_else(|| ("<none>".to_string(), "<none>".to_string()));
                ImageSummary {
                    repository,
                    tag,
                    id: img.id,
                    size: format!("{}", img.size),
                }
            })
            .collect())
    }

    async fn list_containers(&self, name: &str) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![format!("^/{name}$")]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                c.names
                    .and_then(|names| names.first().map(|n| n.trim_start_matches('/').to_string()))
            })
            .collect())
    }
}
