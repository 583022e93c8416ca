//! Command-line fallback engine.
//!
//! Drives the `docker` binary through `tokio::process` and parses its
//! output. Used when the engine socket is unreachable but the CLI still
//! works (e.g. remote contexts, unusual socket setups). Parsing free-form
//! process output is a brittle boundary, so every command keeps its output
//! handling as narrow as possible: one sub-command, one exit status, one
//! typed result.

use std::process::Stdio;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::engine::error::{EngineError, Result};
use crate::engine::types::{
    ContainerSpec, ContainerState, EngineKind, EngineStatus, ExecOutput, ImageSummary,
    PullProgress, PullSink,
};
use crate::engine::{ContainerEngine, binary_version};

/// Docker engine reached through its command-line binary.
pub struct CliEngine {
    program: String,
}

impl CliEngine {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }
}

impl Default for CliEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Captured output of a finished engine command.
struct CommandOutput {
    stdout: String,
    stderr: String,
}

impl CliEngine {
    /// Run one engine sub-command to completion, mapping a non-zero exit
    /// into [`EngineError::CommandFailed`] with the captured error stream.
    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(EngineError::CommandFailed {
                command: format!("{} {}", self.program, args.join(" ")),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            })
        }
    }

    /// Like [`run`], but only the exit status matters.
    async fn probe(&self, args: &[&str]) -> bool {
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|s| s.success())
    }
}

/// Build the argument list for a `run` command from a spec.
fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["run".to_string()];

    if spec.detached {
        args.push("-d".to_string());
    }
    if spec.remove_on_exit {
        args.push("--rm".to_string());
    }
    args.push("--name".to_string());
    args.push(spec.name.clone());

    for mount in &spec.mounts {
        args.push("-v".to_string());
        args.push(mount.to_bind_string());
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    for mapping in &spec.ports {
        args.push("-p".to_string());
        args.push(mapping.to_string());
    }

    args.push(spec.image.clone());
    args
}

/// One line of `docker images --format "{{json .}}"`.
#[derive(Deserialize)]
struct ImageLine {
    #[serde(rename = "Repository")]
    repository: String,
    #[serde(rename = "Tag")]
    tag: String,
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Size")]
    size: String,
}

#[async_trait::async_trait]
impl ContainerEngine for CliEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Cli
    }

    async fn status(&self) -> EngineStatus {
        let Some(version) = binary_version().await else {
            return EngineStatus::NotInstalled;
        };
        // `ps` requires a responding daemon.
        if self.probe(&["ps"]).await {
            EngineStatus::Running { version }
        } else {
            EngineStatus::DaemonDown { version }
        }
    }

    async fn container_state(&self, name: &str) -> Result<ContainerState> {
        match self
            .run(&["container", "inspect", "--format", "{{.State.Status}}", name])
            .await
        {
            Ok(out) => Ok(ContainerState::from_status(&out.stdout)),
            Err(EngineError::CommandFailed { stderr, .. })
                if stderr.to_ascii_lowercase().contains("no such") =>
            {
                Ok(ContainerState::Absent)
            }
            Err(e) => Err(e),
        }
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.run(&["start", name]).await?;
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        self.run(&["stop", name]).await?;
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.run(&["rm", name]).await?;
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        let args = run_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.run(&arg_refs).await?;

        if !out.stderr.trim().is_empty() {
            tracing::warn!(container = %spec.name, stderr = %out.stderr.trim(), "run reported warnings");
        }

        let id = out.stdout.trim().to_string();
        tracing::info!(container = %spec.name, %id, "started container");
        Ok(id)
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.probe(&["image", "inspect", image]).await)
    }

    async fn pull_image(&self, image: &str, progress: PullSink<'_>) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(["pull", image])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // The CLI interleaves layer progress on stdout; surface each line
        // as it arrives so the caller can render multi-minute downloads.
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    progress(PullProgress {
                        layer: None,
                        status: line,
                        detail: None,
                    });
                }
            }
        }

        let mut stderr_text = String::new();
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stderr_text.push_str(&line);
                stderr_text.push('\n');
            }
        }

        let status = child.wait().await?;
        if status.success() {
            tracing::info!(image, "pulled image");
            Ok(())
        } else {
            Err(EngineError::CommandFailed {
                command: format!("{} pull {}", self.program, image),
                code: status.code().unwrap_or(-1),
                stderr: stderr_text.trim().to_string(),
            })
        }
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        match self.run(&["volume", "create", name]).await {
            Ok(_) => Ok(()),
            // Pre-existence is the idempotent case; anything else is fatal.
            Err(EngineError::CommandFailed { stderr, .. })
                if stderr.to_ascii_lowercase().contains("already exists") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn logs(&self, name: &str, tail: u32) -> Result<String> {
        let tail = tail.to_string();
        let out = self.run(&["logs", "--tail", &tail, name]).await?;
        // The CLI splits the container's streams across both of ours.
        let mut combined = out.stdout;
        combined.push_str(&out.stderr);
        Ok(combined)
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput> {
        let mut args = vec!["exec".to_string(), name.to_string()];
        args.extend_from_slice(command);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await?;

        // A non-zero exit here is the inner command's result, not an
        // engine failure; surface it through the typed output.
        Ok(ExecOutput {
            exit_code: i64::from(output.status.code().unwrap_or(-1)),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let out = self
            .run(&["images", "--format", "{{json .}}"])
            .await?;

        out.stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<ImageLine>(line)
                    .map(|img| ImageSummary {
                        repository: img.repository,
                        tag: img.tag,
                        id: img.id,
                        size: img.size,
                    })
                    .map_err(|e| EngineError::Parse {
                        reason: format!("image list line: {e}"),
                    })
            })
            .collect()
    }

    async fn list_containers(&self, name: &str) -> Result<Vec<String>> {
        let filter = format!("name=^/{name}$");
        let out = self
            .run(&["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"])
            .await?;

        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}
