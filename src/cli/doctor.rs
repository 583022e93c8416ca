//! Engine and image diagnostics with platform-specific guidance.

use crate::engine::EngineStatus;
use crate::supervisor::Supervisor;

/// Host platform for install guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
}

impl Platform {
    /// Detect the current platform.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOS,
            "windows" => Platform::Windows,
            _ => Platform::Linux,
        }
    }

    /// Installation instructions for Docker on this platform.
    pub fn install_hint(&self) -> &'static str {
        match self {
            Platform::MacOS => {
                "Install Docker Desktop: https://docs.docker.com/desktop/install/mac-install/"
            }
            Platform::Linux => "Install Docker Engine: https://docs.docker.com/engine/install/",
            Platform::Windows => {
                "Install Docker Desktop: https://docs.docker.com/desktop/install/windows-install/"
            }
        }
    }

    /// Instructions to start the Docker daemon on this platform.
    pub fn start_hint(&self) -> &'static str {
        match self {
            Platform::MacOS => "Start Docker Desktop from Applications, or run: open -a Docker",
            Platform::Linux => "Start the Docker daemon: sudo systemctl start docker",
            Platform::Windows => "Start Docker Desktop from the Start menu",
        }
    }
}

/// Print engine and image diagnostics.
pub async fn run_doctor_command(supervisor: &Supervisor, processing_image: &str, service_image: &str) -> anyhow::Result<()> {
    let platform = Platform::current();

    match supervisor.engine_status().await {
        EngineStatus::Running { version } => {
            println!("engine:            running ({version}, via {})", supervisor.engine_kind());
        }
        EngineStatus::DaemonDown { version } => {
            println!("engine:            installed but not running ({version})");
            println!("                   {}", platform.start_hint());
            return Ok(());
        }
        EngineStatus::NotInstalled => {
            println!("engine:            not installed");
            println!("                   {}", platform.install_hint());
            return Ok(());
        }
    }

    match supervisor.container_state().await {
        Ok(state) => println!("container:         {state:?}"),
        Err(e) => println!("container:         query failed ({e})"),
    }

    for (label, image) in [("service image", service_image), ("processing image", processing_image)] {
        match supervisor.image_exists(image).await {
            Ok(true) => println!("{label:<18} present ({image})"),
            Ok(false) => {
                println!("{label:<18} not present ({image})");
                println!("                   run `neuroinsight pull` to download it");
            }
            Err(e) => println!("{label:<18} query failed ({e})"),
        }
    }

    let status = supervisor.status().await;
    if status.running {
        println!("service:           healthy at {}", status.base_url);
    } else {
        println!(
            "service:           not responding at {} ({})",
            status.base_url,
            status.error.as_deref().unwrap_or("unknown")
        );
    }

    Ok(())
}
