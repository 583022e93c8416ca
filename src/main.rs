//! NeuroInsight desktop companion - main entry point.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use neuroinsight::{
    cli::{Cli, Command, Platform, run_doctor_command, run_status_command},
    config::Config,
    engine::{self, PullProgress},
    supervisor::{Supervisor, SupervisorError},
};

/// How often the steady-state loop re-probes the service.
const BACKGROUND_CHECK_PERIOD: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("neuroinsight=info")),
        )
        .init();

    let config = Config::from_env()?;

    let engine = match engine::connect(config.engine.preference).await {
        Ok(engine) => engine,
        Err(e) => {
            // `doctor` must still answer when the engine is missing; that
            // is exactly the situation it diagnoses.
            if matches!(cli.command, Some(Command::Doctor)) {
                let platform = Platform::current();
                println!("engine:            unavailable ({e})");
                println!("                   {}", platform.install_hint());
                return Ok(());
            }
            anyhow::bail!("container engine unavailable: {e}");
        }
    };

    let supervisor = Arc::new(Supervisor::new(engine, config.service.clone()));

    match cli.command {
        None | Some(Command::Run) => run_supervise(supervisor, &config).await,
        Some(Command::Status { json }) => run_status_command(&supervisor, json).await,
        Some(Command::Stop) => {
            supervisor.stop().await?;
            println!("stopped {}", config.service.container_name);
            Ok(())
        }
        Some(Command::Logs { tail }) => {
            print!("{}", supervisor.logs(tail).await?);
            Ok(())
        }
        Some(Command::Doctor) => {
            run_doctor_command(&supervisor, &config.service.processing_image, &config.service.image)
                .await
        }
        Some(Command::Pull { freesurfer }) => run_pull(&supervisor, &config, freesurfer).await,
    }
}

/// Bring the service up, then supervise it until Ctrl-C.
async fn run_supervise(supervisor: Arc<Supervisor>, config: &Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.service.data_dir).await?;
    tracing::info!(dir = %config.service.data_dir.display(), "data directory");

    // Ctrl-C during startup aborts the health wait promptly instead of
    // waiting out the poll budget.
    {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                supervisor.abort_startup();
            }
        });
    }

    let endpoint = match supervisor.ensure_running().await {
        Ok(endpoint) => endpoint,
        Err(SupervisorError::Cancelled) => {
            tracing::info!("startup aborted");
            supervisor.shutdown().await;
            return Ok(());
        }
        Err(e) => {
            if let Some(hint) = user_hint(&e) {
                tracing::error!("{hint}");
            }
            return Err(e.into());
        }
    };

    tracing::info!(url = %endpoint.base_url(), "service ready; press Ctrl-C to stop");

    let mut was_healthy = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(BACKGROUND_CHECK_PERIOD) => {
                let status = supervisor.status().await;
                if status.running != was_healthy {
                    if status.running {
                        tracing::info!("service recovered");
                    } else {
                        tracing::warn!(
                            error = status.error.as_deref().unwrap_or("unknown"),
                            "service stopped responding"
                        );
                    }
                    was_healthy = status.running;
                }
            }
        }
    }

    tracing::info!("shutting down");
    supervisor.shutdown().await;
    Ok(())
}

/// Pre-pull images with printed progress.
async fn run_pull(
    supervisor: &Supervisor,
    config: &Config,
    freesurfer: bool,
) -> anyhow::Result<()> {
    let progress = |p: PullProgress| match p.detail {
        Some(detail) => println!("{} {}", p.status, detail),
        None => println!("{}", p.status),
    };

    println!("pulling {}", config.service.image);
    supervisor.pull_image(&config.service.image, &progress).await?;

    if freesurfer {
        println!("pulling {}", config.service.processing_image);
        supervisor
            .pull_image(&config.service.processing_image, &progress)
            .await?;
    }

    Ok(())
}

/// Actionable guidance for startup failures.
fn user_hint(error: &SupervisorError) -> Option<&'static str> {
    let platform = Platform::current();
    match error {
        SupervisorError::EngineNotInstalled => Some(platform.install_hint()),
        SupervisorError::EngineDaemonDown => Some(platform.start_hint()),
        SupervisorError::NoAvailablePort { .. } => {
            Some("close other local services or check firewall rules for port conflicts")
        }
        SupervisorError::HealthTimeout { .. } => {
            Some("the service container started but never became healthy; check `neuroinsight logs`")
        }
        _ => None,
    }
}
