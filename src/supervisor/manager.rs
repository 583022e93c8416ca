//! Service container supervision.
//!
//! The `Supervisor` owns the full startup sequence: resolve a usable port,
//! ensure the named container exists and is running on it, then wait for
//! the service's liveness endpoint to answer. It is an explicitly
//! constructed, explicitly owned object — callers wire in the engine and
//! configuration, and tests build as many independent instances as they
//! need.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};

use crate::config::ServiceConfig;
use crate::engine::{
    ContainerEngine, ContainerState, EngineKind, EngineStatus, ExecOutput, ImageSummary,
    PullProgress, PullSink,
};
use crate::supervisor::endpoint::ServiceEndpoint;
use crate::supervisor::error::{Result, SupervisorError};
use crate::supervisor::health::{HealthPoller, PollOutcome};
use crate::supervisor::phase::{StartRecord, SupervisorPhase};
use crate::supervisor::port::PortAllocator;
use crate::supervisor::status::{HealthStatus, ServiceStatus, fetch_health};

/// Supervises the single long-running service container.
pub struct Supervisor {
    engine: Arc<dyn ContainerEngine>,
    config: ServiceConfig,
    client: reqwest::Client,
    poller: HealthPoller,
    allocator: PortAllocator,
    endpoint: RwLock<Option<ServiceEndpoint>>,
    phase: RwLock<SupervisorPhase>,
    start_record: RwLock<Option<StartRecord>>,
    /// Serializes `ensure_running` for the managed container name, so two
    /// overlapping callers cannot race through the "volume does not exist,
    /// create it" paths. One supervisor manages exactly one name.
    provision_lock: Mutex<()>,
    /// Abort signal for in-flight health polls.
    cancel: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: ServiceConfig) -> Self {
        let client = reqwest::Client::new();
        let (cancel, _) = watch::channel(false);
        Self {
            engine,
            poller: HealthPoller::with_client(client.clone()),
            client,
            config,
            allocator: PortAllocator::new(),
            endpoint: RwLock::new(None),
            phase: RwLock::new(SupervisorPhase::Idle),
            start_record: RwLock::new(None),
            provision_lock: Mutex::new(()),
            cancel,
        }
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> SupervisorPhase {
        *self.phase.read().await
    }

    /// The endpoint resolved for this session, if startup got that far.
    pub async fn endpoint(&self) -> Option<ServiceEndpoint> {
        self.endpoint.read().await.clone()
    }

    /// Which engine backend is in use.
    pub fn engine_kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// Advance the phase if the transition is legal; otherwise keep the
    /// current phase (re-entrant calls after `Ready` stay at `Ready`).
    async fn advance(&self, next: SupervisorPhase) {
        let mut phase = self.phase.write().await;
        if phase.can_advance_to(next) {
            tracing::debug!(from = %*phase, to = %next, "phase");
            *phase = next;
        } else {
            tracing::debug!(at = %*phase, skipped = %next, "phase transition not taken");
        }
    }

    async fn fail(&self, reason: &str) {
        tracing::error!(reason, "startup failed");
        self.advance(SupervisorPhase::Failed).await;
    }

    /// Restart the sequence from `Idle` after a failure or stop.
    pub async fn reset(&self) {
        let mut phase = self.phase.write().await;
        if phase.can_reset() {
            *phase = SupervisorPhase::Idle;
        }
    }

    /// Bring the service up and wait until it answers its liveness
    /// endpoint. Pull progress is reported through the log.
    pub async fn ensure_running(&self) -> Result<ServiceEndpoint> {
        self.ensure_running_with_progress(&|p: PullProgress| {
            if let Some(detail) = p.detail {
                tracing::info!(layer = p.layer.as_deref().unwrap_or(""), "{} {}", p.status, detail);
            } else {
                tracing::info!("{}", p.status);
            }
        })
        .await
    }

    /// Bring the service up, streaming image-pull progress to `progress`.
    ///
    /// Idempotent with respect to an already-existing container: the
    /// engine is asked for the container's state first, and only an
    /// `Absent` container triggers pull/volume/run provisioning. Calls are
    /// serialized per container name; concurrent callers fold into one
    /// provisioning attempt.
    pub async fn ensure_running_with_progress(
        &self,
        progress: PullSink<'_>,
    ) -> Result<ServiceEndpoint> {
        if self.phase.read().await.is_failed() {
            return Err(SupervisorError::PreviousAttemptFailed);
        }

        let _guard = self.provision_lock.lock().await;

        // Engine availability gates everything else.
        match self.engine.status().await {
            EngineStatus::Running { version } => {
                tracing::debug!(%version, engine = %self.engine.kind(), "engine is up");
            }
            EngineStatus::DaemonDown { .. } => {
                self.fail("engine daemon down").await;
                return Err(SupervisorError::EngineDaemonDown);
            }
            EngineStatus::NotInstalled => {
                self.fail("engine not installed").await;
                return Err(SupervisorError::EngineNotInstalled);
            }
        }

        self.advance(SupervisorPhase::PortResolving).await;
        let endpoint = self.resolve_endpoint().await?;

        self.advance(SupervisorPhase::Provisioning).await;
        let spec = self.config.to_container_spec(endpoint.port);

        // Any provisioning failure aborts the remaining steps; the phase
        // lands in `Failed`, never somewhere ambiguous.
        if let Err(e) = self.ensure_container(&spec, progress).await {
            self.fail(&e.to_string()).await;
            return Err(e);
        }

        self.advance(SupervisorPhase::HealthChecking).await;
        // Clear any stale abort before a fresh wait.
        self.cancel.send_replace(false);
        let mut cancel_rx = self.cancel.subscribe();

        let url = endpoint.health_url();
        let budget = self.config.poll_budget();
        match self
            .poller
            .poll_with_cancel(&url, &budget, &mut cancel_rx)
            .await
        {
            PollOutcome::Ready => {
                self.advance(SupervisorPhase::Ready).await;
                tracing::info!(endpoint = %endpoint, "service is ready");
                Ok(endpoint)
            }
            PollOutcome::TimedOut => {
                self.fail("health check timed out").await;
                Err(SupervisorError::HealthTimeout {
                    url,
                    attempts: budget.max_attempts,
                })
            }
            PollOutcome::Cancelled => {
                self.fail("startup cancelled").await;
                Err(SupervisorError::Cancelled)
            }
        }
    }

    /// Resolve the service port once per session; later calls reuse it.
    async fn resolve_endpoint(&self) -> Result<ServiceEndpoint> {
        if let Some(endpoint) = self.endpoint.read().await.clone() {
            return Ok(endpoint);
        }

        let preferred = self.config.service_port;
        let port = if self.allocator.is_available(preferred).await {
            preferred
        } else {
            tracing::warn!(port = preferred, "preferred port in use, scanning for another");
            match self
                .allocator
                .find_available(preferred, self.config.port_range_end)
                .await
            {
                Ok(port) => port,
                Err(e) => {
                    self.fail("no available port").await;
                    return Err(e);
                }
            }
        };

        let endpoint = ServiceEndpoint::localhost(port);
        tracing::info!(port, "service port resolved");
        *self.endpoint.write().await = Some(endpoint.clone());
        Ok(endpoint)
    }

    /// Decide what the existing container state requires: nothing, a
    /// start command, or full provisioning.
    async fn ensure_container(
        &self,
        spec: &crate::engine::ContainerSpec,
        progress: PullSink<'_>,
    ) -> Result<()> {
        let activated = match self.engine.container_state(&spec.name).await? {
            ContainerState::Running => {
                tracing::info!(container = %spec.name, "container already running");
                false
            }
            ContainerState::Stopped => {
                tracing::info!(container = %spec.name, "container exists, starting it");
                self.engine.start_container(&spec.name).await?;
                true
            }
            ContainerState::Absent => {
                self.provision(spec, progress).await?;
                true
            }
        };

        // Uptime counts from the moment this process (re)started the
        // container; a verified no-op keeps the existing record.
        let mut record = self.start_record.write().await;
        if activated || record.is_none() {
            *record = Some(StartRecord::now());
        }
        Ok(())
    }

    /// Full provisioning for an absent container: image, volumes, run.
    async fn provision(
        &self,
        spec: &crate::engine::ContainerSpec,
        progress: PullSink<'_>,
    ) -> Result<()> {
        if !self.engine.image_exists(&spec.image).await? {
            tracing::info!(image = %spec.image, "image not present locally, pulling");
            self.engine
                .pull_image(&spec.image, progress)
                .await
                .map_err(|e| SupervisorError::ImagePullFailed {
                    image: spec.image.clone(),
                    reason: e.to_string(),
                })?;
        }

        for volume in spec.named_volumes() {
            self.engine.create_volume(volume).await?;
        }

        self.engine.run_container(spec).await.map_err(|e| {
            SupervisorError::ContainerRunFailed {
                name: spec.name.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(())
    }

    /// Abort an in-flight startup health wait, if any.
    pub fn abort_startup(&self) {
        self.cancel.send_replace(true);
    }

    /// Stop the managed container.
    pub async fn stop(&self) -> Result<()> {
        self.abort_startup();
        self.advance(SupervisorPhase::Stopping).await;

        let result = self.engine.stop_container(&self.config.container_name).await;
        *self.start_record.write().await = None;
        self.advance(SupervisorPhase::Stopped).await;

        result.map_err(Into::into)
    }

    /// Shutdown path for process exit: a failed stop is logged, never
    /// retried, and never blocks exit.
    pub async fn shutdown(&self) {
        if self.config.keep_on_exit {
            tracing::info!(
                container = %self.config.container_name,
                "leaving container running on exit"
            );
            return;
        }

        if let Err(e) = self.stop().await {
            tracing::warn!(error = %e, "failed to stop container on shutdown");
        }
    }

    /// Freshly probed service status.
    ///
    /// Always performs a liveness request rather than trusting the phase;
    /// `running` is true iff that probe succeeds right now, and uptime is
    /// reported only while running.
    pub async fn status(&self) -> ServiceStatus {
        let endpoint = self
            .endpoint
            .read()
            .await
            .clone()
            .unwrap_or_else(|| ServiceEndpoint::localhost(self.config.service_port));

        let probe = fetch_health(
            &self.client,
            &endpoint.health_url(),
            self.config.request_timeout(),
        )
        .await;

        match probe {
            Ok(payload) => {
                let uptime_seconds = self
                    .start_record
                    .read()
                    .await
                    .map(|r| r.uptime_seconds())
                    .unwrap_or(0);
                ServiceStatus {
                    running: true,
                    port: endpoint.port,
                    base_url: endpoint.base_url(),
                    uptime_seconds,
                    health: Some(payload),
                    error: None,
                }
            }
            Err(error) => ServiceStatus {
                running: false,
                port: endpoint.port,
                base_url: endpoint.base_url(),
                uptime_seconds: 0,
                health: None,
                error: Some(error),
            },
        }
    }

    /// Instantaneous health classification.
    pub async fn health(&self) -> HealthStatus {
        let Some(endpoint) = self.endpoint.read().await.clone() else {
            return HealthStatus::Unknown;
        };
        if self
            .poller
            .probe(&endpoint.health_url(), self.config.request_timeout())
            .await
        {
            HealthStatus::Ready
        } else {
            HealthStatus::Unreachable
        }
    }

    // Pass-through engine operations, one engine call each.

    /// Two-step engine availability probe.
    pub async fn engine_status(&self) -> EngineStatus {
        self.engine.status().await
    }

    /// Engine-reported state of the managed container.
    pub async fn container_state(&self) -> Result<ContainerState> {
        Ok(self
            .engine
            .container_state(&self.config.container_name)
            .await?)
    }

    /// Remove the managed container.
    pub async fn remove(&self) -> Result<()> {
        Ok(self
            .engine
            .remove_container(&self.config.container_name)
            .await?)
    }

    /// Tail of the managed container's logs.
    pub async fn logs(&self, tail: u32) -> Result<String> {
        Ok(self.engine.logs(&self.config.container_name, tail).await?)
    }

    /// Run a command inside the managed container.
    pub async fn exec(&self, command: &[String]) -> Result<ExecOutput> {
        Ok(self
            .engine
            .exec(&self.config.container_name, command)
            .await?)
    }

    /// Locally available images.
    pub async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        Ok(self.engine.list_images().await?)
    }

    /// Whether `image` exists locally.
    pub async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.engine.image_exists(image).await?)
    }

    /// Pull an image, streaming progress to `progress`.
    pub async fn pull_image(&self, image: &str, progress: PullSink<'_>) -> Result<()> {
        self.engine
            .pull_image(image, progress)
            .await
            .map_err(|e| SupervisorError::ImagePullFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })
    }
}
