//! Test harness for exercising the supervisor without a container daemon.
//!
//! Provides [`StubEngine`], a configurable in-memory [`ContainerEngine`]
//! that records every call and simulates container state transitions.
//! Tests assert on the recorded counts to verify, for example, that an
//! already-provisioned container is not provisioned twice.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::engine::ContainerEngine;
use crate::engine::error::{EngineError, Result};
use crate::engine::types::{
    ContainerSpec, ContainerState, EngineKind, EngineStatus, ExecOutput, ImageSummary,
    PullProgress, PullSink,
};

/// Hook invoked when the stub "starts" a container (run or start), with
/// the spec most recently run. Lets a test bind a real listener on the
/// mapped host port, playing the part of the service inside the container.
pub type ActivateHook = Box<dyn Fn(&ContainerSpec) + Send + Sync>;

/// In-memory engine double.
pub struct StubEngine {
    state: Mutex<ContainerState>,
    last_spec: Mutex<Option<ContainerSpec>>,
    status: Mutex<EngineStatus>,
    image_present: AtomicBool,
    fail_pull: AtomicBool,
    fail_run: AtomicBool,
    on_activate: Mutex<Option<ActivateHook>>,

    pub pulls: AtomicU32,
    pub runs: AtomicU32,
    pub starts: AtomicU32,
    pub stops: AtomicU32,
    pub removes: AtomicU32,
    pub volume_creates: AtomicU32,
    pub state_queries: AtomicU32,
}

impl StubEngine {
    /// A stub whose engine is up, with no container and no image.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ContainerState::Absent),
            last_spec: Mutex::new(None),
            status: Mutex::new(EngineStatus::Running {
                version: "stub 0.0".to_string(),
            }),
            image_present: AtomicBool::new(false),
            fail_pull: AtomicBool::new(false),
            fail_run: AtomicBool::new(false),
            on_activate: Mutex::new(None),
            pulls: AtomicU32::new(0),
            runs: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
            removes: AtomicU32::new(0),
            volume_creates: AtomicU32::new(0),
            state_queries: AtomicU32::new(0),
        }
    }

    /// Start with the container in `state`.
    pub fn with_state(self, state: ContainerState) -> Self {
        *self.state.lock().unwrap() = state;
        self
    }

    /// Start with the service image already present locally.
    pub fn with_image_present(self) -> Self {
        self.image_present.store(true, Ordering::SeqCst);
        self
    }

    /// Report `status` from the engine probe.
    pub fn with_status(self, status: EngineStatus) -> Self {
        *self.status.lock().unwrap() = status;
        self
    }

    /// Make image pulls fail.
    pub fn with_failing_pull(self) -> Self {
        self.fail_pull.store(true, Ordering::SeqCst);
        self
    }

    /// Make run commands fail.
    pub fn with_failing_run(self) -> Self {
        self.fail_run.store(true, Ordering::SeqCst);
        self
    }

    /// Invoke `hook` whenever the container transitions to running.
    pub fn on_activate(self, hook: ActivateHook) -> Self {
        *self.on_activate.lock().unwrap() = Some(hook);
        self
    }

    /// Pretend `spec` was the run request that created the existing
    /// container, so a plain start can replay it to the activate hook.
    pub fn with_seeded_spec(self, spec: ContainerSpec) -> Self {
        *self.last_spec.lock().unwrap() = Some(spec);
        self
    }

    /// Current simulated container state.
    pub fn container_state_now(&self) -> ContainerState {
        *self.state.lock().unwrap()
    }

    fn activate(&self) {
        let spec = self.last_spec.lock().unwrap().clone();
        if let Some(spec) = spec
            && let Some(hook) = self.on_activate.lock().unwrap().as_ref()
        {
            hook(&spec);
        }
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContainerEngine for StubEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Api
    }

    async fn status(&self) -> EngineStatus {
        self.status.lock().unwrap().clone()
    }

    async fn container_state(&self, _name: &str) -> Result<ContainerState> {
        self.state_queries.fetch_add(1, Ordering::SeqCst);
        Ok(*self.state.lock().unwrap())
    }

    async fn start_container(&self, _name: &str) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = ContainerState::Running;
        self.activate();
        Ok(())
    }

    async fn stop_container(&self, _name: &str) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = ContainerState::Stopped;
        Ok(())
    }

    async fn remove_container(&self, _name: &str) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = ContainerState::Absent;
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail_run.load(Ordering::SeqCst) {
            return Err(EngineError::Api {
                reason: "simulated run failure".to_string(),
            });
        }
        *self.last_spec.lock().unwrap() = Some(spec.clone());
        *self.state.lock().unwrap() = ContainerState::Running;
        self.activate();
        Ok("stub-container-id".to_string())
    }

    async fn image_exists(&self, _image: &str) -> Result<bool> {
        Ok(self.image_present.load(Ordering::SeqCst))
    }

    async fn pull_image(&self, image: &str, progress: PullSink<'_>) -> Result<()> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(EngineError::Api {
                reason: "simulated pull failure".to_string(),
            });
        }
        progress(PullProgress {
            layer: Some("deadbeef".to_string()),
            status: format!("Pulling {image}"),
            detail: None,
        });
        self.image_present.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_volume(&self, _name: &str) -> Result<()> {
        self.volume_creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn logs(&self, _name: &str, _tail: u32) -> Result<String> {
        Ok("stub logs\n".to_string())
    }

    async fn exec(&self, _name: &str, command: &[String]) -> Result<ExecOutput> {
        Ok(ExecOutput {
            exit_code: 0,
            stdout: command.join(" "),
            stderr: String::new(),
        })
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        Ok(vec![])
    }

    async fn list_containers(&self, name: &str) -> Result<Vec<String>> {
        Ok(match *self.state.lock().unwrap() {
            ContainerState::Absent => vec![],
            _ => vec![name.to_string()],
        })
    }
}
