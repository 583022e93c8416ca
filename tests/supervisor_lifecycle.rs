//! End-to-end supervisor tests against an in-memory engine.
//!
//! The `StubEngine` simulates the container engine; an in-process HTTP
//! server plays the part of the analysis service, bound on the container
//! spec's mapped host port when the stub "starts" the container.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{Router, http::StatusCode, routing::get};
use neuroinsight::config::ServiceConfig;
use neuroinsight::engine::{ContainerState, EngineStatus};
use neuroinsight::supervisor::{Supervisor, SupervisorError, SupervisorPhase};
use neuroinsight::testing::StubEngine;
use tokio::net::TcpListener;

/// Learn a free port by binding and releasing it.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn test_config(service_port: u16) -> ServiceConfig {
    ServiceConfig {
        service_port,
        port_range_end: service_port.saturating_add(20),
        health_max_attempts: 40,
        health_interval_ms: 25,
        request_timeout_secs: 1,
        ..Default::default()
    }
}

/// Serve `/api/health` on `port`, answering 200 while `healthy` is true
/// and 503 otherwise.
fn spawn_health_server(port: u16, healthy: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let app = Router::new().route(
            "/api/health",
            get(move || {
                let healthy = healthy.clone();
                async move {
                    if healthy.load(Ordering::SeqCst) {
                        (StatusCode::OK, "{\"status\":\"healthy\"}")
                    } else {
                        (StatusCode::SERVICE_UNAVAILABLE, "down")
                    }
                }
            }),
        );
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });
}

/// A stub engine that binds the health server whenever the container
/// transitions to running.
fn engine_with_service(healthy: Arc<AtomicBool>) -> StubEngine {
    StubEngine::new().on_activate(Box::new(move |spec| {
        spawn_health_server(spec.ports[0].host, healthy.clone());
    }))
}

#[tokio::test]
async fn provisions_absent_container_and_waits_for_health() {
    let healthy = Arc::new(AtomicBool::new(true));
    let engine = Arc::new(engine_with_service(healthy));
    let port = free_port();
    let supervisor = Supervisor::new(engine.clone(), test_config(port));

    let endpoint = supervisor.ensure_running().await.unwrap();

    assert_eq!(endpoint.port, port);
    assert_eq!(supervisor.phase().await, SupervisorPhase::Ready);
    assert_eq!(engine.pulls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.volume_creates.load(Ordering::SeqCst), 1);
    assert_eq!(engine.runs.load(Ordering::SeqCst), 1);
    assert_eq!(engine.starts.load(Ordering::SeqCst), 0);
    assert_eq!(engine.container_state_now(), ContainerState::Running);
}

#[tokio::test]
async fn second_call_does_not_provision_again() {
    let healthy = Arc::new(AtomicBool::new(true));
    let engine = Arc::new(engine_with_service(healthy));
    let supervisor = Supervisor::new(engine.clone(), test_config(free_port()));

    let first = supervisor.ensure_running().await.unwrap();
    let second = supervisor.ensure_running().await.unwrap();

    // Exactly one provisioning attempt across both calls, and the port is
    // not re-resolved mid-session.
    assert_eq!(first, second);
    assert_eq!(engine.pulls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stopped_container_is_started_not_reprovisioned() {
    let healthy = Arc::new(AtomicBool::new(true));
    let port = free_port();
    let config = test_config(port);
    // The stub replays the seeded run request to the activate hook when
    // the stopped container is started, binding the health server.
    let engine = Arc::new(
        engine_with_service(healthy)
            .with_state(ContainerState::Stopped)
            .with_image_present()
            .with_seeded_spec(config.to_container_spec(port)),
    );
    let supervisor = Supervisor::new(engine.clone(), config);

    supervisor.ensure_running().await.unwrap();

    assert_eq!(engine.starts.load(Ordering::SeqCst), 1);
    assert_eq!(engine.pulls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn running_container_gets_no_engine_commands() {
    let engine = Arc::new(
        StubEngine::new()
            .with_state(ContainerState::Running)
            .with_image_present(),
    );
    let mut config = test_config(free_port());
    // Nothing serves the endpoint; keep the health wait short. The point
    // is the provisioning decision, not readiness.
    config.health_max_attempts = 2;
    let supervisor = Supervisor::new(engine.clone(), config);

    let err = supervisor.ensure_running().await.unwrap_err();

    assert!(matches!(err, SupervisorError::HealthTimeout { .. }));
    assert_eq!(engine.starts.load(Ordering::SeqCst), 0);
    assert_eq!(engine.pulls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn daemon_down_fails_before_any_provisioning() {
    let engine = Arc::new(StubEngine::new().with_status(EngineStatus::DaemonDown {
        version: "stub 0.0".to_string(),
    }));
    let supervisor = Supervisor::new(engine.clone(), test_config(free_port()));

    let err = supervisor.ensure_running().await.unwrap_err();

    assert!(matches!(err, SupervisorError::EngineDaemonDown));
    assert_eq!(supervisor.phase().await, SupervisorPhase::Failed);
    assert_eq!(engine.state_queries.load(Ordering::SeqCst), 0);

    // Failed is terminal until an explicit reset.
    let err = supervisor.ensure_running().await.unwrap_err();
    assert!(matches!(err, SupervisorError::PreviousAttemptFailed));

    supervisor.reset().await;
    assert_eq!(supervisor.phase().await, SupervisorPhase::Idle);
}

#[tokio::test]
async fn pull_failure_aborts_before_run() {
    let engine = Arc::new(StubEngine::new().with_failing_pull());
    let supervisor = Supervisor::new(engine.clone(), test_config(free_port()));

    let err = supervisor.ensure_running().await.unwrap_err();

    assert!(matches!(err, SupervisorError::ImagePullFailed { .. }));
    assert_eq!(supervisor.phase().await, SupervisorPhase::Failed);
    assert_eq!(engine.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn run_failure_is_reported_as_container_run_failed() {
    let engine = Arc::new(StubEngine::new().with_image_present().with_failing_run());
    let supervisor = Supervisor::new(engine.clone(), test_config(free_port()));

    let err = supervisor.ensure_running().await.unwrap_err();

    assert!(matches!(err, SupervisorError::ContainerRunFailed { .. }));
    assert_eq!(supervisor.phase().await, SupervisorPhase::Failed);
}

#[tokio::test]
async fn status_follows_the_endpoint_without_reset() {
    let healthy = Arc::new(AtomicBool::new(true));
    let engine = Arc::new(engine_with_service(healthy.clone()));
    let supervisor = Supervisor::new(engine, test_config(free_port()));

    supervisor.ensure_running().await.unwrap();

    let status = supervisor.status().await;
    assert!(status.running);
    assert!(status.health.is_some());
    assert!(status.error.is_none());

    // The service dies behind the supervisor's back; the next query
    // notices on its own.
    healthy.store(false, Ordering::SeqCst);
    let status = supervisor.status().await;
    assert!(!status.running);
    assert_eq!(status.uptime_seconds, 0);
    assert!(status.error.is_some());

    // And recovers the same way.
    healthy.store(true, Ordering::SeqCst);
    let status = supervisor.status().await;
    assert!(status.running);
}

#[tokio::test]
async fn uptime_counts_only_while_running() {
    let healthy = Arc::new(AtomicBool::new(true));
    let engine = Arc::new(engine_with_service(healthy));
    let supervisor = Supervisor::new(engine, test_config(free_port()));

    supervisor.ensure_running().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let status = supervisor.status().await;
    assert!(status.running);
    assert!(status.uptime_seconds >= 1);
}

#[tokio::test]
async fn stop_issues_engine_stop_and_clears_uptime() {
    let healthy = Arc::new(AtomicBool::new(true));
    let engine = Arc::new(engine_with_service(healthy.clone()));
    let supervisor = Supervisor::new(engine.clone(), test_config(free_port()));

    supervisor.ensure_running().await.unwrap();
    supervisor.stop().await.unwrap();

    assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
    assert_eq!(supervisor.phase().await, SupervisorPhase::Stopped);
    assert_eq!(engine.container_state_now(), ContainerState::Stopped);

    // The endpoint (still served by the test fixture) may answer, but
    // uptime is gone with the start record.
    healthy.store(false, Ordering::SeqCst);
    let status = supervisor.status().await;
    assert!(!status.running);
    assert_eq!(status.uptime_seconds, 0);
}

#[tokio::test]
async fn abort_cancels_startup_before_budget() {
    // No health server: the poll would run its full budget.
    let engine = Arc::new(StubEngine::new().with_image_present());
    let mut config = test_config(free_port());
    config.health_max_attempts = 1000;
    config.health_interval_ms = 50;
    let supervisor = Arc::new(Supervisor::new(engine, config));

    let handle = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.ensure_running().await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    supervisor.abort_startup();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("poll did not abort promptly")
        .unwrap();
    assert!(matches!(result, Err(SupervisorError::Cancelled)));
    assert_eq!(supervisor.phase().await, SupervisorPhase::Failed);
}

#[tokio::test]
async fn port_conflict_falls_back_to_next_free_port() {
    let healthy = Arc::new(AtomicBool::new(true));
    let engine = Arc::new(engine_with_service(healthy));

    // Occupy the preferred port for the whole test.
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let preferred = occupied.local_addr().unwrap().port();

    let supervisor = Supervisor::new(engine, test_config(preferred));
    let endpoint = supervisor.ensure_running().await.unwrap();

    assert_ne!(endpoint.port, preferred);
    assert!(endpoint.port > preferred);
    assert!(endpoint.port <= preferred.saturating_add(20));
}
