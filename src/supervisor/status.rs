//! Freshly probed service status.

use std::time::Duration;

use serde::Serialize;

/// Instantaneous health of the service endpoint.
///
/// Recomputed on every query, never persisted across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// No endpoint resolved yet, nothing to probe.
    Unknown,
    /// The liveness endpoint answered 2xx just now.
    Ready,
    /// The liveness endpoint did not answer just now.
    Unreachable,
}

/// Point-in-time status of the supervised service.
///
/// `running` reflects a probe performed for this very call, so a container
/// that crashed since startup is reported as not running on the next query
/// with no push notification or manual reset needed. Status lags true
/// container state by at most one probe round-trip.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// Whether the liveness probe succeeded for this call.
    pub running: bool,
    /// Host port the service is (or would be) bound to.
    pub port: u16,
    /// Base URL of the service.
    pub base_url: String,
    /// Seconds since this process started the container; 0 when not
    /// running.
    pub uptime_seconds: u64,
    /// Health payload returned by the service, when running. JSON when the
    /// body parses, the raw text otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<serde_json::Value>,
    /// Probe error, when not running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One liveness request, surfacing the body verbatim.
///
/// Any 2xx is success. Failures come back as a message, not an error type:
/// at this boundary unreachability is a status, not a fault.
pub(crate) async fn fetch_health(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<serde_json::Value, String> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("health endpoint answered {status}"));
    }

    let body = response.text().await.unwrap_or_default();
    Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{Router, http::StatusCode, routing::get};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api/health")
    }

    #[tokio::test]
    async fn json_body_is_surfaced_as_json() {
        let url = serve(Router::new().route(
            "/api/health",
            get(|| async { (StatusCode::OK, "{\"status\":\"healthy\",\"jobs\":2}") }),
        ))
        .await;

        let client = reqwest::Client::new();
        let payload = fetch_health(&client, &url, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(payload["status"], "healthy");
        assert_eq!(payload["jobs"], 2);
    }

    #[tokio::test]
    async fn non_json_body_is_surfaced_verbatim() {
        let url = serve(Router::new().route("/api/health", get(|| async { "OK" }))).await;

        let client = reqwest::Client::new();
        let payload = fetch_health(&client, &url, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(payload, serde_json::Value::String("OK".to_string()));
    }

    #[tokio::test]
    async fn server_error_is_not_success() {
        let url = serve(Router::new().route(
            "/api/health",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;

        let client = reqwest::Client::new();
        let err = fetch_health(&client, &url, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.contains("500"));
    }
}
