//! Bounded polling of the service liveness endpoint.

use std::time::Duration;

use tokio::sync::watch;

/// Attempt budget for a poll.
///
/// Local container startup latency is roughly constant, not
/// congestion-sensitive, so the interval is fixed with no backoff. The
/// defaults give a ~30 s ceiling; callers tune them, the poller never
/// hard-codes its own.
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub interval: Duration,
    /// Timeout for each individual request.
    pub request_timeout: Duration,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(2),
        }
    }
}

/// Outcome of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The endpoint answered 2xx.
    Ready,
    /// The attempt budget was exhausted.
    TimedOut,
    /// The poll was aborted before a verdict.
    Cancelled,
}

/// Repeatedly probes an HTTP liveness endpoint until it answers or the
/// budget runs out.
pub struct HealthPoller {
    client: reqwest::Client,
}

impl HealthPoller {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// One liveness request; true iff the endpoint answered 2xx.
    pub async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Poll `url` until it answers 2xx or the budget is exhausted.
    pub async fn poll(&self, url: &str, budget: &PollBudget) -> PollOutcome {
        let (_tx, mut rx) = watch::channel(false);
        self.poll_with_cancel(url, budget, &mut rx).await
    }

    /// Poll with an abort signal.
    ///
    /// A `true` on the channel terminates the poll at the next boundary
    /// (before a probe or during an interval wait) instead of waiting out
    /// the full budget.
    pub async fn poll_with_cancel(
        &self,
        url: &str,
        budget: &PollBudget,
        cancel: &mut watch::Receiver<bool>,
    ) -> PollOutcome {
        for attempt in 1..=budget.max_attempts {
            if *cancel.borrow() {
                return PollOutcome::Cancelled;
            }

            if self.probe(url, budget.request_timeout).await {
                tracing::debug!(url, attempt, "service is ready");
                return PollOutcome::Ready;
            }

            tracing::debug!(
                url,
                attempt,
                max_attempts = budget.max_attempts,
                "service not ready yet"
            );

            // No wait after the final attempt.
            if attempt == budget.max_attempts {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(budget.interval) => {}
                cancelled_ok = async { cancel.wait_for(|c| *c).await.is_ok() } => {
                    if cancelled_ok {
                        return PollOutcome::Cancelled;
                    }
                    // Sender gone: no cancellation can arrive anymore.
                    tokio::time::sleep(budget.interval).await;
                }
            }
        }

        PollOutcome::TimedOut
    }
}

impl Default for HealthPoller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    use axum::{Router, http::StatusCode, routing::get};
    use tokio::net::TcpListener;

    fn fast_budget(max_attempts: u32) -> PollBudget {
        PollBudget {
            max_attempts,
            interval: Duration::from_millis(50),
            request_timeout: Duration::from_millis(500),
        }
    }

    /// Serve `/api/health`, answering 5xx until `ready_after` requests have
    /// been seen.
    async fn flaky_server(ready_after: u32) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();

        let app = Router::new().route(
            "/api/health",
            get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n >= ready_after {
                        (StatusCode::OK, "{\"status\":\"ok\"}")
                    } else {
                        (StatusCode::SERVICE_UNAVAILABLE, "starting")
                    }
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/api/health"), hits)
    }

    #[tokio::test]
    async fn ready_on_third_probe_stops_early() {
        let (url, hits) = flaky_server(3).await;
        let poller = HealthPoller::new();

        let start = Instant::now();
        let outcome = poller.poll(&url, &fast_budget(5)).await;

        assert_eq!(outcome, PollOutcome::Ready);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        // Two interval waits, not four.
        assert!(start.elapsed() < Duration::from_millis(200 + 400));
    }

    #[tokio::test]
    async fn ready_immediately_needs_one_probe() {
        let (url, hits) = flaky_server(1).await;
        let poller = HealthPoller::new();

        let outcome = poller.poll(&url, &fast_budget(5)).await;

        assert_eq!(outcome, PollOutcome::Ready);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dead_endpoint_times_out_after_budget() {
        // Bind and release to learn a port with no listener.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}/api/health");
        let poller = HealthPoller::new();

        let start = Instant::now();
        let outcome = poller.poll(&url, &fast_budget(3)).await;

        assert_eq!(outcome, PollOutcome::TimedOut);
        // Two interval waits between three attempts, none after the last.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn cancellation_aborts_before_budget() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}/api/health");

        let (tx, mut rx) = watch::channel(false);
        let budget = PollBudget {
            max_attempts: 100,
            interval: Duration::from_secs(1),
            request_timeout: Duration::from_millis(500),
        };

        let handle = tokio::spawn(async move {
            let poller = HealthPoller::new();
            poller.poll_with_cancel(&url, &budget, &mut rx).await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let start = Instant::now();
        let outcome = handle.await.unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
