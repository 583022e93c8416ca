//! Local TCP port allocation.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::supervisor::error::{Result, SupervisorError};

/// How long a single availability probe may take.
const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Finds a free local TCP port for the service to bind.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortAllocator;

impl PortAllocator {
    pub fn new() -> Self {
        Self
    }

    /// Whether `port` is free on localhost.
    ///
    /// Probes by connecting: a refused connection means nothing is
    /// listening, so the port is available. A successful connection means
    /// it is occupied. Every other outcome (timeout, unclassified network
    /// error) also counts as occupied — skipping a possibly-free port is
    /// preferred over binding over something live.
    pub async fn is_available(&self, port: u16) -> bool {
        let addr = format!("127.0.0.1:{port}");
        match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => false,
            Ok(Err(e)) => e.kind() == std::io::ErrorKind::ConnectionRefused,
            Err(_) => false,
        }
    }

    /// First available port in `start..=end`, scanning in order.
    pub async fn find_available(&self, start: u16, end: u16) -> Result<u16> {
        for port in start..=end {
            if self.is_available(port).await {
                return Ok(port);
            }
        }
        Err(SupervisorError::NoAvailablePort { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn bound_port_is_not_available() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let allocator = PortAllocator::new();
        assert!(!allocator.is_available(port).await);
    }

    #[tokio::test]
    async fn find_available_skips_bound_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let allocator = PortAllocator::new();
        let found = allocator
            .find_available(port, port.saturating_add(20))
            .await
            .unwrap();

        assert_ne!(found, port);
        assert!(allocator.is_available(found).await);
    }

    #[tokio::test]
    async fn single_occupied_port_range_is_exhausted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let allocator = PortAllocator::new();
        let err = allocator.find_available(port, port).await.unwrap_err();

        match err {
            SupervisorError::NoAvailablePort { start, end } => {
                assert_eq!(start, port);
                assert_eq!(end, port);
            }
            other => panic!("expected NoAvailablePort, got {other}"),
        }
    }

    #[tokio::test]
    async fn free_port_is_available() {
        // Learn a free port by binding and releasing it.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let allocator = PortAllocator::new();
        assert!(allocator.is_available(port).await);
    }
}
