//! Resolved service endpoint.

use std::fmt;

/// Where the supervised service is reachable on this host.
///
/// Derived during port resolution and immutable for the rest of the
/// session; the port is never handed to a different service while this
/// endpoint is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Host address, normally localhost.
    pub host: String,
    /// Bound host port.
    pub port: u16,
}

impl ServiceEndpoint {
    pub fn localhost(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    /// Base URL of the service.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Liveness endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/api/health", self.base_url())
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
