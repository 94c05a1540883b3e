//! HTTP server configuration object.

use std::net::SocketAddr;
use std::time::Duration;

use crate::middleware::SLOW_RESPONSE_THRESHOLD;

/// Builder-style configuration for creating the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) slow_response_threshold: Duration,
}

impl ServerConfig {
    /// Configuration binding to `bind_addr`.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            slow_response_threshold: SLOW_RESPONSE_THRESHOLD,
        }
    }

    /// Override the slow response threshold of the request middleware.
    #[must_use]
    pub fn with_slow_response_threshold(mut self, threshold: Duration) -> Self {
        self.slow_response_threshold = threshold;
        self
    }

    /// Return the socket address the server will bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}
