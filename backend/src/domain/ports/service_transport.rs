//! Driven port for issuing one HTTP call to a downstream service.
//!
//! The executor owns retry and envelope semantics; adapters implementing this
//! port own only transport details (serialisation, timeout, status mapping).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::define_port_error;

/// HTTP verb of an inter-service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    /// Read.
    Get,
    /// Create.
    Post,
    /// Replace.
    Put,
    /// Partial update.
    Patch,
    /// Remove.
    Delete,
}

impl RpcMethod {
    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fully resolved outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// HTTP verb.
    pub method: RpcMethod,
    /// Absolute target URL (service base URL joined with the path).
    pub url: Url,
    /// Extra headers (correlation id, authorization).
    pub headers: Vec<(String, String)>,
    /// Query-string pairs.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
    /// Upper bound for the whole call.
    pub timeout: Duration,
}

impl OutboundRequest {
    /// Look up a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Successful (2xx) downstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded JSON body; non-JSON bodies arrive as a string, empty ones as null.
    pub body: Value,
}

define_port_error! {
    /// Failures surfaced by a service transport.
    pub enum TransportError {
        /// The call exceeded its timeout.
        Timeout { message: String } =>
            "downstream call timed out: {message}",
        /// The connection could not be established or broke mid-call.
        Connection { message: String } =>
            "downstream transport failed: {message}",
        /// The request could not be built locally (bad header or URL).
        Request { message: String } =>
            "invalid downstream request: {message}",
        /// The downstream service answered with a non-2xx status.
        Status { status: u16, message: String } =>
            "{message}",
    }
}

impl TransportError {
    /// Status code carried by the failure, if the downstream answered.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Timeout { .. } | Self::Connection { .. } | Self::Request { .. } => None,
        }
    }

    /// Transport faults, timeouts and 5xx answers are transient; everything
    /// else is the caller's problem.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Request { .. } => false,
        }
    }
}

/// Port performing one HTTP call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceTransport: Send + Sync {
    /// Send `request` once, without retrying.
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::timeout(TransportError::timeout("5s elapsed"), true)]
    #[case::connection(TransportError::connection("refused"), true)]
    #[case::server_error(TransportError::status(500_u16, "boom"), true)]
    #[case::bad_gateway(TransportError::status(502_u16, "upstream"), true)]
    #[case::not_found(TransportError::status(404_u16, "missing"), false)]
    #[case::conflict(TransportError::status(409_u16, "duplicate"), false)]
    #[case::malformed_request(TransportError::request("invalid header value"), false)]
    fn retry_classification(#[case] error: TransportError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
    }

    #[test]
    fn only_status_failures_carry_a_status() {
        assert_eq!(
            TransportError::status(418_u16, "teapot").status_code(),
            Some(418)
        );
        assert_eq!(TransportError::timeout("slow").status_code(), None);
        assert_eq!(TransportError::request("bad header").status_code(), None);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let request = OutboundRequest {
            method: RpcMethod::Get,
            url: Url::parse("http://users.internal/users/1").expect("url"),
            headers: vec![("X-Correlation-ID".to_owned(), "abc".to_owned())],
            query: Vec::new(),
            body: None,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(request.header("x-correlation-id"), Some("abc"));
        assert_eq!(request.header("authorization"), None);
    }
}
