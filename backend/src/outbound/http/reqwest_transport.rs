//! Reqwest-backed service transport.
//!
//! This adapter owns transport details only: request serialisation, per-call
//! timeout, HTTP status mapping and JSON decoding. Retries belong to the
//! executor.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::domain::ports::{
    OutboundRequest, RpcMethod, ServiceTransport, TransportError, TransportResponse,
};

const DEFAULT_USER_AGENT: &str = concat!("backend-core/", env!("CARGO_PKG_VERSION"));

/// Service transport performing HTTP calls through a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestServiceTransport {
    client: Client,
}

impl ReqwestServiceTransport {
    /// Build a transport with a fresh connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Ok(Self::with_client(client))
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceTransport for ReqwestServiceTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(method_for(request.method), request.url)
            .timeout(request.timeout)
            .header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        Ok(TransportResponse {
            status: status.as_u16(),
            body: decode_body(body.as_ref()),
        })
    }
}

fn method_for(method: RpcMethod) -> Method {
    match method {
        RpcMethod::Get => Method::GET,
        RpcMethod::Post => Method::POST,
        RpcMethod::Put => Method::PUT,
        RpcMethod::Patch => Method::PATCH,
        RpcMethod::Delete => Method::DELETE,
    }
}

fn decode_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn map_transport_error(error: reqwest::Error) -> TransportError {
    if error.is_builder() {
        TransportError::request(error.to_string())
    } else if error.is_timeout() {
        TransportError::timeout(error.to_string())
    } else {
        TransportError::connection(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> TransportError {
    let message = downstream_message(body).unwrap_or_else(|| {
        let preview = body_preview(body);
        if preview.is_empty() {
            format!("status {}", status.as_u16())
        } else {
            format!("status {}: {preview}", status.as_u16())
        }
    });
    TransportError::status(status.as_u16(), message)
}

/// `message` or `error` string of a JSON error body.
fn downstream_message(body: &[u8]) -> Option<String> {
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(body) else {
        return None;
    };
    ["message", "error"]
        .into_iter()
        .find_map(|key| fields.get(key).and_then(Value::as_str))
        .map(str::to_owned)
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
