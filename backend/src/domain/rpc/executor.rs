//! Retrying executor for inter-service calls.
//!
//! The executor owns the retry policy (bounded attempts, fixed or capped
//! exponential delay, retry only on transport faults, timeouts and 5xx) and
//! folds every outcome into a [`ServiceResponse`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::registry::{ServiceConfig, ServiceName, ServiceRegistry};
use super::response::{LOCAL_FAILURE_STATUS, ServiceResponse};
use crate::domain::ports::{OutboundRequest, RpcMethod, ServiceTransport, TransportError};
use crate::domain::{CORRELATION_ID_HEADER, CorrelationScope};
use crate::logging::Logger;

/// Async sleeping abstraction so retry delays can be observed in tests.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Tokio-based sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// One logical call before it is resolved against the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    /// Target service.
    pub service: ServiceName,
    /// HTTP verb.
    pub method: RpcMethod,
    /// Path relative to the service base URL.
    pub path: String,
    /// JSON body.
    pub body: Option<Value>,
    /// Query-string pairs.
    pub query: Vec<(String, String)>,
}

impl RpcCall {
    /// Call without body or query.
    pub fn new(service: ServiceName, method: RpcMethod, path: impl Into<String>) -> Self {
        Self {
            service,
            method,
            path: path.into(),
            body: None,
            query: Vec::new(),
        }
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append query-string pairs.
    #[must_use]
    pub fn with_query<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }
}

/// Executes calls through the registry with the retry policy applied.
pub struct RetryingRequestExecutor {
    registry: Arc<ServiceRegistry>,
    transport: Arc<dyn ServiceTransport>,
    sleeper: Arc<dyn RetrySleeper>,
    auth_token: Option<String>,
    logger: Logger,
}

impl RetryingRequestExecutor {
    /// Executor sleeping on the tokio timer.
    pub fn new(registry: Arc<ServiceRegistry>, transport: Arc<dyn ServiceTransport>) -> Self {
        Self {
            registry,
            transport,
            sleeper: Arc::new(TokioSleeper),
            auth_token: None,
            logger: Logger::new("ServiceClient"),
        }
    }

    /// Replace the sleeper used between attempts.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn RetrySleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Bearer token sent on every call; blank tokens are ignored.
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|value| !value.trim().is_empty());
        self
    }

    /// Registry the executor resolves services against.
    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub(crate) fn transport(&self) -> &dyn ServiceTransport {
        self.transport.as_ref()
    }

    /// Call `path` on `service`.
    pub async fn call(
        &self,
        service: ServiceName,
        method: RpcMethod,
        path: &str,
        body: Option<Value>,
        query: Option<&[(&str, &str)]>,
    ) -> ServiceResponse<Value> {
        let mut call = RpcCall::new(service, method, path);
        call.body = body;
        if let Some(pairs) = query {
            call = call.with_query(pairs.iter().copied());
        }
        self.execute(call).await
    }

    /// Execute a prepared call.
    pub async fn execute(&self, call: RpcCall) -> ServiceResponse<Value> {
        let Some(config) = self.registry.get(call.service) else {
            let message = format!("service {} is not registered", call.service);
            self.logger.error_with_meta(&message, None, Some(call_meta(&call)));
            return ServiceResponse::failure(LOCAL_FAILURE_STATUS, message);
        };
        let request = match self.build_request(config, &call) {
            Ok(request) => request,
            Err(err) => {
                let message = format!("invalid path {} for service {}: {err}", call.path, call.service);
                self.logger.error_with_meta(&message, None, Some(call_meta(&call)));
                return ServiceResponse::failure(LOCAL_FAILURE_STATUS, message);
            }
        };

        let mut retries_used = 0_u32;
        loop {
            match self.transport.send(request.clone()).await {
                Ok(response) => {
                    if retries_used > 0 {
                        self.logger.log(
                            "Downstream call recovered after retry",
                            Some(attempt_meta(&call, retries_used + 1, None)),
                        );
                    }
                    return ServiceResponse::success(response.body, response.status);
                }
                Err(error) if error.is_retryable() && retries_used < config.max_retries => {
                    retries_used += 1;
                    let delay = config.delay_after(retries_used);
                    let mut meta = attempt_meta(&call, retries_used, Some(&error));
                    if let Value::Object(fields) = &mut meta {
                        fields.insert(
                            "retryDelay".to_owned(),
                            Value::from(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)),
                        );
                    }
                    self.logger.warn("Retrying downstream call", Some(meta));
                    self.sleeper.sleep(delay).await;
                }
                Err(error) => {
                    let meta = attempt_meta(&call, retries_used + 1, Some(&error));
                    if error.is_retryable() {
                        self.logger
                            .error_with_meta("Downstream call failed", None, Some(meta));
                    } else {
                        self.logger.warn("Downstream call rejected", Some(meta));
                    }
                    return ServiceResponse::failure(
                        error.status_code().unwrap_or(LOCAL_FAILURE_STATUS),
                        error.to_string(),
                    );
                }
            }
        }
    }

    pub(crate) fn build_request(
        &self,
        config: &ServiceConfig,
        call: &RpcCall,
    ) -> Result<OutboundRequest, url::ParseError> {
        let url = config.resolve(&call.path)?;
        let mut headers = Vec::new();
        if let Some(id) = CorrelationScope::correlation_id() {
            headers.push((CORRELATION_ID_HEADER.to_owned(), id.to_string()));
        }
        if let Some(token) = &self.auth_token {
            headers.push(("Authorization".to_owned(), format!("Bearer {token}")));
        }
        Ok(OutboundRequest {
            method: call.method,
            url,
            headers,
            query: call.query.clone(),
            body: call.body.clone(),
            timeout: config.timeout,
        })
    }
}

fn call_meta(call: &RpcCall) -> Value {
    json!({
        "targetService": call.service.as_str(),
        "method": call.method.as_str(),
        "path": call.path,
    })
}

fn attempt_meta(call: &RpcCall, attempt: u32, error: Option<&TransportError>) -> Value {
    let mut meta = call_meta(call);
    if let Value::Object(fields) = &mut meta {
        fields.insert("attempt".to_owned(), Value::from(attempt));
        if let Some(error) = error {
            fields.insert("error".to_owned(), Value::String(error.to_string()));
            if let Some(status) = error.status_code() {
                fields.insert("statusCode".to_owned(), Value::from(status));
            }
        }
    }
    meta
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
