//! Request observability middleware.
//!
//! Every inbound request runs inside its own [`CorrelationScope`]. The
//! correlation id is taken from the `X-Correlation-ID` header when it holds a
//! usable token and generated otherwise; it is echoed on every response,
//! including error responses. Each request logs "Incoming request" once and
//! "Request completed" exactly once.
//!
//! Tokio task-local variables are not inherited across spawned tasks. Wrap
//! spawned work in [`CorrelationScope::propagate`] to keep the scope.

use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::Method;
use actix_web::http::header::{self, HeaderName, HeaderValue};
use actix_http::BoxedPayloadStream;
use actix_web::error::InternalError;
use actix_web::{Error, HttpMessage, web};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use futures_util::{StreamExt as _, stream};
use serde_json::{Map, Value, json};

use super::redaction::redact_body;
use crate::domain::{CORRELATION_ID_HEADER, CorrelationId, CorrelationScope, ScopeValues};
use crate::logging::Logger;

/// Responses slower than this also log a `warn` record.
pub const SLOW_RESPONSE_THRESHOLD: Duration = Duration::from_millis(3_000);
/// Default cap on the request body buffered for logging.
pub const BODY_LOG_LIMIT: usize = 256 * 1024;

/// Identity of the caller, inserted into request extensions by the
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Stable user identifier.
    pub id: String,
}

impl AuthenticatedUser {
    /// User with `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Middleware opening a correlation scope per request and logging its
/// lifecycle.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use backend_core::middleware::RequestObservability;
///
/// let app = App::new().wrap(RequestObservability::default());
/// ```
#[derive(Clone)]
pub struct RequestObservability {
    logger: Logger,
    slow_threshold: Duration,
    body_log_limit: usize,
}

impl Default for RequestObservability {
    fn default() -> Self {
        Self {
            logger: Logger::new("HTTP"),
            slow_threshold: SLOW_RESPONSE_THRESHOLD,
            body_log_limit: BODY_LOG_LIMIT,
        }
    }
}

impl RequestObservability {
    /// Override the slow response threshold.
    #[must_use]
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Largest body, in bytes, that is buffered for logging. Larger bodies
    /// reach the handler untouched and are not logged.
    #[must_use]
    pub fn with_body_log_limit(mut self, limit: usize) -> Self {
        self.body_log_limit = limit;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestObservability
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestObservabilityMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestObservabilityMiddleware {
            service: Rc::new(service),
            logger: self.logger.clone(),
            slow_threshold: self.slow_threshold,
            body_log_limit: self.body_log_limit,
        }))
    }
}

/// Service wrapper produced by [`RequestObservability`].
pub struct RequestObservabilityMiddleware<S> {
    service: Rc<S>,
    logger: Logger,
    slow_threshold: Duration,
    body_log_limit: usize,
}

impl<S, B> Service<ServiceRequest> for RequestObservabilityMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let logger = self.logger.clone();
        let slow_threshold = self.slow_threshold;
        let body_log_limit = self.body_log_limit;

        let correlation_id = CorrelationId::from_header_or_generate(
            req.headers()
                .get(CORRELATION_ID_HEADER)
                .and_then(|value| value.to_str().ok()),
        );
        let user_id = req
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|user| user.id.clone());
        let values = ScopeValues::new(correlation_id.clone(), req.uri().to_string())
            .with_user_id(user_id);

        Box::pin(CorrelationScope::run(values, async move {
            let exchange = Exchange {
                logger,
                method: req.method().to_string(),
                url: req.uri().to_string(),
                started: Instant::now(),
                slow_threshold,
            };
            exchange.incoming(&req);
            let req = buffer_and_log_body(req, &exchange.logger, body_log_limit).await;

            match service.call(req).await {
                Ok(mut res) => {
                    if let Some(error) = res.response().error() {
                        exchange.failed(&error.to_string(), &format!("{error:?}"));
                    }
                    set_correlation_header(res.headers_mut(), &correlation_id);
                    exchange.completed(res.status().as_u16());
                    Ok(res.map_into_left_body())
                }
                Err(error) => {
                    exchange.failed(&error.to_string(), &format!("{error:?}"));
                    let mut response = error.error_response();
                    set_correlation_header(response.headers_mut(), &correlation_id);
                    exchange.completed(response.status().as_u16());
                    Err(InternalError::from_response(error.to_string(), response).into())
                }
            }
        }))
    }
}

struct Exchange {
    logger: Logger,
    method: String,
    url: String,
    started: Instant,
    slow_threshold: Duration,
}

impl Exchange {
    fn incoming(&self, req: &ServiceRequest) {
        let mut meta = Map::new();
        meta.insert("method".to_owned(), Value::String(self.method.clone()));
        meta.insert("url".to_owned(), Value::String(self.url.clone()));
        if let Some(agent) = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
        {
            meta.insert("userAgent".to_owned(), Value::String(agent.to_owned()));
        }
        if let Some(ip) = req.connection_info().realip_remote_addr() {
            meta.insert("ip".to_owned(), Value::String(ip.to_owned()));
        }
        self.logger.log("Incoming request", Some(Value::Object(meta)));
    }

    fn failed(&self, message: &str, stack: &str) {
        self.logger.error_with_meta(
            message,
            Some(stack),
            Some(json!({ "method": self.method, "url": self.url })),
        );
    }

    fn completed(&self, status_code: u16) {
        let elapsed = self.started.elapsed();
        let duration = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let meta = json!({
            "method": self.method,
            "url": self.url,
            "statusCode": status_code,
            "duration": duration,
        });
        self.logger.log("Request completed", Some(meta.clone()));
        if elapsed > self.slow_threshold {
            self.logger.warn("Slow response", Some(meta));
        }
    }
}

fn is_mutation(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn is_json(req: &ServiceRequest) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("json"))
}

/// Read up to `limit` bytes of a JSON mutation body, log it redacted, and put
/// everything read back in front of the unread remainder.
async fn buffer_and_log_body(
    mut req: ServiceRequest,
    logger: &Logger,
    limit: usize,
) -> ServiceRequest {
    if !is_mutation(req.method()) || !is_json(&req) {
        return req;
    }
    let mut payload = req.take_payload();
    let mut buffered = web::BytesMut::new();
    let mut read_error = None;
    let mut complete = false;
    while buffered.len() <= limit {
        match payload.next().await {
            Some(Ok(chunk)) => buffered.extend_from_slice(&chunk),
            Some(Err(error)) => {
                read_error = Some(error);
                break;
            }
            None => {
                complete = true;
                break;
            }
        }
    }
    let bytes = buffered.freeze();

    if complete && bytes.len() <= limit {
        if let Ok(body) = serde_json::from_slice::<Value>(&bytes) {
            logger.log("Request body", Some(json!({ "body": redact_body(&body) })));
        }
        req.set_payload(Payload::from(bytes));
        return req;
    }
    if read_error.is_none() {
        logger.debug(
            "Request body too large to log",
            Some(json!({ "limit": limit })),
        );
    }

    let mut prefix = vec![Ok(bytes)];
    prefix.extend(read_error.map(Err));
    let replay: BoxedPayloadStream = Box::pin(stream::iter(prefix).chain(payload));
    req.set_payload(Payload::from(replay));
    req
}

fn set_correlation_header(headers: &mut header::HeaderMap, id: &CorrelationId) {
    match HeaderValue::from_str(id.as_str()) {
        Ok(value) => {
            headers.insert(HeaderName::from_static("x-correlation-id"), value);
        }
        Err(error) => {
            tracing::error!(
                %error,
                correlation_id = %id,
                "failed to encode correlation identifier header"
            );
        }
    }
}

#[cfg(test)]
#[path = "observability_tests.rs"]
mod tests;
