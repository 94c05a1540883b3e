//! Structured logger handle.
//!
//! A thin layer over `tracing`: each call emits exactly one event, which the
//! [`CorrelationJsonFormat`](super::CorrelationJsonFormat) renders with the
//! active correlation scope merged in. Caller metadata travels as a JSON
//! object in the `meta` field and is flattened into the record.

use std::borrow::Cow;

use serde_json::{Map, Value, json};

/// Queries slower than this are logged at `warn`.
pub const SLOW_QUERY_THRESHOLD_MS: u64 = 1_000;

/// Severity of a structured log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal operation.
    Info,
    /// Degraded but functioning.
    Warn,
    /// Failure.
    Error,
}

macro_rules! emit_at {
    ($macro:ident, $context:expr, $meta:expr, $stack:expr, $message:expr) => {
        tracing::$macro!(
            context = $context,
            meta = $meta,
            stack = $stack,
            "{}",
            $message
        )
    };
}

/// Logger handle, optionally labelled with the component that owns it.
///
/// # Examples
/// ```
/// use backend_core::logging::Logger;
/// use serde_json::json;
///
/// let logger = Logger::new("PricingClient");
/// logger.log("quote requested", Some(json!({"carrierId": "c-1"})));
/// logger.error("quote failed", Some("at pricing::quote"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Logger {
    context: Option<Cow<'static, str>>,
}

impl Logger {
    /// Logger whose records carry `context`.
    pub fn new(context: impl Into<Cow<'static, str>>) -> Self {
        Self {
            context: Some(context.into()),
        }
    }

    /// Logger without a context label.
    #[must_use]
    pub const fn root() -> Self {
        Self { context: None }
    }

    /// Context label of this handle.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Emit an `info` record.
    pub fn log(&self, message: &str, meta: Option<Value>) {
        self.emit(LogLevel::Info, message, meta.as_ref(), None);
    }

    /// Emit a `warn` record.
    pub fn warn(&self, message: &str, meta: Option<Value>) {
        self.emit(LogLevel::Warn, message, meta.as_ref(), None);
    }

    /// Emit a `debug` record.
    pub fn debug(&self, message: &str, meta: Option<Value>) {
        self.emit(LogLevel::Debug, message, meta.as_ref(), None);
    }

    /// Emit an `error` record; the stack goes to its own `stack` field.
    pub fn error(&self, message: &str, stack: Option<&str>) {
        self.emit(LogLevel::Error, message, None, stack);
    }

    /// Emit an `error` record with metadata as well as a stack.
    pub fn error_with_meta(&self, message: &str, stack: Option<&str>, meta: Option<Value>) {
        self.emit(LogLevel::Error, message, meta.as_ref(), stack);
    }

    /// Record one served HTTP request.
    pub fn log_request(&self, method: &str, url: &str, status_code: u16, duration_ms: u64) {
        self.log(
            "HTTP request",
            Some(json!({
                "method": method,
                "url": url,
                "statusCode": status_code,
                "duration": duration_ms,
            })),
        );
    }

    /// Record one database query, escalating slow and failed queries.
    pub fn log_query(
        &self,
        query: &str,
        duration_ms: u64,
        error: Option<&(dyn std::error::Error + 'static)>,
    ) {
        let mut meta = Map::new();
        meta.insert("query".to_owned(), Value::String(query.to_owned()));
        meta.insert("duration".to_owned(), Value::from(duration_ms));

        match error {
            Some(error) => {
                meta.insert("error".to_owned(), Value::String(error.to_string()));
                self.emit(
                    LogLevel::Error,
                    "Database query failed",
                    Some(&Value::Object(meta)),
                    None,
                );
            }
            None if duration_ms > SLOW_QUERY_THRESHOLD_MS => {
                self.emit(
                    LogLevel::Warn,
                    "Slow query detected",
                    Some(&Value::Object(meta)),
                    None,
                );
            }
            None => self.emit(
                LogLevel::Debug,
                "Database query",
                Some(&Value::Object(meta)),
                None,
            ),
        }
    }

    /// Record a domain event occurrence.
    pub fn log_event(&self, event_type: &str, data: &Value) {
        self.log(
            &format!("Event: {event_type}"),
            Some(json!({ "eventType": event_type, "data": data })),
        );
    }

    /// Record an authentication decision; failures are logged at `warn`.
    pub fn log_auth(&self, action: &str, user_id: Option<&str>, success: bool) {
        let mut meta = json!({ "action": action, "success": success });
        if let (Some(user_id), Value::Object(fields)) = (user_id, &mut meta) {
            fields.insert("userId".to_owned(), Value::String(user_id.to_owned()));
        }
        let message = format!("Auth: {action}");
        if success {
            self.log(&message, Some(meta));
        } else {
            self.warn(&message, Some(meta));
        }
    }

    fn emit(&self, level: LogLevel, message: &str, meta: Option<&Value>, stack: Option<&str>) {
        let meta = meta.map(Value::to_string);
        let context = self.context.as_deref();
        let meta = meta.as_deref();
        match level {
            LogLevel::Debug => emit_at!(debug, context, meta, stack, message),
            LogLevel::Info => emit_at!(info, context, meta, stack, message),
            LogLevel::Warn => emit_at!(warn, context, meta, stack, message),
            LogLevel::Error => emit_at!(error, context, meta, stack, message),
        }
    }
}
