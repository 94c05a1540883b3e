//! JSON line formatter enriched from the active correlation scope.
//!
//! Every `tracing` event, whether emitted through [`crate::logging::Logger`]
//! or a bare `tracing::info!`, is rendered as one JSON object carrying the
//! contractual fields `timestamp`, `level`, `message`, `service`,
//! `environment` and, while a request is being served, `correlationId`,
//! `userId` and `requestPath`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use mockable::{Clock, DefaultClock};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::domain::{CORRELATION_ID_KEY, CorrelationScope, REQUEST_PATH_KEY, ScopeValues, USER_ID_KEY};

/// Event field whose JSON object value is flattened into the record.
pub(crate) const META_FIELD: &str = "meta";
const MESSAGE_FIELD: &str = "message";
const RESERVED_KEYS: [&str; 5] = ["timestamp", "level", "message", "service", "environment"];

/// `FormatEvent` implementation producing one JSON record per event.
#[derive(Clone)]
pub struct CorrelationJsonFormat {
    service: String,
    environment: String,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl CorrelationJsonFormat {
    /// Build a formatter stamping every record with `service` and `environment`.
    pub fn new(service: impl Into<String>, environment: impl Into<String>) -> Self {
        Self::with_clock(service, environment, Arc::new(DefaultClock))
    }

    /// Build a formatter reading timestamps from `clock`.
    pub fn with_clock(
        service: impl Into<String>,
        environment: impl Into<String>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            service: service.into(),
            environment: environment.into(),
            clock,
        }
    }

    pub(crate) fn build_record(
        &self,
        level: Level,
        fields: RecordedFields,
        scope: Option<ScopeValues>,
        now: DateTime<Utc>,
    ) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert(
            "timestamp".to_owned(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record.insert(
            "level".to_owned(),
            Value::String(level.as_str().to_ascii_lowercase()),
        );
        record.insert("message".to_owned(), Value::String(fields.message));
        record.insert("service".to_owned(), Value::String(self.service.clone()));
        record.insert(
            "environment".to_owned(),
            Value::String(self.environment.clone()),
        );

        if let Some(scope) = scope {
            record.insert(
                CORRELATION_ID_KEY.to_owned(),
                Value::String(scope.correlation_id.to_string()),
            );
            record.insert(
                REQUEST_PATH_KEY.to_owned(),
                Value::String(scope.request_path),
            );
            if let Some(user_id) = scope.user_id {
                record.insert(USER_ID_KEY.to_owned(), Value::String(user_id));
            }
        }

        for (key, value) in fields.entries {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                record.insert(key, value);
            }
        }
        record
    }
}

impl fmt::Debug for CorrelationJsonFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationJsonFormat")
            .field("service", &self.service)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl<S, N> FormatEvent<S, N> for CorrelationJsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = RecordedFields::default();
        event.record(&mut fields);
        let record = self.build_record(
            *event.metadata().level(),
            fields,
            CorrelationScope::snapshot(),
            self.clock.utc(),
        );
        let line = serde_json::to_string(&record).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

/// Field values collected from one event.
#[derive(Debug, Default)]
pub(crate) struct RecordedFields {
    pub(crate) message: String,
    pub(crate) entries: Vec<(String, Value)>,
}

impl RecordedFields {
    fn push(&mut self, field: &Field, value: Value) {
        let name = field.name();
        // Bridged `log` records carry their call site as `log.*` fields.
        if name.starts_with("log.") {
            return;
        }
        self.entries.push((name.to_owned(), value));
    }

    fn push_meta(&mut self, raw: &str) {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(object)) => self.entries.extend(object),
            Ok(other) => self.entries.push((META_FIELD.to_owned(), other)),
            Err(_) => self
                .entries
                .push((META_FIELD.to_owned(), Value::String(raw.to_owned()))),
        }
    }
}

impl Visit for RecordedFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            MESSAGE_FIELD => value.clone_into(&mut self.message),
            META_FIELD => self.push_meta(value),
            _ => self.push(field, Value::String(value.to_owned())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        match field.name() {
            MESSAGE_FIELD => self.message = rendered,
            META_FIELD => self.push_meta(&rendered),
            _ => self.push(field, Value::String(rendered)),
        }
    }
}
