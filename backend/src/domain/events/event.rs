//! Immutable domain event handed to the broker by value.

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::{CORRELATION_ID_KEY, CorrelationScope};

/// Prefix of the key each published event is stored under.
pub const EVENT_KEY_PREFIX: &str = "event";

/// Something that happened in a service, broadcast to its peers.
///
/// ## Invariants
/// - `event_id` is unique per event.
/// - Serialises to `{eventType, eventId, occurredOn, data, metadata}`.
///
/// # Examples
/// ```
/// use backend_core::domain::events::DomainEvent;
/// use mockable::DefaultClock;
/// use serde_json::json;
///
/// let event = DomainEvent::new("order.created", json!({"orderId": "o-1"}), &DefaultClock);
/// assert!(event.storage_key().starts_with("event:order.created:"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    event_type: String,
    event_id: Uuid,
    occurred_on: DateTime<Utc>,
    data: Value,
    metadata: Map<String, Value>,
}

impl DomainEvent {
    /// New event stamped with the current time and a fresh id.
    ///
    /// The active correlation id, if any, is copied into the metadata.
    pub fn new(event_type: impl Into<String>, data: Value, clock: &dyn Clock) -> Self {
        let mut metadata = Map::new();
        if let Some(id) = CorrelationScope::correlation_id() {
            metadata.insert(CORRELATION_ID_KEY.to_owned(), Value::String(id.to_string()));
        }
        Self {
            event_type: event_type.into(),
            event_id: Uuid::new_v4(),
            occurred_on: clock.utc(),
            data,
            metadata,
        }
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Event type, e.g. `user.created`.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Unique id of this event.
    #[must_use]
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// When the event happened.
    #[must_use]
    pub fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }

    /// Event payload.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Free-form metadata.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Key the event copy is stored under: `event:<eventType>:<eventId>`.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{EVENT_KEY_PREFIX}:{}:{}", self.event_type, self.event_id)
    }

    /// Wire payload.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when the payload cannot be encoded.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
