//! Fire-and-forget domain event publisher.
//!
//! The publisher tracks the broker connection through
//! `Disconnected -> Connecting -> Ready` and falls back to `Disconnected`
//! whenever the broker reports a lost connection. Every failure is logged
//! and swallowed; callers never observe an error.
//!
//! At most one connect attempt is in flight. Events published while it runs
//! are dropped instead of queueing behind it, so a publish waits for at most
//! one connect timeout.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};

use super::event::DomainEvent;
use crate::domain::ports::{EventBroker, EventBrokerError};
use crate::logging::Logger;

/// Default pub/sub channel.
pub const DEFAULT_EVENT_CHANNEL: &str = "domain-events";
/// How long the stored copy of an event is kept.
pub const EVENT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
/// Default bound on a single broker connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection state of the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    /// No usable connection.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Events can be published.
    Ready,
}

/// Publisher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherSettings {
    /// Channel events are published on.
    pub channel: String,
    /// Upper bound for one connect attempt.
    pub connect_timeout: Duration,
    /// Expiry of the stored event copy.
    pub retention: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            channel: DEFAULT_EVENT_CHANNEL.to_owned(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retention: EVENT_RETENTION,
        }
    }
}

/// Publishes domain events through an [`EventBroker`].
pub struct EventPublisher {
    broker: Arc<dyn EventBroker>,
    settings: PublisherSettings,
    state: Mutex<PublisherState>,
    logger: Logger,
}

impl EventPublisher {
    /// Disconnected publisher; the first publish connects lazily.
    pub fn new(broker: Arc<dyn EventBroker>, settings: PublisherSettings) -> Self {
        Self {
            broker,
            settings,
            state: Mutex::new(PublisherState::Disconnected),
            logger: Logger::new("EventPublisher"),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> PublisherState {
        *self.lock_state()
    }

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    /// Connect eagerly, e.g. at startup. Returns whether the publisher is
    /// ready; failure is logged and leaves the publisher disconnected.
    pub async fn initialize(&self) -> bool {
        self.ensure_ready().await
    }

    /// Publish `event` and store a copy under its storage key.
    pub async fn publish(&self, event: &DomainEvent) {
        if !self.ensure_ready().await {
            self.logger
                .warn("Event broker unavailable, event dropped", Some(event_meta(event)));
            return;
        }
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(err) => {
                self.log_failure(event, &err.to_string());
                return;
            }
        };
        if let Err(err) = self.broker.publish(&self.settings.channel, &payload).await {
            self.handle_broker_error(event, &err);
            return;
        }
        if let Err(err) = self
            .broker
            .store(&event.storage_key(), &payload, self.settings.retention)
            .await
        {
            self.handle_broker_error(event, &err);
            return;
        }
        let mut meta = event_meta(event);
        if let Value::Object(fields) = &mut meta {
            fields.insert("channel".to_owned(), Value::String(self.settings.channel.clone()));
        }
        self.logger.log("Event published", Some(meta));
    }

    /// Publish `events` one after another; a failed event does not stop the
    /// rest.
    pub async fn publish_all(&self, events: &[DomainEvent]) {
        for event in events {
            self.publish(event).await;
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn ensure_ready(&self) -> bool {
        {
            let mut state = self.lock_state();
            match *state {
                PublisherState::Ready => return true,
                PublisherState::Connecting => return false,
                PublisherState::Disconnected => *state = PublisherState::Connecting,
            }
        }
        let mut attempt = ConnectAttempt {
            state: &self.state,
            outcome: PublisherState::Disconnected,
        };
        let outcome = tokio::time::timeout(self.settings.connect_timeout, self.broker.connect()).await;
        match outcome {
            Ok(Ok(())) => {
                attempt.outcome = PublisherState::Ready;
                self.logger.log("Event broker connected", None);
                true
            }
            Ok(Err(err)) => {
                self.logger.error_with_meta(
                    "Event broker connection failed",
                    None,
                    Some(json!({ "error": err.to_string() })),
                );
                false
            }
            Err(_) => {
                let timeout_ms =
                    u64::try_from(self.settings.connect_timeout.as_millis()).unwrap_or(u64::MAX);
                self.logger.error_with_meta(
                    "Event broker connection timed out",
                    None,
                    Some(json!({ "timeout": timeout_ms })),
                );
                false
            }
        }
    }

    fn handle_broker_error(&self, event: &DomainEvent, err: &EventBrokerError) {
        if err.is_connection_loss() {
            *self.lock_state() = PublisherState::Disconnected;
        }
        self.log_failure(event, &err.to_string());
    }

    fn log_failure(&self, event: &DomainEvent, error: &str) {
        let mut meta = event_meta(event);
        if let Value::Object(fields) = &mut meta {
            fields.insert("error".to_owned(), Value::String(error.to_owned()));
        }
        self.logger
            .error_with_meta("Failed to publish event", None, Some(meta));
    }
}

/// Leaves the `Connecting` state when the attempt finishes or is cancelled.
struct ConnectAttempt<'a> {
    state: &'a Mutex<PublisherState>,
    outcome: PublisherState,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = self.outcome;
    }
}

fn event_meta(event: &DomainEvent) -> Value {
    json!({
        "eventType": event.event_type(),
        "eventId": event.event_id().to_string(),
    })
}

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;
