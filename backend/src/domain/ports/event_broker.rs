//! Driven port for the shared publish/subscribe broker.
//!
//! The broker also offers a key-value store with expiring keys, used to keep
//! a short-lived copy of every published event for inspection.

use std::time::Duration;

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by the broker adapter.
    pub enum EventBrokerError {
        /// The broker could not be reached or the connection dropped.
        Connection { message: String } =>
            "event broker connection failed: {message}",
        /// The broker rejected or failed the publish command.
        Publish { message: String } =>
            "event broker publish failed: {message}",
        /// Writing the debug copy failed.
        Store { message: String } =>
            "event broker store failed: {message}",
    }
}

impl EventBrokerError {
    /// Whether the failure means the connection is no longer usable.
    #[must_use]
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Port over a pub/sub broker with an expiring key-value store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Establish (or re-establish) the connection.
    async fn connect(&self) -> Result<(), EventBrokerError>;

    /// Publish `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), EventBrokerError>;

    /// Store `payload` under `key`, expiring after `ttl`.
    async fn store(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), EventBrokerError>;
}
