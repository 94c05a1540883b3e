//! In-memory event broker that records every interaction.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ports::{EventBroker, EventBrokerError};

/// One value written through [`EventBroker::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// Storage key.
    pub key: String,
    /// Stored payload.
    pub payload: String,
    /// Requested expiry.
    pub ttl: Duration,
}

/// Broker double with switchable failure modes.
#[derive(Debug)]
pub struct RecordingEventBroker {
    reachable: AtomicBool,
    drop_next_publish: AtomicBool,
    rejected_marker: Mutex<Option<String>>,
    connects: AtomicUsize,
    published: Mutex<Vec<(String, String)>>,
    stored: Mutex<Vec<StoredEvent>>,
}

impl Default for RecordingEventBroker {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            drop_next_publish: AtomicBool::new(false),
            rejected_marker: Mutex::new(None),
            connects: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            stored: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingEventBroker {
    /// Broker that refuses every connection.
    pub fn unreachable() -> Self {
        let broker = Self::default();
        broker.set_reachable(false);
        broker
    }

    /// Toggle whether connects succeed.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Fail the next publish with a connection loss.
    pub fn drop_connection_on_next_publish(&self) {
        self.drop_next_publish.store(true, Ordering::SeqCst);
    }

    /// Reject every payload containing `marker`.
    pub fn reject_payloads_containing(&self, marker: &str) {
        *lock(&self.rejected_marker) = Some(marker.to_owned());
    }

    /// Number of connect attempts.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// `(channel, payload)` pairs published so far.
    pub fn published(&self) -> Vec<(String, String)> {
        lock(&self.published).clone()
    }

    /// Values stored so far.
    pub fn stored(&self) -> Vec<StoredEvent> {
        lock(&self.stored).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("broker mutex"),
    }
}

#[async_trait]
impl EventBroker for RecordingEventBroker {
    async fn connect(&self) -> Result<(), EventBrokerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EventBrokerError::connection("connection refused"))
        }
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), EventBrokerError> {
        if self.drop_next_publish.swap(false, Ordering::SeqCst) {
            return Err(EventBrokerError::connection("connection reset by peer"));
        }
        if lock(&self.rejected_marker)
            .as_deref()
            .is_some_and(|marker| payload.contains(marker))
        {
            return Err(EventBrokerError::publish("payload rejected"));
        }
        lock(&self.published).push((channel.to_owned(), payload.to_owned()));
        Ok(())
    }

    async fn store(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), EventBrokerError> {
        lock(&self.stored).push(StoredEvent {
            key: key.to_owned(),
            payload: payload.to_owned(),
            ttl,
        });
        Ok(())
    }
}
