//! Domain events and their fire-and-forget publication.

mod event;
mod publisher;

pub use event::{DomainEvent, EVENT_KEY_PREFIX};
pub use publisher::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVENT_CHANNEL, EVENT_RETENTION, EventPublisher,
    PublisherSettings, PublisherState,
};
