//! Tests for the fire-and-forget event publisher.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::test_support::clock::MutableClock;
use crate::test_support::events::RecordingEventBroker;
use crate::test_support::logs::capture_logs;

#[fixture]
fn clock() -> MutableClock {
    MutableClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).single().expect("time"))
}

fn publisher(broker: &Arc<RecordingEventBroker>) -> EventPublisher {
    let broker: Arc<dyn EventBroker> = broker.clone();
    EventPublisher::new(broker, PublisherSettings::default())
}

#[rstest]
#[tokio::test]
async fn publish_broadcasts_and_stores_a_copy(clock: MutableClock) {
    let broker = Arc::new(RecordingEventBroker::default());
    let publisher = publisher(&broker);
    let event = DomainEvent::new("user.created", json!({"userId": "u-1"}), &clock);

    publisher.publish(&event).await;

    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, DEFAULT_EVENT_CHANNEL);
    let payload: Value = serde_json::from_str(&published[0].1).expect("json");
    assert_eq!(payload["eventType"], "user.created");
    assert_eq!(payload["data"], json!({"userId": "u-1"}));

    let stored = broker.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].key, event.storage_key());
    assert_eq!(stored[0].payload, published[0].1);
    assert_eq!(stored[0].ttl, Duration::from_secs(86_400));
    assert_eq!(publisher.state(), PublisherState::Ready);
    assert_eq!(broker.connects(), 1);
}

#[rstest]
#[tokio::test]
async fn unreachable_broker_drops_the_event_quietly(clock: MutableClock) {
    let (logs, _guard) = capture_logs();
    let broker = Arc::new(RecordingEventBroker::unreachable());
    let publisher = publisher(&broker);

    publisher
        .publish(&DomainEvent::new("order.created", Value::Null, &clock))
        .await;
    publisher
        .publish(&DomainEvent::new("order.created", Value::Null, &clock))
        .await;

    assert!(broker.published().is_empty());
    assert_eq!(broker.connects(), 2, "one reconnect attempt per publish");
    assert_eq!(publisher.state(), PublisherState::Disconnected);
    assert!(
        logs.records()
            .iter()
            .any(|record| record["message"] == "Event broker connection failed")
    );
}

struct HangingBroker;

#[async_trait]
impl EventBroker for HangingBroker {
    async fn connect(&self) -> Result<(), EventBrokerError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }

    async fn publish(&self, _channel: &str, _payload: &str) -> Result<(), EventBrokerError> {
        Ok(())
    }

    async fn store(&self, _key: &str, _payload: &str, _ttl: Duration) -> Result<(), EventBrokerError> {
        Ok(())
    }
}

#[rstest]
#[tokio::test]
async fn publish_never_waits_longer_than_one_connect_attempt(clock: MutableClock) {
    let settings = PublisherSettings {
        connect_timeout: Duration::from_millis(20),
        ..PublisherSettings::default()
    };
    let publisher = EventPublisher::new(Arc::new(HangingBroker), settings);

    let started = Instant::now();
    publisher
        .publish(&DomainEvent::new("slow.event", Value::Null, &clock))
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(publisher.state(), PublisherState::Disconnected);
}

#[rstest]
#[tokio::test]
async fn concurrent_publishes_share_one_connect_attempt(clock: MutableClock) {
    let (logs, _guard) = capture_logs();
    let connect_timeout = Duration::from_millis(200);
    let settings = PublisherSettings {
        connect_timeout,
        ..PublisherSettings::default()
    };
    let publisher = EventPublisher::new(Arc::new(HangingBroker), settings);
    let events: Vec<_> = (0..3)
        .map(|_| DomainEvent::new("quote.requested", Value::Null, &clock))
        .collect();

    let timed = |event: &DomainEvent| {
        let publisher = &publisher;
        let event = event.clone();
        async move {
            let started = Instant::now();
            publisher.publish(&event).await;
            started.elapsed()
        }
    };
    let (first, second, third) = tokio::join!(timed(&events[0]), timed(&events[1]), timed(&events[2]));

    let bound = connect_timeout + Duration::from_millis(150);
    for elapsed in [first, second, third] {
        assert!(elapsed < bound, "publish took {elapsed:?}");
    }
    assert_eq!(logs.with_message("Event broker connection timed out").len(), 1);
    assert_eq!(logs.with_message("Event broker unavailable, event dropped").len(), 3);
    assert_eq!(publisher.state(), PublisherState::Disconnected);
}

#[rstest]
#[tokio::test]
async fn cancelled_connect_attempts_release_the_connecting_state(clock: MutableClock) {
    let settings = PublisherSettings {
        connect_timeout: Duration::from_secs(10),
        ..PublisherSettings::default()
    };
    let publisher = EventPublisher::new(Arc::new(HangingBroker), settings);
    let event = DomainEvent::new("quote.requested", Value::Null, &clock);

    let cancelled =
        tokio::time::timeout(Duration::from_millis(20), publisher.publish(&event)).await;

    assert!(cancelled.is_err());
    assert_eq!(publisher.state(), PublisherState::Disconnected);
}

#[rstest]
#[tokio::test]
async fn connection_loss_triggers_a_reconnect_on_the_next_publish(clock: MutableClock) {
    let broker = Arc::new(RecordingEventBroker::default());
    let publisher = publisher(&broker);
    assert!(publisher.initialize().await);

    broker.drop_connection_on_next_publish();
    publisher
        .publish(&DomainEvent::new("carrier.updated", Value::Null, &clock))
        .await;
    assert_eq!(publisher.state(), PublisherState::Disconnected);

    publisher
        .publish(&DomainEvent::new("carrier.updated", Value::Null, &clock))
        .await;
    assert_eq!(publisher.state(), PublisherState::Ready);
    assert_eq!(broker.connects(), 2);
    assert_eq!(broker.published().len(), 1);
}

#[rstest]
#[tokio::test]
async fn publish_all_keeps_order_and_survives_failures(clock: MutableClock) {
    let broker = Arc::new(RecordingEventBroker::default());
    broker.reject_payloads_containing("poison");
    let publisher = publisher(&broker);
    let events = vec![
        DomainEvent::new("seller.created", json!({"n": 1}), &clock),
        DomainEvent::new("seller.poison", json!({"n": 2}), &clock),
        DomainEvent::new("seller.updated", json!({"n": 3}), &clock),
    ];

    publisher.publish_all(&events).await;

    let types: Vec<String> = broker
        .published()
        .iter()
        .map(|(_, payload)| {
            let payload: Value = serde_json::from_str(payload).expect("json");
            payload["eventType"].as_str().expect("type").to_owned()
        })
        .collect();
    assert_eq!(types, vec!["seller.created", "seller.updated"]);
    assert_eq!(publisher.state(), PublisherState::Ready);
}
