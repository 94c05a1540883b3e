//! Redis-backed event broker.
//!
//! Publishes on a pub/sub channel and keeps expiring copies with `SET .. EX`.
//! Connections come from a `bb8` pool that is rebuilt on every `connect`.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::bb8::{Pool, RunError};
use bb8_redis::redis::{self, RedisError};
use bb8_redis::RedisConnectionManager;
use tokio::sync::RwLock;

use crate::domain::ports::{EventBroker, EventBrokerError};

const DEFAULT_POOL_SIZE: u32 = 4;

type RedisPool = Pool<RedisConnectionManager>;

/// Event broker talking to Redis.
pub struct RedisEventBroker {
    url: String,
    connect_timeout: Duration,
    pool: RwLock<Option<RedisPool>>,
}

impl RedisEventBroker {
    /// Broker for `url`; no connection is made until [`EventBroker::connect`].
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            pool: RwLock::new(None),
        }
    }

    async fn pool(&self) -> Result<RedisPool, EventBrokerError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| EventBrokerError::connection("not connected"))
    }
}

#[async_trait]
impl EventBroker for RedisEventBroker {
    async fn connect(&self) -> Result<(), EventBrokerError> {
        let manager = RedisConnectionManager::new(self.url.as_str())
            .map_err(|err| EventBrokerError::connection(err.to_string()))?;
        let pool = Pool::builder()
            .max_size(DEFAULT_POOL_SIZE)
            .connection_timeout(self.connect_timeout)
            .build(manager)
            .await
            .map_err(|err| EventBrokerError::connection(err.to_string()))?;
        {
            let mut conn = pool.get().await.map_err(map_pool_error)?;
            let _: () = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(|err| EventBrokerError::connection(err.to_string()))?;
        }
        *self.pool.write().await = Some(pool);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), EventBrokerError> {
        let pool = self.pool().await?;
        let mut conn = pool.get().await.map_err(map_pool_error)?;
        let _receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut *conn)
            .await
            .map_err(|err| classify(err, EventBrokerError::publish))?;
        Ok(())
    }

    async fn store(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), EventBrokerError> {
        let pool = self.pool().await?;
        let mut conn = pool.get().await.map_err(map_pool_error)?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut *conn)
            .await
            .map_err(|err| classify(err, EventBrokerError::store))?;
        Ok(())
    }
}

fn map_pool_error(err: RunError<RedisError>) -> EventBrokerError {
    EventBrokerError::connection(err.to_string())
}

fn is_connection_failure(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

fn classify(err: RedisError, otherwise: fn(String) -> EventBrokerError) -> EventBrokerError {
    if is_connection_failure(&err) {
        EventBrokerError::connection(err.to_string())
    } else {
        otherwise(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn commands_before_connect_report_a_connection_loss() {
        let broker = RedisEventBroker::new("redis://127.0.0.1:6379", Duration::from_millis(100));
        let err = broker
            .publish("domain-events", "{}")
            .await
            .expect_err("not connected");
        assert!(err.is_connection_loss());
    }

    #[rstest]
    #[case::malformed_url("not a redis url")]
    #[case::closed_port("redis://127.0.0.1:1")]
    #[tokio::test]
    async fn connect_failures_are_connection_errors(#[case] url: &str) {
        let broker = RedisEventBroker::new(url, Duration::from_millis(200));
        let err = broker.connect().await.expect_err("unreachable");
        assert!(err.is_connection_loss(), "{err}");
    }

    #[test]
    fn protocol_errors_keep_the_command_category() {
        let err = RedisError::from((redis::ErrorKind::UnexpectedReturnType, "unexpected reply"));
        let mapped = classify(err, EventBrokerError::publish);
        assert!(matches!(mapped, EventBrokerError::Publish { .. }));
    }
}
