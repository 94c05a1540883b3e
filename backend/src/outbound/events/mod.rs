//! Event broker adapters.

mod redis_broker;

pub use redis_broker::RedisEventBroker;
