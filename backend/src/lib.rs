//! Cross-service observability and resilience core.
//!
//! - [`domain`]: correlation scope, errors, RPC policies and domain events.
//! - [`logging`]: JSON log formatter and the structured logger.
//! - [`middleware`]: actix request observability.
//! - [`outbound`]: reqwest, Redis and diesel adapters.
//! - [`server`]: HTTP server wiring used by `main`.

pub mod config;
pub mod domain;
pub mod inbound;
pub mod logging;
pub mod middleware;
pub mod outbound;
pub mod server;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use middleware::RequestObservability;
