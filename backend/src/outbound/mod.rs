//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **http**: reqwest-backed service transport
//! - **events**: Redis-backed event broker
//! - **persistence**: diesel instrumentation reporting query timings
//!
//! Adapters are thin translators between domain types and infrastructure
//! representations. They contain no business logic.

pub mod events;
pub mod http;
pub mod persistence;
