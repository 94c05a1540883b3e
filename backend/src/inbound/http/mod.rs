//! HTTP inbound adapter exposing the service's own endpoints.

mod error;
pub mod health;
