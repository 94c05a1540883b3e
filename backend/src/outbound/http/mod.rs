//! HTTP adapters for inter-service calls.

mod reqwest_transport;

pub use reqwest_transport::ReqwestServiceTransport;
