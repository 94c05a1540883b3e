//! Driven ports the domain calls out through.

mod event_broker;
mod macros;
mod service_transport;

pub(crate) use macros::define_port_error;

#[cfg(test)]
pub use event_broker::MockEventBroker;
pub use event_broker::{EventBroker, EventBrokerError};
#[cfg(test)]
pub use service_transport::MockServiceTransport;
pub use service_transport::{
    OutboundRequest, RpcMethod, ServiceTransport, TransportError, TransportResponse,
};
