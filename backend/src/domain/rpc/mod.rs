//! Resilient inter-service RPC: registry, retrying executor, health probing
//! and the per-resource facade.

mod executor;
mod facade;
mod health;
mod registry;
mod response;

pub use executor::{RetryingRequestExecutor, RetrySleeper, RpcCall, TokioSleeper};
pub use facade::DomainFacade;
pub use health::HEALTH_PATH;
pub use registry::{
    RegistryError, RetryBackoff, ServiceConfig, ServiceName, ServiceRegistry,
    ServiceRegistryBuilder,
};
pub use response::{LOCAL_FAILURE_STATUS, SUCCESS_MESSAGE, ServiceResponse};
