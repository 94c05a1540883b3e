//! Domain primitives, policies and driven ports.
//!
//! Purpose: hold everything that does not depend on a concrete transport or
//! broker. Adapters live under `outbound`; the actix boundary lives under
//! `middleware`.
//!
//! Public surface:
//! - CorrelationId / CorrelationScope / ScopeValues: per-request context.
//! - Error / ErrorCode: error payload returned by the service's own endpoints.
//! - rpc: registry, retrying executor, health aggregator and facade.
//! - events: domain events and the publisher.

pub mod correlation;
pub mod error;
pub mod events;
pub mod ports;
pub mod rpc;

pub use self::correlation::{
    CORRELATION_ID_HEADER, CORRELATION_ID_KEY, CorrelationId, CorrelationIdError,
    CorrelationScope, REQUEST_PATH_KEY, ScopeValues, USER_ID_KEY,
};
pub use self::error::{Error, ErrorCode};

/// Result alias for the service's own endpoints.
///
/// # Examples
/// ```
/// use actix_web::HttpResponse;
/// use backend_core::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<HttpResponse> {
///     Err(Error::forbidden("nope"))
/// }
/// ```
pub type ApiResult<T> = Result<T, Error>;
