//! Server construction and middleware wiring.

mod config;

pub use config::ServerConfig;

use std::sync::Arc;
use std::time::Duration;

use actix_web::body::{BoxBody, EitherBody};
use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};

use crate::domain::events::EventPublisher;
use crate::domain::rpc::RetryingRequestExecutor;
use crate::inbound::http::health::{HealthState, live, ready, services};
use crate::middleware::RequestObservability;

/// Shared state handed to every worker.
#[derive(Clone)]
pub struct AppDependencies {
    /// Liveness and readiness flags.
    pub health_state: web::Data<HealthState>,
    /// Executor used by the downstream health report.
    pub executor: web::Data<RetryingRequestExecutor>,
    /// Domain event publisher available to handlers.
    pub publisher: web::Data<EventPublisher>,
    /// Slow response threshold of the request middleware.
    pub slow_response_threshold: Duration,
}

/// Assemble the application: health endpoints behind the request middleware.
pub fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<EitherBody<BoxBody>>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        executor,
        publisher,
        slow_response_threshold,
    } = deps;

    App::new()
        .app_data(health_state)
        .app_data(executor)
        .app_data(publisher)
        .wrap(RequestObservability::default().with_slow_threshold(slow_response_threshold))
        .service(ready)
        .service(live)
        .service(services)
}

/// Construct an Actix HTTP server sharing the executor and event publisher
/// across workers.
///
/// # Returns
/// A spawned [`Server`] that must be awaited to drive the listener.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    executor: Arc<RetryingRequestExecutor>,
    publisher: Arc<EventPublisher>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let server_health_state = health_state.clone();
    let executor = web::Data::from(executor);
    let publisher = web::Data::from(publisher);
    let ServerConfig {
        bind_addr,
        slow_response_threshold,
    } = config;

    let server = HttpServer::new(move || {
        build_app(AppDependencies {
            health_state: server_health_state.clone(),
            executor: executor.clone(),
            publisher: publisher.clone(),
            slow_response_threshold,
        })
    })
    .bind(bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(server)
}
