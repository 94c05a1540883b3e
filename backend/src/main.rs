//! Service entry-point: loads settings, installs JSON logging and serves the
//! health endpoints behind the request observability middleware. The
//! retrying executor and the event publisher are shared with every worker.

use std::sync::Arc;

use actix_web::web;
use ortho_config::OrthoConfig;
use serde_json::json;

use backend_core::config::PlatformSettings;
use backend_core::domain::events::EventPublisher;
use backend_core::domain::rpc::{DomainFacade, RetryingRequestExecutor};
use backend_core::inbound::http::health::HealthState;
use backend_core::logging::{Logger, init_logging};
use backend_core::outbound::events::RedisEventBroker;
use backend_core::outbound::http::ReqwestServiceTransport;
use backend_core::server::{ServerConfig, create_server};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = PlatformSettings::load_from_iter(std::env::args_os())
        .map_err(|e| std::io::Error::other(format!("failed to load settings: {e}")))?;

    if let Err(e) = init_logging(settings.service_name(), settings.environment()) {
        tracing::warn!(error = %e, "tracing init failed");
    }
    let logger = Logger::new("Bootstrap");

    let registry = settings
        .service_registry()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    if let Err(e) = registry.ensure_registered(&DomainFacade::REQUIRED_SERVICES) {
        logger.warn(
            "Some downstream services are not configured",
            Some(json!({ "error": e.to_string() })),
        );
    }
    let transport = ReqwestServiceTransport::new()
        .map_err(|e| std::io::Error::other(format!("failed to build HTTP client: {e}")))?;
    let executor = Arc::new(
        RetryingRequestExecutor::new(Arc::new(registry), Arc::new(transport))
            .with_auth_token(settings.internal_auth_token().map(str::to_owned)),
    );

    let publisher_settings = settings.publisher_settings();
    let broker = RedisEventBroker::new(settings.redis_url(), publisher_settings.connect_timeout);
    let publisher = Arc::new(EventPublisher::new(Arc::new(broker), publisher_settings));
    if !publisher.initialize().await {
        logger.warn("Event broker unavailable at startup; publishing will retry lazily", None);
    }

    let bind_addr = settings
        .bind_addr()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let health_state = web::Data::new(HealthState::new());
    let server = create_server(
        health_state,
        executor,
        publisher,
        ServerConfig::new(bind_addr),
    )?;
    logger.log(
        "Server listening",
        Some(json!({ "bindAddr": bind_addr.to_string() })),
    );
    server.await
}
