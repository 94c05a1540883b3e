//! Concurrent health probing of every registered downstream service.

use std::collections::BTreeMap;

use futures_util::future::join_all;

use super::executor::{RetryingRequestExecutor, RpcCall};
use super::registry::{ServiceConfig, ServiceName};
use crate::domain::ports::RpcMethod;

/// Path checked on every downstream service.
pub const HEALTH_PATH: &str = "/health";

impl RetryingRequestExecutor {
    /// Check every registered service once, concurrently.
    ///
    /// Each check is a single `GET /health` bounded by the service timeout;
    /// retries are never applied. A service is healthy only when it answers
    /// with a 2xx status. The map always contains one entry per registered
    /// service.
    pub async fn check_services(&self) -> BTreeMap<String, bool> {
        let checks = self
            .registry()
            .services()
            .map(|(name, config)| self.check_one(name, config));
        join_all(checks).await.into_iter().collect()
    }

    async fn check_one(&self, name: ServiceName, config: &ServiceConfig) -> (String, bool) {
        let call = RpcCall::new(name, RpcMethod::Get, HEALTH_PATH);
        let healthy = match self.build_request(config, &call) {
            Ok(request) => self.transport().send(request).await.is_ok(),
            Err(_) => false,
        };
        (name.as_str().to_owned(), healthy)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Value;
    use url::Url;

    use super::*;
    use crate::domain::ports::{MockServiceTransport, TransportError, TransportResponse};
    use crate::domain::rpc::ServiceRegistry;

    fn config(host: &str) -> ServiceConfig {
        ServiceConfig::new(Url::parse(&format!("http://{host}")).expect("url"))
            .with_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn every_registered_service_is_checked_exactly_once() {
        let registry = ServiceRegistry::builder()
            .register(ServiceName::User, config("users"))
            .register(ServiceName::Customer, config("customers"))
            .register(ServiceName::Carrier, config("carriers"))
            .register(ServiceName::Pricing, config("pricing"))
            .build();
        let mut transport = MockServiceTransport::new();
        transport
            .expect_send()
            .withf(|request| {
                request.url.path() == HEALTH_PATH
                    && request.method == RpcMethod::Get
                    && request.timeout == Duration::from_millis(50)
            })
            .times(4)
            .returning(|request| match request.url.host_str() {
                Some("carriers") => Err(TransportError::timeout("50ms elapsed")),
                Some("pricing") => Err(TransportError::status(503_u16, "draining")),
                _ => Ok(TransportResponse {
                    status: 200,
                    body: Value::Null,
                }),
            });
        let executor = RetryingRequestExecutor::new(Arc::new(registry), Arc::new(transport));

        let health = executor.check_services().await;

        let expected: BTreeMap<String, bool> = [
            ("carrier", false),
            ("customer", true),
            ("pricing", false),
            ("user", true),
        ]
        .into_iter()
        .map(|(name, healthy)| (name.to_owned(), healthy))
        .collect();
        assert_eq!(health, expected);
    }

    #[tokio::test]
    async fn empty_registry_reports_an_empty_map() {
        let mut transport = MockServiceTransport::new();
        transport.expect_send().never();
        let executor =
            RetryingRequestExecutor::new(Arc::new(ServiceRegistry::default()), Arc::new(transport));

        assert!(executor.check_services().await.is_empty());
    }
}
