//! Process configuration loaded via OrthoConfig.
//!
//! Every value is optional in the environment; accessors apply the defaults.

use std::net::SocketAddr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::events::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVENT_CHANNEL, PublisherSettings};
use crate::domain::rpc::{ServiceConfig, ServiceName, ServiceRegistry};

const DEFAULT_SERVICE_NAME: &str = "backend-core";
const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Problems turning raw settings into runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The bind address is not `host:port`.
    #[error("invalid bind address {value:?}: {source}")]
    InvalidBindAddr {
        /// Raw value.
        value: String,
        /// Parser failure.
        source: std::net::AddrParseError,
    },
    /// A downstream base URL does not parse.
    #[error("invalid base URL for service {service}: {value:?}: {source}")]
    InvalidServiceUrl {
        /// Service the URL belongs to.
        service: ServiceName,
        /// Raw value.
        value: String,
        /// Parser failure.
        source: url::ParseError,
    },
}

/// Configuration values for one service process.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PLATFORM")]
pub struct PlatformSettings {
    /// Name stamped on every log record.
    pub service_name: Option<String>,
    /// Deployment environment stamped on every log record.
    pub environment: Option<String>,
    /// Socket address the HTTP server binds to.
    pub bind_addr: Option<String>,
    /// Base URL of the auth service.
    pub auth_url: Option<String>,
    /// Base URL of the user service.
    pub user_url: Option<String>,
    /// Base URL of the customer service.
    pub customer_url: Option<String>,
    /// Base URL of the carrier service.
    pub carrier_url: Option<String>,
    /// Base URL of the pricing service.
    pub pricing_url: Option<String>,
    /// Base URL of the seller service.
    pub seller_url: Option<String>,
    /// Base URL of the translation service.
    pub translation_url: Option<String>,
    /// Per-attempt timeout for downstream calls, in milliseconds.
    pub service_timeout_ms: Option<u64>,
    /// Retry budget for downstream calls.
    pub service_max_retries: Option<u32>,
    /// Delay between downstream attempts, in milliseconds.
    pub service_retry_delay_ms: Option<u64>,
    /// Bearer token attached to every downstream call.
    pub internal_auth_token: Option<String>,
    /// Redis connection URL for domain events.
    pub redis_url: Option<String>,
    /// Pub/sub channel for domain events.
    pub event_channel: Option<String>,
    /// Bound on one broker connect attempt, in milliseconds.
    pub redis_connect_timeout_ms: Option<u64>,
}

impl PlatformSettings {
    /// Service name, defaulting to `backend-core`.
    pub fn service_name(&self) -> &str {
        self.service_name.as_deref().unwrap_or(DEFAULT_SERVICE_NAME)
    }

    /// Environment, defaulting to `development`.
    pub fn environment(&self) -> &str {
        self.environment.as_deref().unwrap_or(DEFAULT_ENVIRONMENT)
    }

    /// Parsed bind address, defaulting to `0.0.0.0:8080`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidBindAddr`] for malformed values.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let raw = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        raw.parse().map_err(|source| SettingsError::InvalidBindAddr {
            value: raw.to_owned(),
            source,
        })
    }

    /// Configured base URL of `service`, if any.
    pub fn service_url(&self, service: ServiceName) -> Option<&str> {
        let url = match service {
            ServiceName::Auth => &self.auth_url,
            ServiceName::User => &self.user_url,
            ServiceName::Customer => &self.customer_url,
            ServiceName::Carrier => &self.carrier_url,
            ServiceName::Pricing => &self.pricing_url,
            ServiceName::Seller => &self.seller_url,
            ServiceName::Translation => &self.translation_url,
        };
        url.as_deref().filter(|value| !value.trim().is_empty())
    }

    /// Per-attempt timeout, defaulting to 5000 ms.
    pub fn service_timeout(&self) -> Duration {
        self.service_timeout_ms
            .map_or(ServiceConfig::DEFAULT_TIMEOUT, Duration::from_millis)
    }

    /// Retry budget, defaulting to 3.
    pub fn service_max_retries(&self) -> u32 {
        self.service_max_retries
            .unwrap_or(ServiceConfig::DEFAULT_MAX_RETRIES)
    }

    /// Delay between attempts, defaulting to 1000 ms.
    pub fn service_retry_delay(&self) -> Duration {
        self.service_retry_delay_ms
            .map_or(ServiceConfig::DEFAULT_RETRY_DELAY, Duration::from_millis)
    }

    /// Internal bearer token, if configured.
    pub fn internal_auth_token(&self) -> Option<&str> {
        self.internal_auth_token
            .as_deref()
            .filter(|value| !value.trim().is_empty())
    }

    /// Redis URL, defaulting to a local instance.
    pub fn redis_url(&self) -> &str {
        self.redis_url.as_deref().unwrap_or(DEFAULT_REDIS_URL)
    }

    /// Publisher settings for domain events.
    pub fn publisher_settings(&self) -> PublisherSettings {
        PublisherSettings {
            channel: self
                .event_channel
                .clone()
                .unwrap_or_else(|| DEFAULT_EVENT_CHANNEL.to_owned()),
            connect_timeout: self
                .redis_connect_timeout_ms
                .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_millis),
            ..PublisherSettings::default()
        }
    }

    /// Registry holding every service that has a base URL configured.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidServiceUrl`] for the first URL that
    /// does not parse.
    pub fn service_registry(&self) -> Result<ServiceRegistry, SettingsError> {
        let mut builder = ServiceRegistry::builder();
        for service in ServiceName::ALL {
            let Some(raw) = self.service_url(service) else {
                continue;
            };
            let base_url = Url::parse(raw).map_err(|source| SettingsError::InvalidServiceUrl {
                service,
                value: raw.to_owned(),
                source,
            })?;
            let config = ServiceConfig::new(base_url)
                .with_timeout(self.service_timeout())
                .with_retries(self.service_max_retries(), self.service_retry_delay());
            builder = builder.register(service, config);
        }
        Ok(builder.build())
    }
}
