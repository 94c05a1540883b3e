//! Immutable registry of downstream service configurations.

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

/// Downstream services reachable through the RPC client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceName {
    /// Authentication service.
    Auth,
    /// User accounts.
    User,
    /// Customers.
    Customer,
    /// Carriers.
    Carrier,
    /// Pricing and quotes.
    Pricing,
    /// Sellers.
    Seller,
    /// Translation keys.
    Translation,
}

impl ServiceName {
    /// Every service the facade talks to.
    pub const ALL: [Self; 7] = [
        Self::Auth,
        Self::User,
        Self::Customer,
        Self::Carrier,
        Self::Pricing,
        Self::Seller,
        Self::Translation,
    ];

    /// Stable name used in logs and health reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::User => "user",
            Self::Customer => "customer",
            Self::Carrier => "carrier",
            Self::Pricing => "pricing",
            Self::Seller => "seller",
            Self::Translation => "translation",
        }
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBackoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles after every retry, capped at `max`.
    Exponential {
        /// Upper bound for one delay.
        max: Duration,
    },
}

/// Connection settings for one downstream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Base URL every path is resolved against.
    pub base_url: Url,
    /// Timeout for one attempt.
    pub timeout: Duration,
    /// Retry budget: additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay before a retry.
    pub retry_delay: Duration,
    /// Delay growth strategy.
    pub backoff: RetryBackoff,
}

impl ServiceConfig {
    /// Default per-attempt timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);
    /// Default retry budget.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    /// Default delay between attempts.
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);

    /// Configuration with the default timeout and retry budget.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Self::DEFAULT_TIMEOUT,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            backoff: RetryBackoff::Fixed,
        }
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the retry budget and delay.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Switch the delay strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to wait after `attempt` failed attempts.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            RetryBackoff::Fixed => self.retry_delay,
            RetryBackoff::Exponential { max } => {
                let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
                self.retry_delay.saturating_mul(factor).min(max)
            }
        }
    }

    /// Resolve `path` against the base URL, keeping any base path prefix.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] when `path` cannot form a valid URL.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
    }
}

/// Registration problems detected at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A service the caller relies on has no configuration.
    #[error("downstream services not configured: {}", join_names(.0))]
    MissingServices(Vec<ServiceName>),
}

fn join_names(names: &[ServiceName]) -> String {
    names
        .iter()
        .map(|name| name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One configuration per downstream service; immutable once built.
///
/// # Examples
/// ```
/// use backend_core::domain::rpc::{ServiceConfig, ServiceName, ServiceRegistry};
/// use url::Url;
///
/// let registry = ServiceRegistry::builder()
///     .register(
///         ServiceName::User,
///         ServiceConfig::new(Url::parse("http://users:3001").expect("url")),
///     )
///     .build();
/// assert!(registry.get(ServiceName::User).is_some());
/// assert!(registry.ensure_registered(&[ServiceName::Carrier]).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<ServiceName, ServiceConfig>,
}

impl ServiceRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::default()
    }

    /// Configuration of `service`, if registered.
    #[must_use]
    pub fn get(&self, service: ServiceName) -> Option<&ServiceConfig> {
        self.services.get(&service)
    }

    /// Registered services in stable order.
    pub fn services(&self) -> impl Iterator<Item = (ServiceName, &ServiceConfig)> {
        self.services.iter().map(|(name, config)| (*name, config))
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Check that every service in `required` has a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingServices`] listing the gaps.
    pub fn ensure_registered(&self, required: &[ServiceName]) -> Result<(), RegistryError> {
        let missing: Vec<_> = required
            .iter()
            .copied()
            .filter(|name| !self.services.contains_key(name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::MissingServices(missing))
        }
    }
}

/// Builder for [`ServiceRegistry`].
#[derive(Debug, Default)]
pub struct ServiceRegistryBuilder {
    services: BTreeMap<ServiceName, ServiceConfig>,
}

impl ServiceRegistryBuilder {
    /// Register `service`; a later registration of the same name replaces it.
    #[must_use]
    pub fn register(mut self, service: ServiceName, config: ServiceConfig) -> Self {
        self.services.insert(service, config);
        self
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> ServiceRegistry {
        ServiceRegistry {
            services: self.services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> ServiceConfig {
        ServiceConfig::new(Url::parse("http://pricing.internal:3005/api/").expect("url"))
    }

    #[rstest]
    #[case::leading_slash("/quotes/7")]
    #[case::bare("quotes/7")]
    fn resolve_keeps_the_base_path(config: ServiceConfig, #[case] path: &str) {
        let url = config.resolve(path).expect("resolves");
        assert_eq!(url.as_str(), "http://pricing.internal:3005/api/quotes/7");
    }

    #[rstest]
    fn fixed_backoff_never_grows(config: ServiceConfig) {
        let config = config.with_retries(3, Duration::from_millis(10));
        assert_eq!(config.delay_after(1), Duration::from_millis(10));
        assert_eq!(config.delay_after(3), Duration::from_millis(10));
    }

    #[rstest]
    fn exponential_backoff_doubles_up_to_the_cap(config: ServiceConfig) {
        let config = config
            .with_retries(5, Duration::from_millis(100))
            .with_backoff(RetryBackoff::Exponential {
                max: Duration::from_millis(350),
            });
        assert_eq!(config.delay_after(1), Duration::from_millis(100));
        assert_eq!(config.delay_after(2), Duration::from_millis(200));
        assert_eq!(config.delay_after(3), Duration::from_millis(350));
    }

    #[rstest]
    fn ensure_registered_lists_every_gap(config: ServiceConfig) {
        let registry = ServiceRegistry::builder()
            .register(ServiceName::Pricing, config)
            .build();
        let err = registry
            .ensure_registered(&ServiceName::ALL)
            .expect_err("most services are missing");
        let RegistryError::MissingServices(missing) = &err;
        assert_eq!(missing.len(), ServiceName::ALL.len() - 1);
        assert!(!missing.contains(&ServiceName::Pricing));
        assert!(err.to_string().starts_with("downstream services not configured: auth, user"));
    }
}
