//! Structured logging pipeline.
//!
//! Public surface:
//! - [`init_logging`] installs the JSON formatter as the global subscriber.
//! - [`Logger`] is the handle services log through.
//! - [`QueryObserver`] feeds data-access lifecycle hooks into the logger.

mod format;
mod logger;
mod query;

pub use format::CorrelationJsonFormat;
pub use logger::{LogLevel, Logger, SLOW_QUERY_THRESHOLD_MS};
pub use query::QueryObserver;

use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install the JSON line subscriber writing to stdout.
///
/// # Errors
///
/// Returns an error when a global subscriber is already installed.
pub fn init_logging(
    service: &str,
    environment: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(CorrelationJsonFormat::new(service, environment))
        .try_init()
}
