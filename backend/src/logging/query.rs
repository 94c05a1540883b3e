//! Query lifecycle observer.
//!
//! Data-access adapters report each query through [`QueryObserver`], which
//! turns the lifecycle hooks into structured log records.

use std::time::Duration;

use serde_json::json;

use super::logger::{Logger, SLOW_QUERY_THRESHOLD_MS};

/// Bridges query lifecycle hooks (success, slow, error) into the logger.
#[derive(Debug, Clone)]
pub struct QueryObserver {
    logger: Logger,
    slow_threshold: Duration,
}

impl Default for QueryObserver {
    fn default() -> Self {
        Self::new(Logger::new("Database"))
    }
}

impl QueryObserver {
    /// Observer using the standard slow-query threshold.
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            slow_threshold: Duration::from_millis(SLOW_QUERY_THRESHOLD_MS),
        }
    }

    /// Threshold above which a successful query counts as slow.
    #[must_use]
    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Dispatch a finished query to the matching hook.
    pub fn query_finished(
        &self,
        query: &str,
        elapsed: Duration,
        error: Option<&(dyn std::error::Error + 'static)>,
    ) {
        match error {
            Some(error) => self.query_failed(query, elapsed, error),
            None if elapsed > self.slow_threshold => self.query_slow(query, elapsed),
            None => self.query_succeeded(query, elapsed),
        }
    }

    /// Hook for a query that completed normally.
    pub fn query_succeeded(&self, query: &str, elapsed: Duration) {
        self.logger.log_query(query, millis(elapsed), None);
    }

    /// Hook for a query that completed above the slow threshold.
    pub fn query_slow(&self, query: &str, elapsed: Duration) {
        self.logger.warn(
            "Slow query detected",
            Some(json!({ "query": query, "duration": millis(elapsed) })),
        );
    }

    /// Hook for a query that failed.
    pub fn query_failed(
        &self,
        query: &str,
        elapsed: Duration,
        error: &(dyn std::error::Error + 'static),
    ) {
        self.logger.log_query(query, millis(elapsed), Some(error));
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
