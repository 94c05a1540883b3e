//! Diesel instrumentation feeding query timings into the query observer.
//!
//! Install on a connection with `connection.set_instrumentation(..)`. Every
//! finished query is logged with its SQL and duration; slow and failed
//! queries escalate to `warn` and `error`.

use std::time::Instant;

use diesel::connection::{Instrumentation, InstrumentationEvent};

use crate::logging::QueryObserver;

/// Per-connection query timer.
#[derive(Debug, Default)]
pub struct QueryLogInstrumentation {
    observer: QueryObserver,
    started: Vec<Instant>,
}

impl QueryLogInstrumentation {
    /// Instrumentation reporting through `observer`.
    #[must_use]
    pub fn new(observer: QueryObserver) -> Self {
        Self {
            observer,
            started: Vec::new(),
        }
    }

    fn query_started(&mut self) {
        self.started.push(Instant::now());
    }

    fn query_finished(&mut self, query: &str, error: Option<&diesel::result::Error>) {
        let elapsed = self
            .started
            .pop()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.observer.query_finished(
            query,
            elapsed,
            error.map(|err| err as &(dyn std::error::Error + 'static)),
        );
    }
}

impl Instrumentation for QueryLogInstrumentation {
    fn on_connection_event(&mut self, event: InstrumentationEvent<'_>) {
        match event {
            InstrumentationEvent::StartQuery { .. } => self.query_started(),
            InstrumentationEvent::FinishQuery { query, error, .. } => {
                self.query_finished(&query.to_string(), error);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::logs::capture_logs;

    #[test]
    fn finished_queries_are_logged_with_their_sql() {
        let (logs, _guard) = capture_logs();
        let mut instrumentation = QueryLogInstrumentation::default();

        instrumentation.query_started();
        instrumentation.query_finished("SELECT * FROM carriers", None);

        let record = logs.single();
        assert_eq!(record["level"], "debug");
        assert_eq!(record["query"], "SELECT * FROM carriers");
        assert_eq!(record["context"], "Database");
    }

    #[test]
    fn failed_queries_are_errors() {
        let (logs, _guard) = capture_logs();
        let mut instrumentation = QueryLogInstrumentation::default();

        instrumentation.query_started();
        instrumentation.query_finished(
            "SELECT * FROM sellers WHERE id = $1",
            Some(&diesel::result::Error::NotFound),
        );

        let record = logs.single();
        assert_eq!(record["level"], "error");
        assert_eq!(record["message"], "Database query failed");
        assert_eq!(record["error"], "Record not found");
    }

    #[test]
    fn unmatched_finish_reports_zero_duration() {
        let (logs, _guard) = capture_logs();
        let mut instrumentation = QueryLogInstrumentation::default();

        instrumentation.query_finished("COMMIT", None);

        assert_eq!(logs.single()["duration"], 0);
    }
}
