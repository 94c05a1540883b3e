//! Persistence-side observability.

mod query_instrumentation;

pub use query_instrumentation::QueryLogInstrumentation;
