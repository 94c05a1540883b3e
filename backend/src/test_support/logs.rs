//! Capture JSON log records emitted on the current thread.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::logging::CorrelationJsonFormat;

/// Service name stamped on captured records.
pub const CAPTURE_SERVICE: &str = "test-service";
/// Environment stamped on captured records.
pub const CAPTURE_ENVIRONMENT: &str = "test";

/// Shared buffer the capturing subscriber writes into.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn buffer(&self) -> MutexGuard<'_, Vec<u8>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("log buffer mutex"),
        }
    }

    /// Every record captured so far, parsed.
    pub fn records(&self) -> Vec<Value> {
        let bytes = self.buffer().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| match serde_json::from_str(line) {
                Ok(value) => value,
                Err(err) => panic!("log line is not JSON ({err}): {line}"),
            })
            .collect()
    }

    /// The only captured record.
    pub fn single(&self) -> Value {
        let mut records = self.records();
        assert_eq!(records.len(), 1, "expected one record, got {records:?}");
        records.remove(0)
    }

    /// Records whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|record| record["message"] == message)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route every event on this thread into an in-memory buffer until the
/// returned guard drops.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .event_format(CorrelationJsonFormat::new(CAPTURE_SERVICE, CAPTURE_ENVIRONMENT))
        .with_writer(logs.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
