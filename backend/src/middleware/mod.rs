//! Request middleware.
//!
//! Purpose: request lifecycle concerns at the actix boundary: correlation
//! scope, request logging and body redaction.

pub mod observability;
pub mod redaction;

pub use observability::{AuthenticatedUser, RequestObservability, SLOW_RESPONSE_THRESHOLD};
pub use redaction::{REDACTED_MARKER, SENSITIVE_FIELDS, redact_body};
