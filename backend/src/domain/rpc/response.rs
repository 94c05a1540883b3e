//! Uniform envelope returned by every inter-service call.
//!
//! RPC failures are returned as data: callers check [`ServiceResponse::error`]
//! instead of relying on `Err` propagation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message attached to successful calls.
pub const SUCCESS_MESSAGE: &str = "Success";
/// Status reported for local and network failures.
pub const LOCAL_FAILURE_STATUS: u16 = 500;

/// Outcome of one logical call, after retries.
///
/// ## Invariants
/// - Exactly one of `data` and `error` is meaningful.
/// - `status` is the downstream status, or 500 for local and network failures.
///
/// # Examples
/// ```
/// use backend_core::domain::rpc::ServiceResponse;
///
/// let failed: ServiceResponse<()> = ServiceResponse::failure(404, "user not found");
/// assert!(!failed.is_success());
/// assert_eq!(failed.error.as_deref(), Some("user not found"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse<T> {
    /// Payload of a successful call.
    pub data: Option<T>,
    /// HTTP-equivalent status of the outcome.
    pub status: u16,
    /// Human-readable outcome on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ServiceResponse<T> {
    /// Successful outcome.
    pub fn success(data: T, status: u16) -> Self {
        Self {
            data: Some(data),
            status,
            message: Some(SUCCESS_MESSAGE.to_owned()),
            error: None,
        }
    }

    /// Failed outcome.
    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            data: None,
            status,
            message: None,
            error: Some(error.into()),
        }
    }

    /// Whether the call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a `Result`, keeping the status alongside the error.
    ///
    /// # Errors
    ///
    /// Returns `(status, error)` for failed calls.
    pub fn into_result(self) -> Result<Option<T>, (u16, String)> {
        match self.error {
            None => Ok(self.data),
            Some(error) => Err((self.status, error)),
        }
    }
}

impl ServiceResponse<Value> {
    /// Decode the raw JSON payload into a typed value.
    ///
    /// A payload that does not match `T` turns the envelope into a local
    /// failure with status 500.
    pub fn decode<T: DeserializeOwned>(self) -> ServiceResponse<T> {
        let Self {
            data,
            status,
            message,
            error,
        } = self;
        if error.is_some() {
            return ServiceResponse {
                data: None,
                status,
                message,
                error,
            };
        }
        match data.map(serde_json::from_value::<T>).transpose() {
            Ok(data) => ServiceResponse {
                data,
                status,
                message,
                error: None,
            },
            Err(err) => ServiceResponse::failure(
                LOCAL_FAILURE_STATUS,
                format!("response payload did not match the expected shape: {err}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Carrier {
        id: String,
        name: String,
    }

    #[test]
    fn success_serialises_message_and_omits_error() {
        let response = ServiceResponse::success(json!({"id": 1}), 200);
        assert_eq!(
            serde_json::to_value(&response).expect("serialise"),
            json!({"data": {"id": 1}, "status": 200, "message": "Success"})
        );
    }

    #[test]
    fn failure_serialises_null_data() {
        let response: ServiceResponse<Value> = ServiceResponse::failure(503, "down");
        assert_eq!(
            serde_json::to_value(&response).expect("serialise"),
            json!({"data": null, "status": 503, "error": "down"})
        );
    }

    #[test]
    fn decode_maps_matching_payloads() {
        let response = ServiceResponse::success(json!({"id": "c-1", "name": "Swift"}), 200);
        let decoded = response.decode::<Carrier>();
        assert_eq!(
            decoded.data,
            Some(Carrier {
                id: "c-1".to_owned(),
                name: "Swift".to_owned()
            })
        );
        assert_eq!(decoded.status, 200);
    }

    #[test]
    fn decode_reports_shape_mismatches_as_local_failures() {
        let decoded = ServiceResponse::success(json!({"id": 5}), 200).decode::<Carrier>();
        assert_eq!(decoded.status, LOCAL_FAILURE_STATUS);
        assert!(decoded.data.is_none());
        assert!(decoded.error.is_some());
    }

    #[test]
    fn decode_keeps_failures_untouched() {
        let response: ServiceResponse<Value> = ServiceResponse::failure(404, "missing");
        let decoded = response.decode::<Carrier>();
        assert_eq!(decoded.into_result(), Err((404, "missing".to_owned())));
    }
}
