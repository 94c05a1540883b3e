//! Redaction of sensitive request body fields before they reach the logs.

use serde_json::Value;

/// Replacement written over sensitive values.
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Top-level body fields that are never logged verbatim.
pub const SENSITIVE_FIELDS: [&str; 6] = [
    "password",
    "token",
    "secret",
    "apiKey",
    "accessToken",
    "refreshToken",
];

/// Copy of `body` with every sensitive top-level field masked.
///
/// Only the top level of a JSON object is inspected; nested objects and
/// non-object bodies are returned unchanged.
///
/// # Examples
/// ```
/// use backend_core::middleware::redact_body;
/// use serde_json::json;
///
/// let redacted = redact_body(&json!({"email": "a@b.c", "password": "hunter2"}));
/// assert_eq!(redacted, json!({"email": "a@b.c", "password": "[REDACTED]"}));
/// ```
#[must_use]
pub fn redact_body(body: &Value) -> Value {
    let Value::Object(fields) = body else {
        return body.clone();
    };
    let redacted = fields
        .iter()
        .map(|(key, value)| {
            let value = if SENSITIVE_FIELDS.contains(&key.as_str()) {
                Value::String(REDACTED_MARKER.to_owned())
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect();
    Value::Object(redacted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::password("password")]
    #[case::token("token")]
    #[case::secret("secret")]
    #[case::api_key("apiKey")]
    #[case::access_token("accessToken")]
    #[case::refresh_token("refreshToken")]
    fn sensitive_fields_are_masked(#[case] field: &str) {
        let body = json!({ field: "s3cr3t", "name": "Ada" });
        let redacted = redact_body(&body);
        assert_eq!(redacted[field], REDACTED_MARKER);
        assert_eq!(redacted["name"], "Ada");
    }

    #[test]
    fn nested_fields_are_left_alone() {
        let body = json!({"profile": {"password": "inner"}, "count": 2});
        assert_eq!(redact_body(&body), body);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let body = json!({"Password": "kept", "APIKEY": "kept"});
        assert_eq!(redact_body(&body), body);
    }

    #[rstest]
    #[case::array(json!([{"password": "x"}]))]
    #[case::string(json!("password"))]
    #[case::null(Value::Null)]
    fn non_object_bodies_pass_through(#[case] body: Value) {
        assert_eq!(redact_body(&body), body);
    }
}
