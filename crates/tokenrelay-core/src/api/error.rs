use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::auth::StoreError;

/// Message every caller sees when no transport response was received.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error occurred";

/// Backend marker for a malformed or rejected token (as opposed to a stale one).
/// Must match the backend bit-for-bit.
pub const INVALID_ACCESS_TOKEN_MESSAGE: &str = "Invalid Access Token";

/// Status code the backend pairs with [`INVALID_ACCESS_TOKEN_MESSAGE`].
pub const INVALID_ACCESS_TOKEN_STATUS: u16 = 404;

/// Maximum length for error response bodies in log output
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// The single failure shape handed to callers, whatever the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct NormalizedError {
    pub status_code: u16,
    pub message: String,
    #[serde(default)]
    pub errors: Vec<String>,
    pub success: bool,
}

impl NormalizedError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            errors: Vec::new(),
            success: false,
        }
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    /// Failure with no transport response at all (connect error, timeout).
    pub fn network() -> Self {
        Self::new(500, NETWORK_ERROR_MESSAGE)
    }

    /// Build from a non-2xx response. The envelope's own `statusCode` wins
    /// over the HTTP status when both are present.
    ///
    /// Fields are read one at a time so a malformed `errors` (null, objects)
    /// never costs us `statusCode` or `message`.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let envelope = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(envelope)) => envelope,
            _ => {
                debug!(
                    status = status.as_u16(),
                    body = %truncate_body(body),
                    "Error response is not a JSON envelope"
                );
                return Self::new(status.as_u16(), Self::fallback_message(status));
            }
        };

        let status_code = envelope
            .get("statusCode")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(status.as_u16());
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Self::fallback_message(status));
        let errors = envelope.get("errors").map(error_list).unwrap_or_default();

        Self {
            status_code,
            message,
            errors,
            success: false,
        }
    }

    /// True for the backend's "token is invalid, not just expired" signal.
    pub fn is_invalid_access_token(&self) -> bool {
        self.status_code == INVALID_ACCESS_TOKEN_STATUS
            && self.message == INVALID_ACCESS_TOKEN_MESSAGE
    }

    fn fallback_message(status: StatusCode) -> String {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()))
    }
}

impl std::fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status_code, self.message)
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid access token: {0}")]
    InvalidCredential(NormalizedError),

    #[error("Session refresh failed: {0}")]
    RefreshFailed(NormalizedError),

    #[error("Request failed: {0}")]
    Application(NormalizedError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session store error: {0}")]
    Storage(#[from] StoreError),
}

impl ApiError {
    /// Collapse any failure into the caller-facing shape.
    pub fn normalized(&self) -> NormalizedError {
        match self {
            ApiError::InvalidCredential(e)
            | ApiError::RefreshFailed(e)
            | ApiError::Application(e) => e.clone(),
            ApiError::Network(_) => NormalizedError::network(),
            ApiError::InvalidResponse(msg) => NormalizedError::new(500, msg.clone()),
            ApiError::Serialization(e) => NormalizedError::new(500, e.to_string()),
            ApiError::Storage(e) => NormalizedError::new(500, e.to_string()),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.normalized().status_code
    }

    /// Whether this failure ended the session (store cleared, invalidation signaled).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidCredential(_) | ApiError::RefreshFailed(_)
        )
    }
}

/// Flatten a backend `errors` value into strings. Null is empty, a lone
/// string is one entry, and non-string items keep their JSON text.
fn error_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        other => vec![other.to_string()],
    }
}

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_uses_envelope() {
        let body = r#"{"statusCode":422,"message":"Validation failed","errors":["name is required","email is invalid"]}"#;
        let err = NormalizedError::from_response(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(err.status_code, 422);
        assert_eq!(err.message, "Validation failed");
        assert_eq!(err.errors, vec!["name is required", "email is invalid"]);
        assert!(!err.success);
    }

    #[test]
    fn test_from_response_envelope_status_wins() {
        let body = r#"{"statusCode":404,"message":"Invalid Access Token"}"#;
        let err = NormalizedError::from_response(StatusCode::UNAUTHORIZED, body);
        assert_eq!(err.status_code, 404);
        assert!(err.is_invalid_access_token());
    }

    #[test]
    fn test_from_response_null_errors_keeps_sentinel() {
        let body = r#"{"statusCode":404,"message":"Invalid Access Token","errors":null}"#;
        let err = NormalizedError::from_response(StatusCode::NOT_FOUND, body);
        assert_eq!(err.message, "Invalid Access Token");
        assert!(err.errors.is_empty());
        assert!(err.is_invalid_access_token());
    }

    #[test]
    fn test_from_response_object_errors_are_stringified() {
        let body = r#"{"statusCode":422,"message":"Validation failed","errors":[{"field":"email","msg":"invalid"},"name is required"]}"#;
        let err = NormalizedError::from_response(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(err.status_code, 422);
        assert_eq!(err.message, "Validation failed");
        assert_eq!(
            err.errors,
            vec![r#"{"field":"email","msg":"invalid"}"#, "name is required"]
        );
    }

    #[test]
    fn test_from_response_non_json_body() {
        let err = NormalizedError::from_response(StatusCode::BAD_GATEWAY, "<html>upstream down</html>");
        assert_eq!(err.status_code, 502);
        assert_eq!(err.message, "Bad Gateway");
        assert!(err.errors.is_empty());
    }

    #[test]
    fn test_invalid_access_token_is_exact() {
        assert!(!NormalizedError::new(404, "invalid access token").is_invalid_access_token());
        assert!(!NormalizedError::new(401, "Invalid Access Token").is_invalid_access_token());
        assert!(NormalizedError::new(404, "Invalid Access Token").is_invalid_access_token());
    }

    #[test]
    fn test_network_shape() {
        let json = serde_json::to_value(NormalizedError::network()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "statusCode": 500,
                "message": "Network error occurred",
                "errors": [],
                "success": false
            })
        );
    }

    #[test]
    fn test_terminal_variants() {
        let e = NormalizedError::new(401, "Token expired");
        assert!(ApiError::RefreshFailed(e.clone()).is_terminal());
        assert!(ApiError::InvalidCredential(e.clone()).is_terminal());
        assert!(!ApiError::Application(e).is_terminal());
        assert_eq!(ApiError::InvalidResponse("bad".into()).status_code(), 500);
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with(&format!("(truncated, {} total bytes)", long.len())));
        assert_eq!(truncate_body("short"), "short");
    }
}
