//! Success envelope and the response normalizer.

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::ApiError;

/// Backend success envelope: `{success, data, message?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

/// What came back over the wire, before any interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Response normalizer: hand the caller only the application-level envelope.
///
/// An empty body (e.g. 204) is read as an envelope whose `data` is null, so
/// callers expecting `Option<T>` or `serde_json::Value` still succeed.
pub fn normalize<T: DeserializeOwned>(raw: &RawResponse) -> Result<ApiResponse<T>, ApiError> {
    if raw.body.trim().is_empty() {
        let data = serde_json::from_value(serde_json::Value::Null).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "Empty body with status {} cannot be read as payload: {}",
                raw.status, e
            ))
        })?;
        return Ok(ApiResponse {
            success: true,
            data,
            message: None,
        });
    }

    serde_json::from_str(&raw.body).map_err(|e| {
        ApiError::InvalidResponse(format!("Failed to parse response envelope: {}", e))
    })
}
