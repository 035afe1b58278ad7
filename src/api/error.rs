//! API error types and server `detail` extraction

use crate::util::truncate_utf8_safe;

/// Longest error body kept in an `ApiError::Status` detail
const MAX_DETAIL_BYTES: usize = 300;

/// Errors that can occur talking to the EcoReceipt API.
///
/// Authentication failure (401) is absent: the gateway turns it
/// into a session teardown and the call yields no response instead.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// DNS, connection refused, timeout, broken body stream
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-success status other than 401
    #[error("API error ({status}): {detail}")]
    Status { status: u16, detail: String },

    /// Success status but the body did not match the expected shape
    #[error("unexpected response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Response parsed but a required part was missing
    #[error("unexpected response from {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// Request could not be built (bad id, token not valid as a header)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Render a server error body for display.
///
/// FastAPI sends `{"detail": "..."}` for raised errors and
/// `{"detail": [{"msg": "...", ...}]}` for validation failures. Anything else
/// falls back to the (truncated) raw body.
pub fn extract_detail(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        match value.get("detail") {
            Some(serde_json::Value::String(s)) => return s.clone(),
            Some(serde_json::Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                if !messages.is_empty() {
                    return messages.join("; ");
                }
            }
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return "Unknown error".to_string();
    }
    truncate_utf8_safe(text, MAX_DETAIL_BYTES).to_string()
}
