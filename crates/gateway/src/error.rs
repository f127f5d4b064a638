//! Error normalization for the gateway layer.
//!
//! Every failed round trip becomes a [`TransportFailure`] whose `message`
//! is picked in this order: the server's `detail` field, the server's
//! `message` field, the transport error text, then [`FALLBACK_MESSAGE`].

use crawldeck_core::error::TransportFailure;
use serde_json::Value;

/// Used when neither the server nor the transport said anything useful.
pub const FALLBACK_MESSAGE: &str = "Request failed";

/// Errors raised while constructing a gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayBuildError {
    /// The configured base URL cannot carry endpoint paths.
    #[error("Invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    /// The underlying HTTP client could not be built (TLS backend, etc.).
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Build a [`TransportFailure`] from whatever the failed round trip produced.
pub fn normalize(
    status: Option<u16>,
    body: Option<Value>,
    transport_text: Option<&str>,
) -> TransportFailure {
    let message = body
        .as_ref()
        .and_then(|b| field_text(b, "detail").or_else(|| field_text(b, "message")))
        .or_else(|| {
            transport_text
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string());

    TransportFailure {
        status,
        message,
        data: body,
    }
}

/// Failure for a non-2xx response. `raw_body` is kept as JSON when it
/// parses, otherwise as a string.
pub fn from_status(status: u16, raw_body: &str) -> TransportFailure {
    let body = if raw_body.trim().is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Value>(raw_body)
                .unwrap_or_else(|_| Value::String(raw_body.to_string())),
        )
    };
    normalize(
        Some(status),
        body,
        Some(&format!("Request failed with status code {status}")),
    )
}

/// Failure for a request that never produced a usable response.
pub fn from_reqwest(err: &reqwest::Error) -> TransportFailure {
    normalize(
        err.status().map(|s| s.as_u16()),
        None,
        Some(&err.to_string()),
    )
}

/// Text of `body[key]`: strings verbatim, other non-null values as JSON.
fn field_text(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
