//! The uniform result shape route handlers branch on.

use serde_json::Value;

/// Outcome of one logical call through the resilient client.
///
/// Three cases the caller must distinguish: authentication impossible
/// (`needs_login`), backend rejected or unavailable (`!success`), and
/// success (`data` usable).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResponseEnvelope {
    /// HTTP status observed (synthetic 500/401 on transport or auth failure).
    pub status: u16,

    /// True only for 2xx with a parseable body.
    pub success: bool,

    /// True when the caller must re-authenticate before anything can work.
    pub needs_login: bool,

    /// Parsed body on success, `{data: ...}` envelope already unwrapped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Human-readable message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Successful call with parsed data.
    #[must_use]
    pub fn ok(status: u16, data: Value) -> Self {
        Self { status, success: true, needs_login: false, data: Some(data), error: None }
    }

    /// Failed call the caller may surface or degrade gracefully on.
    #[must_use]
    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self { status, success: false, needs_login: false, data: None, error: Some(error.into()) }
    }

    /// Authentication impossible without caller credentials.
    #[must_use]
    pub fn needs_login(status: u16) -> Self {
        Self {
            status,
            success: false,
            needs_login: true,
            data: None,
            error: Some("authentication required".to_string()),
        }
    }
}

/// Unwrap an optional `{data: ...}` envelope; bare payloads pass through.
#[must_use]
pub fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
