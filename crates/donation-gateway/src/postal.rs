//! Unauthenticated postal-code lookup against the public address service.
//!
//! One-shot GET by code; the service flags unknown codes with an `erro`
//! field in an otherwise 200 response. Results are cached with a TTL since
//! postal data changes on the scale of days.

use moka::future::Cache;
use serde_json::Value;

use crate::config::Config;
use crate::error::{PostalError, PostalResult};
use crate::models::Address;

/// Client for the postal-code lookup service.
#[derive(Clone)]
pub struct PostalClient {
    http: reqwest::Client,
    base_url: String,
    cache: Cache<String, Address>,
}

impl PostalClient {
    /// Create a client over a shared HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.postal_cache_max_size)
            .time_to_live(config.postal_cache_ttl)
            .build();

        Self { http, base_url: config.postal_base_url.clone(), cache }
    }

    /// Resolve a postal code to an address.
    ///
    /// # Errors
    ///
    /// `InvalidCode` for anything that is not 8 digits (no HTTP call is
    /// made), `NotFound` when the service flags the code, `Upstream`/
    /// `Transport`/`Malformed` for service failures.
    pub async fn lookup(&self, code: &str) -> PostalResult<Address> {
        let code = normalize_code(code)?;

        if let Some(hit) = self.cache.get(&code).await {
            return Ok(hit);
        }

        let url = format!("{}/ws/{}/json/", self.base_url, code);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PostalError::Upstream { status: status.as_u16() });
        }

        let text = response.text().await?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| PostalError::Malformed(e.to_string()))?;

        if error_flagged(&value) {
            return Err(PostalError::NotFound(code));
        }

        let address: Address =
            serde_json::from_value(value).map_err(|e| PostalError::Malformed(e.to_string()))?;

        self.cache.insert(code, address.clone()).await;
        Ok(address)
    }
}

impl std::fmt::Debug for PostalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostalClient").field("base_url", &self.base_url).finish()
    }
}

/// Strip separators and require exactly 8 digits.
fn normalize_code(code: &str) -> PostalResult<String> {
    let digits: String = code.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 8 {
        Ok(digits)
    } else {
        Err(PostalError::InvalidCode(code.to_string()))
    }
}

/// The service has sent `"erro": true` and `"erro": "true"` across versions.
fn error_flagged(value: &Value) -> bool {
    match value.get("erro") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}
