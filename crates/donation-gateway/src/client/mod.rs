//! Resilient authenticated HTTP client.
//!
//! Wraps one backend with its [`TokenCache`]: obtains a valid bearer token,
//! performs the call, and transparently recovers from a token that was valid
//! at call time but rejected by the server. Retries are an explicit bounded
//! loop with an attempt counter, so the cap on outbound calls is structural.

mod envelope;

pub use envelope::{unwrap_data, ResponseEnvelope};

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::auth::{TokenCache, UserCredentials};
use crate::config::{api, Config};
use crate::error::AuthError;

/// Build the shared HTTP client with pooling and explicit timeouts.
///
/// # Errors
///
/// Returns error if client initialization fails.
pub fn build_http_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(api::MAX_KEEPALIVE)
        .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
        .gzip(true)
        .build()?;
    Ok(client)
}

/// One outbound call, described independently of transport details.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method.
    pub method: Method,
    /// Path appended to the client's base URL.
    pub path: String,
    /// Extra headers beyond `Authorization`.
    pub headers: Vec<(String, String)>,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl RequestDescriptor {
    /// Describe a GET.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::GET, path: path.into(), headers: Vec::new(), body: None }
    }

    /// Describe a POST with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { method: Method::POST, path: path.into(), headers: Vec::new(), body: Some(body) }
    }

    /// Describe a DELETE.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self { method: Method::DELETE, path: path.into(), headers: Vec::new(), body: None }
    }

    /// Attach an extra header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Retry knobs for the bounded loop.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Extra attempts after the first (so `max_retries + 1` calls at most).
    pub max_retries: u32,
    /// Base delay, doubled per attempt.
    pub backoff_base: Duration,
    /// Cap on the delay.
    pub backoff_cap: Duration,
}

impl RetrySettings {
    fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        (self.backoff_base * factor).min(self.backoff_cap)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: api::MAX_RETRIES,
            backoff_base: api::RETRY_BACKOFF_BASE,
            backoff_cap: api::RETRY_BACKOFF_CAP,
        }
    }
}

/// Authenticated client for one backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenCache>,
    retry: RetrySettings,
}

impl ApiClient {
    /// Create a client over a shared HTTP client and the backend's cache.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Arc<TokenCache>,
        config: &Config,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens,
            retry: RetrySettings::from_config(config),
        }
    }

    /// Perform one authenticated logical call.
    ///
    /// Never raises: every outcome resolves to a [`ResponseEnvelope`] the
    /// route layer can branch on uniformly. Issues at most
    /// `max_retries + 1` calls to the resource server.
    pub async fn request(
        &self,
        descriptor: RequestDescriptor,
        credentials: Option<&UserCredentials>,
    ) -> ResponseEnvelope {
        let url = format!("{}{}", self.base_url, descriptor.path);
        let mut force_refresh = false;

        for attempt in 0..=self.retry.max_retries {
            let token = if force_refresh {
                self.tokens.refresh(credentials).await
            } else {
                self.tokens.get_valid_token(credentials).await
            };
            force_refresh = false;

            let token = match token {
                Ok(token) => token,
                Err(AuthError::CredentialsUnavailable) => {
                    tracing::debug!(url = %url, "no usable credentials, not calling backend");
                    return ResponseEnvelope::needs_login(401);
                }
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "authentication failed");
                    return ResponseEnvelope::failure(err.status().unwrap_or(500), err.to_string());
                }
            };

            let mut request =
                self.http.request(descriptor.method.clone(), &url).bearer_auth(&token);
            for (name, value) in &descriptor.headers {
                request = request.header(name, value);
            }
            if let Some(body) = &descriptor.body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) if attempt < self.retry.max_retries => {
                    tracing::warn!(
                        url = %url,
                        attempt,
                        error = %err,
                        "transport failure, retrying"
                    );
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    continue;
                }
                Err(err) => {
                    tracing::error!(url = %url, error = %err, "transport failure, giving up");
                    return ResponseEnvelope::failure(500, format!("transport error: {err}"));
                }
            };

            let status = response.status();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                let can_reauthenticate =
                    credentials.is_some() || !self.tokens.requires_caller_credentials();
                if !can_reauthenticate {
                    tracing::debug!(url = %url, status = status.as_u16(), "token rejected, no credentials to refresh with");
                    return ResponseEnvelope::needs_login(status.as_u16());
                }
                if attempt < self.retry.max_retries {
                    tracing::warn!(url = %url, status = status.as_u16(), attempt, "token rejected, forcing refresh");
                    force_refresh = true;
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    continue;
                }
                let body = response.text().await.unwrap_or_default();
                return ResponseEnvelope::failure(
                    status.as_u16(),
                    format!("authentication rejected after retries: {body}"),
                );
            }

            if status.is_server_error() && attempt < self.retry.max_retries {
                tracing::warn!(url = %url, status = status.as_u16(), attempt, "server error, retrying");
                tokio::time::sleep(self.retry.delay_for(attempt)).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return ResponseEnvelope::failure(
                    status.as_u16(),
                    format!("backend returned {}: {body}", status.as_u16()),
                );
            }

            // 2xx: parse the body; an empty body counts as an empty object
            // (deletes and fire-and-forget events respond 204/2xx-no-body).
            let text = match response.text().await {
                Ok(text) => text,
                Err(err) if attempt < self.retry.max_retries => {
                    tracing::warn!(url = %url, attempt, error = %err, "body read failed, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    continue;
                }
                Err(err) => {
                    return ResponseEnvelope::failure(500, format!("transport error: {err}"));
                }
            };

            if text.is_empty() {
                return ResponseEnvelope::ok(status.as_u16(), Value::Object(serde_json::Map::new()));
            }

            // Retrying will not fix a malformed payload
            return match serde_json::from_str::<Value>(&text) {
                Ok(value) => ResponseEnvelope::ok(status.as_u16(), unwrap_data(value)),
                Err(err) => ResponseEnvelope::failure(
                    status.as_u16(),
                    format!("malformed response body: {err}"),
                ),
            };
        }

        // Every loop path either returns or continues with attempts left.
        ResponseEnvelope::failure(500, "retry budget exhausted")
    }

    /// Authenticated GET.
    pub async fn get(
        &self,
        path: impl Into<String>,
        credentials: Option<&UserCredentials>,
    ) -> ResponseEnvelope {
        self.request(RequestDescriptor::get(path), credentials).await
    }

    /// Authenticated POST with a JSON body.
    pub async fn post(
        &self,
        path: impl Into<String>,
        body: Value,
        credentials: Option<&UserCredentials>,
    ) -> ResponseEnvelope {
        self.request(RequestDescriptor::post(path, body), credentials).await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base_url", &self.base_url).finish()
    }
}
