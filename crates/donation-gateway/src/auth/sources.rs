//! Per-backend authentication calls behind the [`TokenCache`] seam.
//!
//! Each backend authenticates differently (form-encoded client credentials,
//! JSON refresh token, per-user login) and hints expiry differently
//! (`expires_in` relative seconds, `expires_on` absolute epoch seconds, or
//! nothing at all). A [`TokenSource`] folds those differences into one
//! `authenticate -> Credential` call so the cache stays generic.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::{Clock, Credential, UserCredentials};
use crate::config::{api, CrmConfig, MarketingConfig};
use crate::error::{AuthError, AuthResult};

/// One backend's way of minting a bearer token.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// Perform a full authentication round-trip and parse the result.
    async fn authenticate(&self, credentials: Option<&UserCredentials>)
        -> AuthResult<Credential>;

    /// True when authentication needs caller-supplied credentials rather
    /// than process configuration.
    fn requires_caller_credentials(&self) -> bool {
        false
    }
}

/// OAuth client-credentials flow against the CRM token endpoint.
///
/// Form-encoded POST; the response carries `expires_in` or `expires_on`
/// depending on endpoint version, sometimes as numeric strings.
pub struct ClientCredentialsSource {
    http: reqwest::Client,
    config: CrmConfig,
    clock: Arc<dyn Clock>,
}

impl ClientCredentialsSource {
    /// Create a source from CRM settings.
    #[must_use]
    pub fn new(http: reqwest::Client, config: CrmConfig, clock: Arc<dyn Clock>) -> Self {
        Self { http, config, clock }
    }
}

#[async_trait::async_trait]
impl TokenSource for ClientCredentialsSource {
    async fn authenticate(
        &self,
        _credentials: Option<&UserCredentials>,
    ) -> AuthResult<Credential> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("resource", self.config.resource.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::rejected(status.as_u16(), body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::malformed(format!("token body not JSON: {e}")))?;
        parse_oauth_credential(&body, self.clock.now_millis())
    }
}

/// Refresh-token flow against the marketing-automation token endpoint.
///
/// JSON POST; the platform rotates the refresh token on every exchange, so
/// the latest one is kept for the next authentication.
pub struct RefreshTokenSource {
    http: reqwest::Client,
    config: MarketingConfig,
    refresh_token: Mutex<String>,
    clock: Arc<dyn Clock>,
}

impl RefreshTokenSource {
    /// Create a source from marketing settings.
    #[must_use]
    pub fn new(http: reqwest::Client, config: MarketingConfig, clock: Arc<dyn Clock>) -> Self {
        let refresh_token = Mutex::new(config.refresh_token.clone());
        Self { http, config, refresh_token, clock }
    }
}

#[async_trait::async_trait]
impl TokenSource for RefreshTokenSource {
    async fn authenticate(
        &self,
        _credentials: Option<&UserCredentials>,
    ) -> AuthResult<Credential> {
        let mut refresh_token = self.refresh_token.lock().await;

        let response = self
            .http
            .post(&self.config.token_url)
            .json(&serde_json::json!({
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "refresh_token": *refresh_token,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::rejected(status.as_u16(), body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::malformed(format!("token body not JSON: {e}")))?;

        if let Some(rotated) = body.get("refresh_token").and_then(Value::as_str) {
            *refresh_token = rotated.to_string();
        }

        parse_oauth_credential(&body, self.clock.now_millis())
    }
}

/// Token plus the user object returned by the donor platform on login.
#[derive(Debug, Clone)]
pub struct LoginSession {
    /// The minted per-user credential.
    pub credential: Credential,
    /// Opaque user profile as returned by the platform.
    pub user: Value,
}

/// Per-user login against the donor-platform (DSO) backend.
///
/// The platform marks outcomes with a `success` string in the body rather
/// than relying on status codes alone, and sends no expiry hint.
pub struct UserLoginSource {
    http: reqwest::Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl UserLoginSource {
    /// Create a source against the platform base URL.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: String, clock: Arc<dyn Clock>) -> Self {
        Self { http, base_url, clock }
    }

    /// Authenticate as a specific end user, returning both the credential
    /// and the user profile (the login route needs both).
    pub async fn login(&self, credentials: &UserCredentials) -> AuthResult<LoginSession> {
        let response = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&serde_json::json!({
                "login": credentials.login,
                "password": credentials.password,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::rejected(status.as_u16(), body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::malformed(format!("login body not JSON: {e}")))?;

        if !login_succeeded(&body) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("login refused")
                .to_string();
            return Err(AuthError::rejected(status.as_u16(), message));
        }

        let token = body
            .pointer("/data/token")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::malformed("login response missing data.token"))?;
        let user = body.pointer("/data/user").cloned().unwrap_or(Value::Null);

        let expires_at =
            self.clock.now_millis() + api::DEFAULT_TOKEN_LIFETIME.as_millis() as i64;
        Ok(LoginSession { credential: Credential::new(token, expires_at), user })
    }
}

#[async_trait::async_trait]
impl TokenSource for UserLoginSource {
    async fn authenticate(
        &self,
        credentials: Option<&UserCredentials>,
    ) -> AuthResult<Credential> {
        let credentials = credentials.ok_or(AuthError::CredentialsUnavailable)?;
        Ok(self.login(credentials).await?.credential)
    }

    fn requires_caller_credentials(&self) -> bool {
        true
    }
}

/// The platform's success marker is a string; older responses used a bool.
fn login_succeeded(body: &Value) -> bool {
    match body.get("success") {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("success") || s == "true",
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

/// Build a credential from an OAuth token body, honoring whichever expiry
/// hint the backend sent.
fn parse_oauth_credential(body: &Value, now_millis: i64) -> AuthResult<Credential> {
    let token = body
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| AuthError::malformed("response missing access_token"))?;

    let expires_at = if let Some(expires_in) = seconds_field(body, "expires_in") {
        now_millis + expires_in * 1000
    } else if let Some(expires_on) = seconds_field(body, "expires_on") {
        expires_on * 1000
    } else {
        now_millis + api::DEFAULT_TOKEN_LIFETIME.as_millis() as i64
    };

    Ok(Credential::new(token, expires_at))
}

/// Expiry fields arrive as JSON numbers or numeric strings depending on the
/// endpoint version.
fn seconds_field(body: &Value, key: &str) -> Option<i64> {
    match body.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
