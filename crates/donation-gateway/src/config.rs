//! Configuration for the donation gateway.

use std::time::Duration;

use anyhow::Context;

/// API configuration constants.
pub mod api {
    use std::time::Duration;

    /// CRM OAuth client-credentials token endpoint.
    pub const CRM_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/token";

    /// Marketing-automation token endpoint.
    pub const MARKETING_TOKEN_URL: &str = "https://api.rd.services/auth/token";

    /// Marketing-automation API base URL.
    pub const MARKETING_API: &str = "https://api.rd.services";

    /// Public postal-code lookup service.
    pub const POSTAL_API: &str = "https://viacep.com.br";

    /// Buffer subtracted from a token's expiry to decide staleness proactively.
    pub const SAFETY_MARGIN: Duration = Duration::from_secs(300);

    /// Token lifetime assumed when a backend sends no expiry hint.
    pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

    /// Maximum retries per logical call (so at most `MAX_RETRIES + 1` attempts).
    pub const MAX_RETRIES: u32 = 2;

    /// Base delay between retry attempts (doubled per attempt).
    pub const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(250);

    /// Upper bound on the retry delay.
    pub const RETRY_BACKOFF_CAP: Duration = Duration::from_secs(2);

    /// Request timeout, bounding retry-loop latency per outbound call.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum keepalive connections per host.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

    /// Postal responses are static for days; cache them generously.
    pub const POSTAL_CACHE_TTL: Duration = Duration::from_secs(6 * 3600);

    /// Maximum cached postal lookups.
    pub const POSTAL_CACHE_MAX_SIZE: u64 = 10_000;
}

/// Service-to-service credentials for the CRM backend.
#[derive(Clone)]
pub struct CrmConfig {
    /// OAuth token endpoint.
    pub token_url: String,
    /// Web API base URL.
    pub base_url: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Resource the token is requested for.
    pub resource: String,
}

/// Refresh-token credentials for the marketing-automation backend.
#[derive(Clone)]
pub struct MarketingConfig {
    /// Token endpoint.
    pub token_url: String,
    /// Platform API base URL.
    pub base_url: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Long-lived refresh token issued at app connection time.
    pub refresh_token: String,
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// CRM backend settings.
    pub crm: CrmConfig,

    /// Marketing-automation backend settings.
    pub marketing: MarketingConfig,

    /// Donor-platform (DSO) API base URL.
    pub dso_base_url: String,

    /// Postal-code lookup base URL.
    pub postal_base_url: String,

    /// Request timeout.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Maximum retries per logical call.
    pub max_retries: u32,

    /// Base delay between retry attempts.
    pub backoff_base: Duration,

    /// Upper bound on the retry delay.
    pub backoff_cap: Duration,

    /// Buffer subtracted from token expiry when deciding staleness.
    pub safety_margin: Duration,

    /// Postal cache TTL.
    pub postal_cache_ttl: Duration,

    /// Maximum postal cache size.
    pub postal_cache_max_size: u64,
}

impl Config {
    /// Create a configuration from explicit backend settings, with all
    /// timing knobs at their production defaults.
    #[must_use]
    pub fn new(crm: CrmConfig, marketing: MarketingConfig, dso_base_url: String) -> Self {
        Self {
            crm,
            marketing,
            dso_base_url,
            postal_base_url: api::POSTAL_API.to_string(),
            request_timeout: api::REQUEST_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
            max_retries: api::MAX_RETRIES,
            backoff_base: api::RETRY_BACKOFF_BASE,
            backoff_cap: api::RETRY_BACKOFF_CAP,
            safety_margin: api::SAFETY_MARGIN,
            postal_cache_ttl: api::POSTAL_CACHE_TTL,
            postal_cache_max_size: api::POSTAL_CACHE_MAX_SIZE,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if a required backend variable is missing.
    pub fn from_env() -> anyhow::Result<Self> {
        let crm = CrmConfig {
            token_url: env_or("CRM_TOKEN_URL", api::CRM_TOKEN_URL),
            base_url: require_env("CRM_BASE_URL")?,
            client_id: require_env("CRM_CLIENT_ID")?,
            client_secret: require_env("CRM_CLIENT_SECRET")?,
            resource: require_env("CRM_RESOURCE")?,
        };

        let marketing = MarketingConfig {
            token_url: env_or("MARKETING_TOKEN_URL", api::MARKETING_TOKEN_URL),
            base_url: env_or("MARKETING_BASE_URL", api::MARKETING_API),
            client_id: require_env("MARKETING_CLIENT_ID")?,
            client_secret: require_env("MARKETING_CLIENT_SECRET")?,
            refresh_token: require_env("MARKETING_REFRESH_TOKEN")?,
        };

        let dso_base_url = require_env("DSO_BASE_URL")?;

        let mut config = Self::new(crm, marketing, dso_base_url);
        if let Ok(url) = std::env::var("POSTAL_BASE_URL") {
            config.postal_base_url = url;
        }
        Ok(config)
    }

    /// Create a test configuration with all backends pointed at a mock
    /// server and timing knobs zeroed so retries run without delay.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            crm: CrmConfig {
                token_url: format!("{base_url}/crm/oauth2/token"),
                base_url: format!("{base_url}/crm"),
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                resource: format!("{base_url}/crm"),
            },
            marketing: MarketingConfig {
                token_url: format!("{base_url}/marketing/auth/token"),
                base_url: format!("{base_url}/marketing"),
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                refresh_token: "test-refresh".to_string(),
            },
            dso_base_url: format!("{base_url}/dso"),
            postal_base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            max_retries: api::MAX_RETRIES,
            backoff_base: Duration::ZERO, // No delay in tests
            backoff_cap: Duration::ZERO,
            safety_margin: api::SAFETY_MARGIN,
            postal_cache_ttl: Duration::from_secs(0), // No caching in tests
            postal_cache_max_size: 0,
        }
    }
}

fn require_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("missing environment variable {name}"))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl std::fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmConfig")
            .field("token_url", &self.token_url)
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("resource", &self.resource)
            .finish()
    }
}

impl std::fmt::Debug for MarketingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketingConfig")
            .field("token_url", &self.token_url)
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .finish()
    }
}
