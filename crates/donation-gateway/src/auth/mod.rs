//! Bearer-token caching for the external backends.
//!
//! One [`TokenCache`] per backend holds a single cached credential and its
//! absolute expiry. Callers ask for a valid token; the cache re-authenticates
//! lazily through its [`TokenSource`] when the cached one is stale. The clock
//! is injected so the validity window is testable without real timers.

mod sources;

pub use sources::{
    ClientCredentialsSource, LoginSession, RefreshTokenSource, TokenSource, UserLoginSource,
};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::AuthResult;

/// A clock abstraction over epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Current time as milliseconds since the UNIX epoch.
    fn now_millis(&self) -> i64;
}

/// Wall clock used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i64)
    }
}

/// A cached bearer token and its absolute expiry.
///
/// Replaced wholesale on every refresh, never partially mutated. Consumers
/// receive a copy of the token string only.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Opaque bearer string.
    pub token: String,
    /// Epoch milliseconds after which the token must no longer be used.
    pub expires_at: i64,
}

impl Credential {
    /// Create a credential with an absolute expiry in epoch milliseconds.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_at: i64) -> Self {
        Self { token: token.into(), expires_at }
    }

    /// True while `now < expires_at - safety_margin`.
    #[must_use]
    pub fn is_fresh(&self, now_millis: i64, safety_margin: Duration) -> bool {
        now_millis < self.expires_at - safety_margin.as_millis() as i64
    }
}

/// Per-user login and password supplied by the caller of the cache.
#[derive(Clone)]
pub struct UserCredentials {
    /// Account login (usually an email address).
    pub login: String,
    /// Account password.
    pub password: String,
}

impl UserCredentials {
    /// Create caller-supplied credentials.
    #[must_use]
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self { login: login.into(), password: password.into() }
    }
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials").field("login", &self.login).finish()
    }
}

/// Lazily-refreshed single-slot credential cache for one backend.
///
/// The slot is guarded by an async mutex held across the authenticate call,
/// so concurrent callers racing past an expired check all await the same
/// authentication instead of issuing redundant ones.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    slot: Mutex<Option<Credential>>,
    safety_margin: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCache {
    /// Create a cache over a backend source using the wall clock.
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>, safety_margin: Duration) -> Self {
        Self::with_clock(source, safety_margin, Arc::new(SystemClock))
    }

    /// Create a cache with an injected clock (fake clocks in tests).
    #[must_use]
    pub fn with_clock(
        source: Arc<dyn TokenSource>,
        safety_margin: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { source, slot: Mutex::new(None), safety_margin, clock }
    }

    /// Return the cached token while it is still comfortably valid,
    /// re-authenticating and replacing the slot otherwise.
    ///
    /// On authentication failure the prior slot is left untouched, so the
    /// next call re-attempts authentication instead of resurrecting a token
    /// already past its margin.
    pub async fn get_valid_token(
        &self,
        credentials: Option<&UserCredentials>,
    ) -> AuthResult<String> {
        let mut slot = self.slot.lock().await;

        if let Some(credential) = slot.as_ref() {
            if credential.is_fresh(self.clock.now_millis(), self.safety_margin) {
                return Ok(credential.token.clone());
            }
            tracing::debug!("cached token past safety margin, re-authenticating");
        }

        let fresh = self.source.authenticate(credentials).await?;
        let token = fresh.token.clone();
        *slot = Some(fresh);
        Ok(token)
    }

    /// Unconditionally re-authenticate, regardless of current validity.
    ///
    /// Used after an observed 401/403 to recover from a token invalidated
    /// out-of-band. The slot is replaced wholesale on success only.
    pub async fn refresh(&self, credentials: Option<&UserCredentials>) -> AuthResult<String> {
        let mut slot = self.slot.lock().await;

        tracing::debug!("forcing token refresh");
        let fresh = self.source.authenticate(credentials).await?;
        let token = fresh.token.clone();
        *slot = Some(fresh);
        Ok(token)
    }

    /// Discard the cached token without re-authenticating (logout path).
    pub async fn clear(&self) {
        self.slot.lock().await.take();
    }

    /// Whether the backing source needs caller-supplied credentials
    /// (per-user shape) rather than process configuration (service shape).
    #[must_use]
    pub fn requires_caller_credentials(&self) -> bool {
        self.source.requires_caller_credentials()
    }

    /// Seed the slot directly. Test hook for expiry-window scenarios.
    #[cfg(test)]
    pub(crate) async fn seed(&self, credential: Credential) {
        *self.slot.lock().await = Some(credential);
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").field("safety_margin", &self.safety_margin).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

    struct FakeClock(AtomicI64);

    impl FakeClock {
        fn at(millis: i64) -> Arc<Self> {
            Arc::new(Self(AtomicI64::new(millis)))
        }

        fn advance(&self, millis: i64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for FakeClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Source that counts authentications and issues sequential tokens.
    struct CountingSource {
        calls: AtomicU32,
        lifetime_ms: i64,
        clock: Arc<FakeClock>,
    }

    #[async_trait::async_trait]
    impl TokenSource for CountingSource {
        async fn authenticate(
            &self,
            _credentials: Option<&UserCredentials>,
        ) -> AuthResult<Credential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Credential::new(
                format!("token-{n}"),
                self.clock.now_millis() + self.lifetime_ms,
            ))
        }
    }

    fn minutes(n: i64) -> i64 {
        n * 60 * 1000
    }

    fn setup(lifetime_min: i64) -> (Arc<FakeClock>, Arc<CountingSource>, TokenCache) {
        let clock = FakeClock::at(1_000_000);
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            lifetime_ms: minutes(lifetime_min),
            clock: Arc::clone(&clock),
        });
        let cache = TokenCache::with_clock(
            Arc::clone(&source) as Arc<dyn TokenSource>,
            Duration::from_secs(300),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (clock, source, cache)
    }

    #[tokio::test]
    async fn test_token_reused_inside_validity_window() {
        let (clock, source, cache) = setup(10);

        let first = cache.get_valid_token(None).await.unwrap();
        assert_eq!(first, "token-1");

        // 4 minutes later: 10 min lifetime - 5 min margin not yet reached
        clock.advance(minutes(4));
        assert_eq!(cache.get_valid_token(None).await.unwrap(), "token-1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_refreshed_past_safety_margin() {
        let (clock, source, cache) = setup(10);
        cache.get_valid_token(None).await.unwrap();

        // 6 minutes into a 10 minute lifetime crosses the 5 minute margin
        clock.advance(minutes(6));
        assert_eq!(cache.get_valid_token(None).await.unwrap(), "token-2");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_is_unconditional() {
        let (_clock, source, cache) = setup(60);

        let first = cache.get_valid_token(None).await.unwrap();
        let second = cache.refresh(None).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        // Refreshed token replaces the slot for subsequent reads
        assert_eq!(cache.get_valid_token(None).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_clear_forces_reauthentication() {
        let (_clock, source, cache) = setup(60);

        cache.get_valid_token(None).await.unwrap();
        cache.clear().await;
        cache.get_valid_token(None).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    /// Source that always rejects; used to verify failures leave the slot alone.
    struct RejectingSource;

    #[async_trait::async_trait]
    impl TokenSource for RejectingSource {
        async fn authenticate(
            &self,
            _credentials: Option<&UserCredentials>,
        ) -> AuthResult<Credential> {
            Err(crate::error::AuthError::rejected(401, "revoked"))
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_prior_slot_untouched() {
        let clock = FakeClock::at(1_000_000);
        let cache = TokenCache::with_clock(
            Arc::new(RejectingSource),
            Duration::from_secs(300),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        cache.seed(Credential::new("stale", clock.now_millis() + minutes(60))).await;

        assert!(cache.refresh(None).await.is_err());

        // The stale-but-unreplaced token is still served while fresh
        assert_eq!(cache.get_valid_token(None).await.unwrap(), "stale");
    }

    #[tokio::test]
    async fn test_credentials_debug_hides_password() {
        let creds = UserCredentials::new("donor@example.org", "hunter2");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("donor@example.org"));
    }
}
