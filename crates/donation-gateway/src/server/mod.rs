//! HTTP surface: thin route handlers over the gateway services.
//!
//! Handlers only translate: envelopes and results from the service layer
//! become JSON bodies and status codes. No business logic lives here.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{
    ClientCredentialsSource, RefreshTokenSource, SystemClock, TokenCache, UserCredentials,
    UserLoginSource,
};
use crate::client::{build_http_client, ApiClient};
use crate::config::Config;
use crate::error::{AuthError, PostalError};
use crate::postal::PostalClient;
use crate::sync::{DonationSyncService, SyncOutcome};

/// Shared state for the route handlers.
pub struct AppState {
    /// Postal-code lookup client.
    pub postal: PostalClient,
    /// Per-user login against the donor platform.
    pub dso_login: Arc<UserLoginSource>,
    /// Donation sync to CRM + marketing.
    pub sync: DonationSyncService,
}

impl AppState {
    /// Wire the full service graph from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = build_http_client(config)?;
        let clock = Arc::new(SystemClock);

        let crm_tokens = Arc::new(TokenCache::new(
            Arc::new(ClientCredentialsSource::new(
                http.clone(),
                config.crm.clone(),
                clock.clone(),
            )),
            config.safety_margin,
        ));
        let crm = ApiClient::new(http.clone(), config.crm.base_url.clone(), crm_tokens, config);

        let marketing_tokens = Arc::new(TokenCache::new(
            Arc::new(RefreshTokenSource::new(
                http.clone(),
                config.marketing.clone(),
                clock.clone(),
            )),
            config.safety_margin,
        ));
        let marketing =
            ApiClient::new(http.clone(), config.marketing.base_url.clone(), marketing_tokens, config);

        let dso_login =
            Arc::new(UserLoginSource::new(http.clone(), config.dso_base_url.clone(), clock));

        Ok(Self {
            postal: PostalClient::new(http, config),
            dso_login,
            sync: DonationSyncService::new(crm, marketing),
        })
    }
}

/// Create the HTTP router for the gateway.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/address/{code}", get(lookup_address))
        .route("/login", post(login))
        .route("/donations", post(record_donation))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "donation-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn lookup_address(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    match state.postal.lookup(&code).await {
        Ok(address) => Json(address).into_response(),
        Err(PostalError::InvalidCode(code)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": format!("invalid postal code: {code}")})),
        )
            .into_response(),
        Err(PostalError::NotFound(code)) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("postal code not found: {code}")})),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "postal lookup failed");
            (StatusCode::BAD_GATEWAY, Json(json!({"error": "address lookup unavailable"})))
                .into_response()
        }
    }
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Account login.
    pub login: String,
    /// Account password.
    pub password: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let credentials = UserCredentials::new(request.login, request.password);

    match state.dso_login.login(&credentials).await {
        Ok(session) => {
            Json(json!({"token": session.credential.token, "user": session.user}))
                .into_response()
        }
        // Refusals arrive as 401/403 or as a refused marker inside a 2xx body
        Err(AuthError::Rejected { status, .. }) if status < 500 => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid login or password"})),
        )
            .into_response(),
        Err(AuthError::Rejected { status, body }) => {
            tracing::error!(status, body = %body, "donor platform refused login");
            (StatusCode::BAD_GATEWAY, Json(json!({"error": "login service unavailable"})))
                .into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "login failed");
            (StatusCode::BAD_GATEWAY, Json(json!({"error": "login service unavailable"})))
                .into_response()
        }
    }
}

async fn record_donation(
    State(state): State<Arc<AppState>>,
    Json(donation): Json<crate::models::DonationRecord>,
) -> Response {
    match state.sync.record_donation(&donation).await {
        SyncOutcome::Synced => Json(json!({"status": "ok"})).into_response(),
        SyncOutcome::SyncedWithWarning(warning) => {
            Json(json!({"status": "ok", "warning": warning})).into_response()
        }
        SyncOutcome::Failed(reason) => {
            tracing::error!(reason = %reason, "donation sync failed outright");
            (StatusCode::BAD_GATEWAY, Json(json!({"error": reason}))).into_response()
        }
    }
}
