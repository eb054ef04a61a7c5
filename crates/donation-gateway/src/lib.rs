//! Donation Gateway
//!
//! Integration library for a nonprofit donation site. Wraps the three
//! external systems the site depends on (a Dynamics-based CRM, the donor
//! platform DSO, and a marketing-automation platform) behind one token
//! cache and one resilient HTTP client, plus a public postal-code lookup.
//!
//! # Features
//!
//! - **Token caching**: one lazily-refreshed credential per backend with a
//!   safety margin before expiry
//! - **Resilient calls**: bounded retry with forced re-authentication on
//!   401/403, uniform envelopes for route handlers
//! - **Degrade gracefully**: a failed CRM or marketing sync warns operators
//!   but never blocks the donor-facing confirmation
//!
//! # Example
//!
//! ```no_run
//! use donation_gateway::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = server::AppState::from_config(&config)?;
//!     let router = server::create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod postal;
pub mod server;
pub mod sync;

pub use auth::{Credential, TokenCache, UserCredentials};
pub use client::{ApiClient, RequestDescriptor, ResponseEnvelope};
pub use config::Config;
pub use error::{AuthError, PostalError};
pub use models::{Address, DonationRecord, Donor};
pub use postal::PostalClient;
pub use sync::{DonationSyncService, SyncOutcome};

/// Install a `tracing` subscriber reading `RUST_LOG`, defaulting to `info`.
///
/// Call once from the embedding binary before serving.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
