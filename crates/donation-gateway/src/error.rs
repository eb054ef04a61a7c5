//! Error types for the donation gateway.
//!
//! Uses `thiserror` for structured error handling with automatic `From`
//! implementations. The token cache raises `AuthError`; the resilient API
//! client never raises and always resolves to a `ResponseEnvelope`.

/// Errors from authenticating against a backend token endpoint.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// No cached token and no way to mint one (missing caller credentials
    /// or missing service configuration). Surfaced as "needs login".
    #[error("no credentials available to authenticate")]
    CredentialsUnavailable,

    /// The token endpoint itself returned a non-2xx status.
    #[error("authentication rejected ({status}): {body}")]
    Rejected {
        /// HTTP status observed from the token endpoint
        status: u16,
        /// Response body from the token endpoint
        body: String,
    },

    /// Network-level failure reaching the token endpoint.
    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// 2xx response whose body did not contain a usable token.
    #[error("malformed token response: {reason}")]
    Malformed {
        /// What was missing or unparseable
        reason: String,
    },
}

impl AuthError {
    /// Create a rejection error from a token-endpoint status and body.
    #[must_use]
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::Rejected { status, body: body.into() }
    }

    /// Create a malformed-response error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed { reason: reason.into() }
    }

    /// Returns true if the caller must supply credentials before retrying.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::CredentialsUnavailable)
    }

    /// The HTTP status observed from the token endpoint, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors from the postal-code lookup service.
#[derive(thiserror::Error, Debug)]
pub enum PostalError {
    /// The supplied code is not a valid 8-digit postal code.
    #[error("invalid postal code: {0}")]
    InvalidCode(String),

    /// The lookup service reported the code as unknown (`erro` flag).
    #[error("postal code not found: {0}")]
    NotFound(String),

    /// The lookup service answered with a non-2xx status.
    #[error("postal lookup failed with status {status}")]
    Upstream {
        /// HTTP status observed
        status: u16,
    },

    /// Network-level failure reaching the lookup service.
    #[error("postal lookup unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// 2xx response whose body was not a parseable address.
    #[error("malformed postal response: {0}")]
    Malformed(String),
}

impl PostalError {
    /// Returns true if a later retry with the same code could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Transport(_))
    }
}

/// Result type alias for token cache operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type alias for postal lookups.
pub type PostalResult<T> = Result<T, PostalError>;
