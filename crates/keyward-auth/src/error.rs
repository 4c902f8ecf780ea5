//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while resolving keys or validating tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Provider construction parameters are missing or invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The key-set (or metadata) document could not be retrieved or decoded.
    #[error("key set fetch failed: {0}")]
    FetchFailed(String),

    /// A single key-set entry could not be turned into a verification key.
    ///
    /// Never returned from the provider; the entry is skipped instead.
    #[error("key {} skipped: {reason}", kid.as_deref().unwrap_or("<none>"))]
    KeyMaterialization {
        /// Key ID of the offending entry, if it had one.
        kid: Option<String>,
        /// Why the entry was rejected.
        reason: String,
    },

    /// The key ID is not part of the current key snapshot.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The current key snapshot is older than the configured ceiling.
    #[error("key set is stale ({age_seconds}s since last refresh)")]
    StaleKeySet {
        /// Seconds since the snapshot was fetched.
        age_seconds: u64,
    },

    /// The provider has been shut down.
    #[error("key provider shut down")]
    ShutDown,

    /// The JWT has expired.
    #[error("token expired")]
    TokenExpired,

    /// The JWT signature is invalid.
    #[error("invalid signature")]
    InvalidSignature,

    /// The JWT issuer does not match the expected value.
    #[error("invalid issuer")]
    InvalidIssuer,

    /// The JWT audience does not contain the expected value.
    #[error("invalid audience")]
    InvalidAudience,

    /// A required claim or header field is missing from the token.
    #[error("missing required claim: {0}")]
    MissingClaim(String),

    /// The token format is invalid.
    #[error("invalid token format: {0}")]
    InvalidToken(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns `true` if retrying later may succeed without changing the request.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed(_) | Self::KeyNotFound(_) | Self::StaleKeySet { .. }
        )
    }

    /// Returns `true` if the error describes the presented token rather than
    /// the state of the key provider.
    #[must_use]
    pub const fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired
                | Self::InvalidSignature
                | Self::InvalidIssuer
                | Self::InvalidAudience
                | Self::MissingClaim(_)
                | Self::InvalidToken(_)
                | Self::KeyNotFound(_)
        )
    }
}
