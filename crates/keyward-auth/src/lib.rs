//! Rotating verification keys for JWT authentication.
//!
//! This crate keeps a local, periodically refreshed copy of an identity
//! provider's published signing keys, including:
//!
//! - Key-set fetching, directly or through a metadata (`jwks_uri`) document
//! - X.509 certificate (`x5c`) parsing into RSA and EC verification keys
//! - Snapshot caching with lock-free lookups for readers
//! - Background refresh with rate-limited early refresh on unknown key IDs
//! - JWT validation against the cached keys
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│   JwtValidator   │
//! │   (HTTP)         │     │   (trait)        │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │ KeySetValidator  │
//!                          │  (impl)          │
//!                          └────────┬─────────┘
//!                                   │ get_key(kid)
//!                          ┌────────▼─────────┐      ┌──────────────────┐
//!                          │   KeyProvider    │─────▶│ RefreshScheduler │
//!                          │  (KeyCache)      │◀─────│  (background)    │
//!                          └──────────────────┘ swap └────────┬─────────┘
//!                                                             │ HTTPS
//!                                                    ┌────────▼─────────┐
//!                                                    │ Identity provider│
//!                                                    │ key set endpoint │
//!                                                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use keyward_auth::{JwtValidator, KeyProvider, KeySetValidator, ProviderConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProviderConfig::discovery(
//!     "https://idp.example.com/.well-known/openid-configuration",
//! );
//! let provider = Arc::new(KeyProvider::new(&config).await?);
//! let validator = KeySetValidator::new(provider, "https://idp.example.com", "my-api");
//!
//! // In a request handler:
//! let token = "eyJhbGciOiJSUzI1NiIsImtpZCI6Ii4uLiJ9...";
//! let claims = validator.validate(token).await?;
//!
//! println!("Subject: {}", claims.subject);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod jwt;
pub mod materialize;
pub mod provider;
pub mod refresh;

#[cfg(test)]
mod test_support;

pub use cache::{KeyCache, KeySnapshot};
pub use config::{KeySource, ProviderConfig, RefreshPolicy, MIN_REFRESH_FLOOR};
pub use error::{AuthError, Result};
pub use fetch::{HttpKeySetFetcher, KeyEntry, KeySetDocument, KeySetSource};
pub use jwt::{JwtValidator, KeySetValidator, ValidatedClaims};
pub use materialize::{KeyFamily, VerificationKey};
pub use provider::{KeyProvider, KeyProviderBuilder, ProviderStatus};
pub use refresh::{NoopObserver, RefreshObserver};

#[cfg(any(test, feature = "test-utils"))]
pub use jwt::MockJwtValidator;
