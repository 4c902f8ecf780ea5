//! HTTP gateway authenticating requests with rotating identity provider keys.
//!
//! This crate wires a [`keyward_auth::KeyProvider`] into an axum service. It
//! handles:
//!
//! - Bearer token extraction and validation
//! - A uniform JSON error envelope
//! - Operator endpoints to inspect and reload the key set
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    keyward-gateway                          │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  AuthUser   │ │   Router    │ │    Admin (API key)  │    │
//! │  │  Extractor  │ │  + Handlers │ │    /admin/keys      │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                       ┌──────────────┐       ┌──────────────┐
//!                       │ KeyProvider  │──────▶│  Identity    │
//!                       │ (keyward-auth)│ HTTPS │  provider    │
//!                       └──────────────┘       └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyward_auth::{KeyProvider, KeySetValidator, ProviderConfig};
//! use keyward_gateway::{create_router, GatewayConfig, GatewayState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::new(
//!     "https://idp.example.com",
//!     "my-api",
//!     ProviderConfig::key_set("https://idp.example.com/.well-known/jwks.json"),
//! );
//! let provider = Arc::new(KeyProvider::new(&config.provider).await?);
//! let validator = Arc::new(KeySetValidator::new(
//!     Arc::clone(&provider),
//!     config.issuer.clone(),
//!     config.audience.clone(),
//! ));
//!
//! let app = create_router(GatewayState::new(validator, Some(provider), config));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;

// Re-export key types for convenience
pub use auth::{AdminAccess, AuthUser};
