//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use keyward_auth::{JwtValidator, KeyProvider};

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
pub struct GatewayState<V>
where
    V: JwtValidator,
{
    /// The JWT validator for authentication.
    pub jwt_validator: Arc<V>,
    /// The key provider behind the validator, for the admin endpoints.
    ///
    /// `None` when the validator does not use one (dev mode).
    pub key_provider: Option<Arc<KeyProvider>>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<V> GatewayState<V>
where
    V: JwtValidator,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(
        jwt_validator: Arc<V>,
        key_provider: Option<Arc<KeyProvider>>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            jwt_validator,
            key_provider,
            config,
        }
    }
}

impl<V> Clone for GatewayState<V>
where
    V: JwtValidator,
{
    fn clone(&self) -> Self {
        Self {
            jwt_validator: Arc::clone(&self.jwt_validator),
            key_provider: self.key_provider.clone(),
            config: self.config.clone(),
        }
    }
}
