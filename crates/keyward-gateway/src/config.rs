//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP gateway and
//! loads them from environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use keyward_auth::{AuthError, ProviderConfig, Result};

/// Default header carrying the operator API key.
pub const DEFAULT_ADMIN_KEY_HEADER: &str = "x-api-key";

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Expected token issuer (`iss`), matched exactly.
    pub issuer: String,

    /// Expected token audience (`aud`).
    pub audience: String,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// API key guarding the `/admin` endpoints. Unset disables them.
    #[serde(default)]
    pub admin_api_key: Option<String>,

    /// Header carrying the admin API key.
    #[serde(default = "GatewayConfig::default_admin_key_header")]
    pub admin_api_key_header: String,

    /// Key provider settings.
    pub provider: ProviderConfig,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    fn default_admin_key_header() -> String {
        DEFAULT_ADMIN_KEY_HEADER.to_string()
    }

    /// Create a configuration with defaults for everything but the token
    /// expectations and key source.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        provider: ProviderConfig,
    ) -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            issuer: issuer.into(),
            audience: audience.into(),
            request_timeout_seconds: Self::default_request_timeout(),
            admin_api_key: None,
            admin_api_key_header: Self::default_admin_key_header(),
            provider,
        }
    }

    /// Load the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if a required variable is missing or a
    /// numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through `lookup`.
    ///
    /// Reads `LISTEN_ADDR`, `AUTH_ISSUER`, `AUTH_AUDIENCE`, `AUTH_KEY_SET_URI`,
    /// `AUTH_METADATA_URI`, `AUTH_REFRESH_INTERVAL_SECONDS`,
    /// `AUTH_MIN_REFRESH_INTERVAL_SECONDS`, `AUTH_FETCH_TIMEOUT_SECONDS`,
    /// `AUTH_MAX_STALENESS_SECONDS`, `REQUEST_TIMEOUT_SECONDS`,
    /// `ADMIN_API_KEY` and `ADMIN_API_KEY_HEADER`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if a required variable is missing or a
    /// numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AuthError::Config(format!("{key} is not set")))
        };

        let mut provider = ProviderConfig {
            key_set_uri: lookup("AUTH_KEY_SET_URI"),
            metadata_uri: lookup("AUTH_METADATA_URI"),
            ..ProviderConfig::default()
        };
        if let Some(v) = parse_var(&lookup, "AUTH_REFRESH_INTERVAL_SECONDS")? {
            provider.refresh_interval_seconds = v;
        }
        if let Some(v) = parse_var(&lookup, "AUTH_MIN_REFRESH_INTERVAL_SECONDS")? {
            provider.min_refresh_interval_seconds = v;
        }
        if let Some(v) = parse_var(&lookup, "AUTH_FETCH_TIMEOUT_SECONDS")? {
            provider.fetch_timeout_seconds = v;
        }
        provider.max_staleness_seconds = parse_var(&lookup, "AUTH_MAX_STALENESS_SECONDS")?;

        let mut config = Self::new(required("AUTH_ISSUER")?, required("AUTH_AUDIENCE")?, provider);
        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(v) = parse_var(&lookup, "REQUEST_TIMEOUT_SECONDS")? {
            config.request_timeout_seconds = v;
        }
        config.admin_api_key = lookup("ADMIN_API_KEY").filter(|k| !k.is_empty());
        if let Some(header) = lookup("ADMIN_API_KEY_HEADER") {
            config.admin_api_key_header = header.to_ascii_lowercase();
        }

        Ok(config)
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| AuthError::Config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
