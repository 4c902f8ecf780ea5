//! Key provider configuration.
//!
//! `ProviderConfig` is the raw, deserializable surface. [`ProviderConfig::validate`]
//! turns it into the [`KeySource`] to fetch from and the [`RefreshPolicy`] the
//! scheduler runs with.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{AuthError, Result};

/// Lowest refresh interval accepted, regardless of configuration.
///
/// Bounds the request rate against the identity provider.
pub const MIN_REFRESH_FLOOR: Duration = Duration::from_secs(60);

/// Configuration for a [`KeyProvider`](crate::KeyProvider).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// URL of the key-set document (e.g. `https://idp/.well-known/jwks.json`).
    #[serde(default)]
    pub key_set_uri: Option<String>,

    /// URL of a metadata document whose `jwks_uri` names the key-set document.
    #[serde(default)]
    pub metadata_uri: Option<String>,

    /// Steady-state refresh interval, in seconds.
    #[serde(default = "ProviderConfig::default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// Minimum time between on-demand refreshes and retry delay after a
    /// failed refresh, in seconds.
    #[serde(default = "ProviderConfig::default_min_refresh_interval")]
    pub min_refresh_interval_seconds: u64,

    /// Timeout for each HTTP request, in seconds.
    #[serde(default = "ProviderConfig::default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,

    /// Refuse to serve keys older than this many seconds.
    #[serde(default)]
    pub max_staleness_seconds: Option<u64>,
}

impl ProviderConfig {
    const fn default_refresh_interval() -> u64 {
        3600 // 1 hour
    }

    const fn default_min_refresh_interval() -> u64 {
        60
    }

    const fn default_fetch_timeout() -> u64 {
        10
    }

    /// Configuration fetching the key set directly from `uri`.
    #[must_use]
    pub fn key_set(uri: impl Into<String>) -> Self {
        Self {
            key_set_uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Configuration discovering the key set through the metadata document at `uri`.
    #[must_use]
    pub fn discovery(uri: impl Into<String>) -> Self {
        Self {
            metadata_uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if neither or both URIs are set, a URI is
    /// empty or not an `http`/`https` URL, the fetch timeout is zero, or the
    /// staleness ceiling is shorter than the refresh interval.
    pub fn validate(&self) -> Result<(KeySource, RefreshPolicy)> {
        let source = match (self.key_set_uri.as_deref(), self.metadata_uri.as_deref()) {
            (Some(uri), None) => KeySource::KeySet(parse_uri("key_set_uri", uri)?),
            (None, Some(uri)) => KeySource::Discovery(parse_uri("metadata_uri", uri)?),
            (None, None) => {
                return Err(AuthError::Config(
                    "one of key_set_uri or metadata_uri is required".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(AuthError::Config(
                    "key_set_uri and metadata_uri are mutually exclusive".to_string(),
                ))
            }
        };

        if self.fetch_timeout_seconds == 0 {
            return Err(AuthError::Config(
                "fetch_timeout_seconds must be greater than zero".to_string(),
            ));
        }

        let mut policy = RefreshPolicy::new(
            Duration::from_secs(self.refresh_interval_seconds),
            Duration::from_secs(self.min_refresh_interval_seconds),
        );
        policy.fetch_timeout = Duration::from_secs(self.fetch_timeout_seconds);

        if let Some(ceiling) = self.max_staleness_seconds {
            let ceiling = Duration::from_secs(ceiling);
            if ceiling < policy.refresh_interval {
                return Err(AuthError::Config(format!(
                    "max_staleness_seconds ({}) must not be shorter than the refresh interval ({})",
                    ceiling.as_secs(),
                    policy.refresh_interval.as_secs()
                )));
            }
            policy.max_staleness = Some(ceiling);
        }

        Ok((source, policy))
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            key_set_uri: None,
            metadata_uri: None,
            refresh_interval_seconds: Self::default_refresh_interval(),
            min_refresh_interval_seconds: Self::default_min_refresh_interval(),
            fetch_timeout_seconds: Self::default_fetch_timeout(),
            max_staleness_seconds: None,
        }
    }
}

fn parse_uri(field: &str, raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AuthError::Config(format!("{field} must not be empty")));
    }

    let url = Url::parse(raw).map_err(|e| AuthError::Config(format!("{field}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AuthError::Config(format!(
            "{field}: unsupported scheme {other:?}"
        ))),
    }
}

/// Where the key-set document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Fetch the key-set document directly.
    KeySet(Url),
    /// Fetch a metadata document first and follow its `jwks_uri`.
    Discovery(Url),
}

impl KeySource {
    /// The configured URL, whichever mode is in use.
    #[must_use]
    pub const fn url(&self) -> &Url {
        match self {
            Self::KeySet(url) | Self::Discovery(url) => url,
        }
    }
}

/// Normalized refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Steady-state interval between scheduled refreshes.
    pub refresh_interval: Duration,
    /// Cooldown for on-demand refreshes and retry delay after a failure.
    pub min_refresh_interval: Duration,
    /// Per-request HTTP timeout.
    pub fetch_timeout: Duration,
    /// Optional ceiling on snapshot age; lookups fail once exceeded.
    pub max_staleness: Option<Duration>,
}

impl RefreshPolicy {
    /// Build a policy, raising intervals to [`MIN_REFRESH_FLOOR`] where needed.
    ///
    /// The steady-state interval is never shorter than the minimum interval.
    #[must_use]
    pub fn new(refresh_interval: Duration, min_refresh_interval: Duration) -> Self {
        let min_refresh_interval = min_refresh_interval.max(MIN_REFRESH_FLOOR);
        Self {
            refresh_interval: refresh_interval.max(min_refresh_interval),
            min_refresh_interval,
            fetch_timeout: Duration::from_secs(ProviderConfig::default_fetch_timeout()),
            max_staleness: None,
        }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(ProviderConfig::default_refresh_interval()),
            Duration::from_secs(ProviderConfig::default_min_refresh_interval()),
        )
    }
}
