//! Key-set document retrieval.
//!
//! This module fetches the JWKS document from the identity provider, either
//! directly or by first resolving it through a metadata (discovery) document.
//! It decodes JSON but does not interpret key material.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::KeySource;
use crate::error::{AuthError, Result};

/// Key-set document published by the identity provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeySetDocument {
    /// The list of keys, in document order.
    pub keys: Vec<KeyEntry>,
}

/// A single entry of the key-set document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyEntry {
    /// Key type (e.g. "RSA", "EC").
    #[serde(default)]
    pub kty: Option<String>,
    /// Key use (e.g. "sig").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    /// Key ID.
    #[serde(default)]
    pub kid: Option<String>,
    /// Certificate chain, base64 DER. Only the first certificate is used.
    #[serde(default)]
    pub x5c: Vec<String>,
}

/// Metadata document pointing at the key-set document.
#[derive(Debug, Deserialize)]
struct MetadataDocument {
    jwks_uri: String,
}

/// Source of key-set documents.
///
/// The refresh scheduler only talks to this trait, so tests can drive it
/// without a network.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Retrieve and decode the current key-set document.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::FetchFailed` if the document cannot be retrieved
    /// or decoded.
    async fn fetch_key_set(&self) -> Result<KeySetDocument>;

    /// Human-readable description of where keys come from, for logs.
    fn describe(&self) -> String;
}

/// HTTP implementation of [`KeySetSource`].
pub struct HttpKeySetFetcher {
    source: KeySource,
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for `source` whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the HTTP client cannot be built.
    pub fn new(source: KeySource, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { source, client })
    }

    /// The configured key source.
    #[must_use]
    pub const fn source(&self) -> &KeySource {
        &self.source
    }

    /// Resolve the key-set URL, following the metadata document if configured.
    ///
    /// The result is never cached; every refresh resolves it again.
    async fn resolve_key_set_url(&self) -> Result<Url> {
        match &self.source {
            KeySource::KeySet(url) => Ok(url.clone()),
            KeySource::Discovery(metadata_url) => {
                let metadata: MetadataDocument = self.get_json(metadata_url).await?;
                let url = Url::parse(&metadata.jwks_uri).map_err(|e| {
                    AuthError::FetchFailed(format!(
                        "metadata document has invalid jwks_uri {:?}: {e}",
                        metadata.jwks_uri
                    ))
                })?;
                tracing::debug!(metadata_url = %metadata_url, jwks_url = %url, "Resolved JWKS URL");
                Ok(url)
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        tracing::debug!(url = %url, "Fetching document");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AuthError::FetchFailed(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::FetchFailed(format!(
                "{url} returned HTTP {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::FetchFailed(format!("invalid document from {url}: {e}")))
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetFetcher {
    async fn fetch_key_set(&self) -> Result<KeySetDocument> {
        let url = self.resolve_key_set_url().await?;
        let document: KeySetDocument = self.get_json(&url).await?;
        tracing::debug!(url = %url, entries = document.keys.len(), "Fetched key set");
        Ok(document)
    }

    fn describe(&self) -> String {
        match &self.source {
            KeySource::KeySet(url) => url.to_string(),
            KeySource::Discovery(url) => format!("{url} (discovery)"),
        }
    }
}
