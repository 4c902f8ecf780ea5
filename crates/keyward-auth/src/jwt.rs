//! JWT validation and claims extraction.
//!
//! Issuer and audience are checked on the unverified payload before any key is
//! looked up, so tokens minted for another domain never cause key refreshes.
//! Only then is the signing key resolved and the signature verified.

use std::sync::Arc;

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode_header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::provider::KeyProvider;

/// Validated claims extracted from a JWT.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedClaims {
    /// The `sub` claim.
    pub subject: String,
    /// The `iss` claim.
    pub issuer: String,
    /// Every value of the `aud` claim.
    pub audience: Vec<String>,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
    /// ID of the key that verified the signature.
    pub key_id: String,
    /// Remaining claims, untouched.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Trait for validating JWTs.
#[async_trait]
pub trait JwtValidator: Send + Sync {
    /// Validate a JWT and extract claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid, expired, or cannot be validated.
    async fn validate(&self, token: &str) -> Result<ValidatedClaims>;
}

/// Audience claim that can be either a string or array.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Multiple(Vec<String>),
    #[default]
    None,
}

impl Audience {
    fn contains(&self, value: &str) -> bool {
        match self {
            Self::Single(s) => s == value,
            Self::Multiple(v) => v.iter().any(|s| s == value),
            Self::None => false,
        }
    }

    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s],
            Self::Multiple(v) => v,
            Self::None => Vec::new(),
        }
    }
}

/// Claims read before the signature is checked.
#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Audience,
}

/// Claims decoded after the signature and expiry checks passed.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    iss: String,
    #[serde(default)]
    aud: Audience,
    exp: u64,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

fn unverified_claims(token: &str) -> Result<UnverifiedClaims> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken("expected three segments".to_string()));
    };

    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::InvalidToken(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("payload is not a claims object: {e}")))
}

/// Validator that verifies signatures with keys from a [`KeyProvider`].
pub struct KeySetValidator {
    provider: Arc<KeyProvider>,
    issuer: String,
    audience: String,
}

impl KeySetValidator {
    /// Create a validator accepting tokens from `issuer` addressed to `audience`.
    #[must_use]
    pub fn new(
        provider: Arc<KeyProvider>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// The key provider backing this validator.
    #[must_use]
    pub const fn provider(&self) -> &Arc<KeyProvider> {
        &self.provider
    }

    /// Expected issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Expected audience.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }
}

#[async_trait]
impl JwtValidator for KeySetValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::MissingClaim("kid".to_string()))?;

        let unverified = unverified_claims(token)?;
        let issuer = unverified
            .iss
            .ok_or_else(|| AuthError::MissingClaim("iss".to_string()))?;
        if issuer != self.issuer {
            tracing::debug!(issuer = %issuer, "Token issuer does not match");
            return Err(AuthError::InvalidIssuer);
        }
        if !unverified.aud.contains(&self.audience) {
            return Err(AuthError::InvalidAudience);
        }

        let key = self.provider.get_key(&kid)?;
        if !key.supports(header.alg) {
            return Err(AuthError::InvalidToken(format!(
                "algorithm {:?} cannot be used with key {kid}",
                header.alg
            )));
        }

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        // Audience was checked above; it may be a string or an array
        validation.validate_aud = false;
        validation.validate_exp = true;

        let token_data = key
            .verify::<RawClaims>(token, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
                _ => AuthError::InvalidToken(e.to_string()),
            })?;

        let claims = token_data.claims;
        let subject = claims
            .sub
            .ok_or_else(|| AuthError::MissingClaim("sub".to_string()))?;

        let exp_secs = i64::try_from(claims.exp).unwrap_or(i64::MAX);
        let expires_at = DateTime::from_timestamp(exp_secs, 0)
            .ok_or_else(|| AuthError::InvalidToken("invalid exp timestamp".to_string()))?;

        Ok(ValidatedClaims {
            subject,
            issuer: claims.iss,
            audience: claims.aud.into_vec(),
            expires_at,
            key_id: kid,
            extra: claims.extra,
        })
    }
}

/// A mock JWT validator for testing.
///
/// Accepts any token of the form `test-token:<subject>`.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockJwtValidator {
    /// Issuer reported on every validated token.
    pub issuer: String,
    /// Audience reported on every validated token.
    pub audience: String,
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockJwtValidator {
    fn default() -> Self {
        Self {
            issuer: "https://idp.example.com".to_string(),
            audience: "keyward".to_string(),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl JwtValidator for MockJwtValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let subject = token
            .strip_prefix("test-token:")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::InvalidToken("expected test-token:<subject>".to_string()))?;

        Ok(ValidatedClaims {
            subject: subject.to_string(),
            issuer: self.issuer.clone(),
            audience: vec![self.audience.clone()],
            expires_at: Utc::now() + chrono::Duration::hours(1),
            key_id: "mock".to_string(),
            extra: serde_json::Map::new(),
        })
    }
}
