//! Authentication extractors.
//!
//! [`AuthUser`] validates the bearer token of a request. [`AdminAccess`]
//! checks the operator API key header.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};

use keyward_auth::{JwtValidator, ValidatedClaims};

use crate::error::ApiError;
use crate::state::GatewayState;

/// An authenticated caller extracted from a JWT.
///
/// This extractor validates the `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The token subject.
    pub subject: String,
    /// The token issuer.
    pub issuer: String,
    /// Audiences the token was issued for.
    pub audience: Vec<String>,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
    /// ID of the key that signed the token.
    pub key_id: String,
}

impl AuthUser {
    /// Create an `AuthUser` from validated claims.
    #[must_use]
    pub fn from_claims(claims: ValidatedClaims) -> Self {
        Self {
            subject: claims.subject,
            issuer: claims.issuer,
            audience: claims.audience,
            expires_at: claims.expires_at,
            key_id: claims.key_id,
        }
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl<V> FromRequestParts<Arc<GatewayState<V>>> for AuthUser
where
    V: JwtValidator + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState<V>>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or(ApiError::Unauthorized)?;

        let claims = state.jwt_validator.validate(token).await?;

        Ok(Self::from_claims(claims))
    }
}

/// Proof that the request carried the configured admin API key.
///
/// Rejects every request when no key is configured.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

#[async_trait]
impl<V> FromRequestParts<Arc<GatewayState<V>>> for AdminAccess
where
    V: JwtValidator + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState<V>>,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .config
            .admin_api_key
            .as_deref()
            .ok_or(ApiError::Unauthorized)?;

        let presented = parts
            .headers
            .get(state.config.admin_api_key_header.as_str())
            .and_then(|v| v.to_str().ok());

        if presented == Some(expected) {
            Ok(Self)
        } else {
            tracing::warn!("Rejected admin request with missing or wrong API key");
            Err(ApiError::Unauthorized)
        }
    }
}
