//! Caller identity endpoint.

use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::handlers::DataResponse;

/// Identity of the authenticated caller.
#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    /// Token subject.
    pub subject: String,
    /// Token issuer.
    pub issuer: String,
    /// Token audiences.
    pub audience: Vec<String>,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// Key that signed the token.
    pub key_id: String,
}

/// Return the identity carried by the caller's token.
///
/// ```text
/// GET /v1/whoami
/// Authorization: Bearer <token>
///
/// Response: 200 OK
/// {
///   "data": {
///     "subject": "user-42",
///     "issuer": "https://idp.example.com",
///     "audience": ["keyward"],
///     "expires_at": "2026-01-01T00:00:00Z",
///     "key_id": "kid-1"
///   }
/// }
/// ```
pub async fn whoami(user: AuthUser) -> Json<DataResponse<WhoAmIResponse>> {
    tracing::debug!(subject = %user.subject, key_id = %user.key_id, "Identity requested");

    Json(DataResponse::new(WhoAmIResponse {
        subject: user.subject,
        issuer: user.issuer,
        audience: user.audience,
        expires_at: user.expires_at,
        key_id: user.key_id,
    }))
}
