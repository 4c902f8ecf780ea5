//! Health check endpoint.
//!
//! This module provides the public health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use keyward_auth::JwtValidator;

use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Refresh failures since the last successful key load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_refresh_failures: Option<u32>,
}

/// Health check handler.
///
/// Reports `degraded` while key refreshes are failing. The gateway keeps
/// serving the last good keys in that state, so the status code stays 200.
/// This endpoint is public and does not require authentication.
///
/// # Example
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "key_refresh_failures": 0
/// }
/// ```
pub async fn health<V>(State(state): State<Arc<GatewayState<V>>>) -> impl IntoResponse
where
    V: JwtValidator + 'static,
{
    let failures = state
        .key_provider
        .as_ref()
        .map(|provider| provider.status().consecutive_failures);

    let response = HealthResponse {
        status: if failures.unwrap_or(0) > 0 {
            "degraded"
        } else {
            "healthy"
        },
        version: env!("CARGO_PKG_VERSION"),
        key_refresh_failures: failures,
    };

    (StatusCode::OK, Json(response))
}
