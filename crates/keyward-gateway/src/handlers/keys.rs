//! Operator endpoints for the key provider.
//!
//! Both endpoints require the admin API key.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use keyward_auth::{JwtValidator, KeyProvider, ProviderStatus};

use crate::auth::AdminAccess;
use crate::error::ApiError;
use crate::handlers::DataResponse;
use crate::state::GatewayState;

/// Result of an operator-triggered refresh.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// Keys in the newly installed snapshot.
    pub key_count: usize,
    /// Generation of the newly installed snapshot.
    pub generation: u64,
}

fn provider<V: JwtValidator>(state: &GatewayState<V>) -> Result<&Arc<KeyProvider>, ApiError> {
    state.key_provider.as_ref().ok_or(ApiError::NotFound)
}

/// Report the key provider status.
///
/// # Errors
///
/// Returns `not_found` when the gateway runs without a key provider.
pub async fn key_status<V>(
    _admin: AdminAccess,
    State(state): State<Arc<GatewayState<V>>>,
) -> Result<Json<DataResponse<ProviderStatus>>, ApiError>
where
    V: JwtValidator + 'static,
{
    let provider = provider(&state)?;
    Ok(Json(DataResponse::new(provider.status())))
}

/// Reload the key set now, bypassing the refresh rate limit.
///
/// # Errors
///
/// Returns `not_found` without a key provider and `internal_error` if the
/// reload fails. The previous keys stay in use after a failure.
pub async fn refresh_keys<V>(
    _admin: AdminAccess,
    State(state): State<Arc<GatewayState<V>>>,
) -> Result<Json<DataResponse<RefreshResponse>>, ApiError>
where
    V: JwtValidator + 'static,
{
    let provider = provider(&state)?;
    tracing::info!("Operator requested key set reload");

    let key_count = provider
        .refresh_now()
        .await
        .map_err(|e| ApiError::Internal(format!("key set reload failed: {e}")))?;

    Ok(Json(DataResponse::new(RefreshResponse {
        key_count,
        generation: provider.status().generation,
    })))
}
