//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use keyward_auth::JwtValidator;

use crate::error::ApiError;
use crate::handlers::{health, identity, keys};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Authenticated (bearer token)
/// - `GET /v1/whoami` - Identity carried by the token
///
/// ## Admin (API key header)
/// - `GET /admin/keys` - Key provider status
/// - `POST /admin/keys/refresh` - Reload the key set now
///
/// Unknown routes answer `404` with the `not_found` error body, and a
/// panicking handler answers `500` with `internal_error`.
pub fn create_router<V>(state: GatewayState<V>) -> Router
where
    V: JwtValidator + 'static,
{
    let request_timeout = state.config.request_timeout();
    let state = Arc::new(state);

    let router = Router::new()
        // Health (public)
        .route("/health", get(health::health::<V>))
        // Identity
        .route("/v1/whoami", get(identity::whoami))
        // Admin
        .route("/admin/keys", get(keys::key_status::<V>))
        .route("/admin/keys/refresh", post(keys::refresh_keys::<V>))
        .fallback(not_found);

    with_middleware(router, request_timeout).with_state(state)
}

fn with_middleware<S>(router: Router<S>, request_timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(request_timeout))
            .layer(CatchPanicLayer::custom(panic_response)),
    )
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

#[allow(clippy::needless_pass_by_value)] // CatchPanicLayer hands over the payload by value
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");

    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn handler_panic_becomes_internal_error() {
        let app = with_middleware(
            Router::new().route("/explode", get(explode)),
            Duration::from_secs(5),
        );

        let response = app
            .oneshot(Request::builder().uri("/explode").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"error": {"code": "internal_error"}}));
    }
}
