//! Keyward Gateway - HTTP API gateway
//!
//! This is the main entry point for the gateway service. Configuration is
//! read from environment variables (see [`GatewayConfig::from_lookup`]).
//!
//! # Dev Mode
//!
//! Build with `--features dev-mode` to use a mock JWT validator that doesn't
//! require network access to the identity provider. Use tokens in format
//! `test-token:<subject>`. The admin endpoints answer `not_found` in this mode.

use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "dev-mode")]
use keyward_auth::MockJwtValidator;
#[cfg(not(feature = "dev-mode"))]
use keyward_auth::{KeyProvider, KeySetValidator};
use keyward_gateway::{create_router, GatewayConfig, GatewayState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,keyward=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Keyward Gateway");

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        issuer = %config.issuer,
        audience = %config.audience,
        key_set_uri = ?config.provider.key_set_uri,
        metadata_uri = ?config.provider.metadata_uri,
        admin_enabled = config.admin_api_key.is_some(),
        "Gateway configuration loaded"
    );

    // Initialize JWT validator
    #[cfg(feature = "dev-mode")]
    let (jwt_validator, key_provider) = {
        tracing::warn!("DEV MODE ENABLED - using mock JWT validator");
        tracing::warn!("Use tokens in format: test-token:<subject>");
        let validator = MockJwtValidator {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        };
        (Arc::new(validator), None)
    };

    #[cfg(not(feature = "dev-mode"))]
    let (jwt_validator, key_provider) = {
        let provider = Arc::new(KeyProvider::new(&config.provider).await?);
        let validator = KeySetValidator::new(
            Arc::clone(&provider),
            config.issuer.clone(),
            config.audience.clone(),
        );
        (Arc::new(validator), Some(provider))
    };
    tracing::info!("JWT validator initialized");

    let listen_addr = config.listen_addr.clone();
    let state = GatewayState::new(jwt_validator, key_provider.clone(), config);
    let app = create_router(state);

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(provider) = key_provider {
        provider.shutdown();
    }
    tracing::info!("Gateway shutdown complete");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received SIGINT, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for SIGINT"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
