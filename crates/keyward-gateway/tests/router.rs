//! Router integration tests.
//!
//! Drives the full router with `tower::ServiceExt::oneshot`, both with the
//! mock validator and with a real key provider over an in-memory key source.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use keyward_auth::{
    KeyEntry, KeyProvider, KeySetDocument, KeySetSource, KeySetValidator, MockJwtValidator,
    ProviderConfig,
};
use keyward_gateway::{create_router, GatewayConfig, GatewayState};

const ISSUER: &str = "https://idp.example.com";
const AUDIENCE: &str = "keyward";
const ADMIN_KEY: &str = "operator-secret";

const RSA_CERT_PEM: &str = include_str!("../../keyward-auth/tests/fixtures/rsa_cert.pem");
const RSA_KEY_PEM: &str = include_str!("../../keyward-auth/tests/fixtures/rsa_key.pem");
const RSA_OTHER_KEY_PEM: &str =
    include_str!("../../keyward-auth/tests/fixtures/rsa_other_key.pem");

/// Key source serving the fixture certificate under a fixed key ID.
struct StaticSource;

#[async_trait]
impl KeySetSource for StaticSource {
    async fn fetch_key_set(&self) -> keyward_auth::Result<KeySetDocument> {
        let x5c: String = RSA_CERT_PEM
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .map(str::trim)
            .collect();
        Ok(KeySetDocument {
            keys: vec![KeyEntry {
                kty: Some("RSA".to_string()),
                key_use: Some("sig".to_string()),
                kid: Some("kid-1".to_string()),
                x5c: vec![x5c],
            }],
        })
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

fn config() -> GatewayConfig {
    let mut config = GatewayConfig::new(
        ISSUER,
        AUDIENCE,
        ProviderConfig::key_set("https://idp.example.com/keys"),
    );
    config.admin_api_key = Some(ADMIN_KEY.to_string());
    config
}

fn mock_app() -> Router {
    create_router(GatewayState::new(
        Arc::new(MockJwtValidator::default()),
        None,
        config(),
    ))
}

async fn provider_app() -> Router {
    let provider = Arc::new(
        KeyProvider::builder(Arc::new(StaticSource))
            .start()
            .await
            .unwrap(),
    );
    let validator = KeySetValidator::new(Arc::clone(&provider), ISSUER, AUDIENCE);
    create_router(GatewayState::new(
        Arc::new(validator),
        Some(provider),
        config(),
    ))
}

fn sign(kid: &str, private_pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let claims = json!({
        "sub": "user-42",
        "iss": ISSUER,
        "aud": [AUDIENCE],
        "exp": jsonwebtoken::get_current_timestamp() + 600,
    });
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    encode(&header, &claims, &key).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("request should succeed");
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with(uri: &str, header: &str, value: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header, value)
        .body(Body::empty())
        .unwrap()
}

fn unauthorized() -> Value {
    json!({"error": {"code": "unauthorized"}})
}

#[tokio::test]
async fn health_is_public() {
    let (status, body) = send(mock_app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn unknown_route_is_json_not_found() {
    let (status, body) = send(mock_app(), get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": {"code": "not_found"}}));
}

#[tokio::test]
async fn whoami_requires_token() {
    let (status, body) = send(mock_app(), get("/v1/whoami")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, unauthorized());
}

#[tokio::test]
async fn whoami_rejects_other_schemes() {
    let request = get_with("/v1/whoami", "authorization", "Basic dXNlcjpwYXNz");
    let (status, body) = send(mock_app(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, unauthorized());
}

#[tokio::test]
async fn whoami_with_mock_token() {
    let request = get_with("/v1/whoami", "authorization", "Bearer test-token:alice");
    let (status, body) = send(mock_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subject"], "alice");
}

#[tokio::test]
async fn whoami_with_signed_token() {
    let token = sign("kid-1", RSA_KEY_PEM);
    let request = get_with("/v1/whoami", "authorization", &format!("Bearer {token}"));
    let (status, body) = send(provider_app().await, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subject"], "user-42");
    assert_eq!(body["data"]["key_id"], "kid-1");
    assert_eq!(body["data"]["audience"], json!([AUDIENCE]));
}

#[tokio::test]
async fn forged_or_unknown_keys_are_unauthorized() {
    let app = provider_app().await;

    let forged = sign("kid-1", RSA_OTHER_KEY_PEM);
    let request = get_with("/v1/whoami", "authorization", &format!("Bearer {forged}"));
    let (status, body) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, unauthorized());

    let unknown = sign("kid-9", RSA_KEY_PEM);
    let request = get_with("/v1/whoami", "authorization", &format!("Bearer {unknown}"));
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, unauthorized());
}

#[tokio::test]
async fn admin_requires_api_key() {
    let app = provider_app().await;

    let (status, body) = send(app.clone(), get("/admin/keys")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, unauthorized());

    let request = get_with("/admin/keys", "x-api-key", "wrong");
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_disabled_without_configured_key() {
    let mut config = config();
    config.admin_api_key = None;
    let app = create_router(GatewayState::new(
        Arc::new(MockJwtValidator::default()),
        None,
        config,
    ));

    let request = get_with("/admin/keys", "x-api-key", ADMIN_KEY);
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_key_status() {
    let request = get_with("/admin/keys", "x-api-key", ADMIN_KEY);
    let (status, body) = send(provider_app().await, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["source"], "static");
    assert_eq!(body["data"]["generation"], 1);
    assert_eq!(body["data"]["key_ids"], json!(["kid-1"]));
}

#[tokio::test]
async fn admin_refresh_reloads_keys() {
    let request = Request::builder()
        .method("POST")
        .uri("/admin/keys/refresh")
        .header("x-api-key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(provider_app().await, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["key_count"], 1);
    assert_eq!(body["data"]["generation"], 2);
}

#[tokio::test]
async fn admin_without_provider_is_not_found() {
    let request = get_with("/admin/keys", "x-api-key", ADMIN_KEY);
    let (status, body) = send(mock_app(), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": {"code": "not_found"}}));
}
