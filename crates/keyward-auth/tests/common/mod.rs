//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ISSUER: &str = "https://idp.example.com";
pub const AUDIENCE: &str = "keyward";

pub const RSA_CERT_PEM: &str = include_str!("../fixtures/rsa_cert.pem");
pub const RSA_KEY_PEM: &str = include_str!("../fixtures/rsa_key.pem");
pub const RSA_OTHER_KEY_PEM: &str = include_str!("../fixtures/rsa_other_key.pem");

/// Strip PEM delimiters and line breaks, leaving the `x5c` form.
pub fn x5c() -> String {
    RSA_CERT_PEM
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect()
}

/// A signing key entry for `kid` carrying the fixture certificate.
pub fn key_entry(kid: &str) -> Value {
    json!({
        "kty": "RSA",
        "use": "sig",
        "kid": kid,
        "x5c": [x5c()],
    })
}

/// A key-set document holding the fixture certificate under each of `kids`.
pub fn key_set(kids: &[&str]) -> Value {
    json!({ "keys": kids.iter().map(|kid| key_entry(kid)).collect::<Vec<_>>() })
}

/// Serve `body` at `route` on `server`.
pub async fn serve_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Claims accepted by a validator for [`ISSUER`] and [`AUDIENCE`].
pub fn claims(subject: &str) -> Value {
    json!({
        "sub": subject,
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": jsonwebtoken::get_current_timestamp() + 600,
    })
}

/// Sign `claims` with RS256 under `kid`.
pub fn sign(kid: &str, claims: &Value, private_pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}
