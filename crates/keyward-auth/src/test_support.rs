//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;

use crate::error::{AuthError, Result};
use crate::fetch::{KeyEntry, KeySetDocument, KeySetSource};

pub(crate) const RSA_CERT_PEM: &str = include_str!("../tests/fixtures/rsa_cert.pem");
pub(crate) const RSA_KEY_PEM: &str = include_str!("../tests/fixtures/rsa_key.pem");
pub(crate) const RSA_OTHER_KEY_PEM: &str = include_str!("../tests/fixtures/rsa_other_key.pem");

/// Strip PEM delimiters and line breaks, leaving the `x5c` form.
pub(crate) fn x5c_from_pem(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect()
}

pub(crate) struct EcTestKey {
    pub x5c: String,
    pub private_pem: String,
}

/// Generate a self-signed P-256 certificate and its private key.
pub(crate) fn ec_test_key() -> EcTestKey {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let params = rcgen::CertificateParams::new(vec!["idp.example.com".to_string()]).unwrap();
    let cert = params.self_signed(&key_pair).unwrap();

    EcTestKey {
        x5c: BASE64_STANDARD.encode(cert.der()),
        private_pem: key_pair.serialize_pem(),
    }
}

pub(crate) fn entry(kid: &str, kty: Option<&str>, x5c: &str) -> KeyEntry {
    KeyEntry {
        kty: kty.map(str::to_string),
        key_use: Some("sig".to_string()),
        kid: Some(kid.to_string()),
        x5c: vec![x5c.to_string()],
    }
}

pub(crate) fn rsa_document(kids: &[&str]) -> KeySetDocument {
    let x5c = x5c_from_pem(RSA_CERT_PEM);
    KeySetDocument {
        keys: kids.iter().map(|kid| entry(kid, Some("RSA"), &x5c)).collect(),
    }
}

pub(crate) fn sign_rs256(kid: &str, claims: &serde_json::Value, private_pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Scripted key source returning queued results, then repeating the last one.
pub(crate) struct ScriptedSource {
    responses: Mutex<VecDeque<Result<KeySetDocument>>>,
    last: Mutex<Option<KeySetDocument>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new(responses: Vec<Result<KeySetDocument>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent fetch take `delay` (tokio time).
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Highest number of fetches observed running at once.
    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetSource for ScriptedSource {
    async fn fetch_key_set(&self) -> Result<KeySetDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let next = self.responses.lock().pop_front();
        match next {
            Some(Ok(document)) => {
                *self.last.lock() = Some(document.clone());
                Ok(document)
            }
            Some(Err(err)) => Err(err),
            None => self
                .last
                .lock()
                .clone()
                .ok_or_else(|| AuthError::FetchFailed("no scripted response".to_string())),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
