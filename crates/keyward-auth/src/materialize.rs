//! Conversion of key-set entries into verification keys.
//!
//! Each entry carries its key as an X.509 certificate chain (`x5c`). The first
//! certificate is wrapped in PEM delimiters and its public key extracted by
//! `jsonwebtoken`. A bad entry is rejected on its own; it never spoils the
//! rest of the document.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::prelude::*;
use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation};
use serde::de::DeserializeOwned;

use crate::error::{AuthError, Result};
use crate::fetch::{KeyEntry, KeySetDocument};

const CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const CERT_END: &str = "-----END CERTIFICATE-----";
const PEM_LINE_WIDTH: usize = 64;

const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];
const EC_ALGORITHMS: &[Algorithm] = &[Algorithm::ES256, Algorithm::ES384];

/// Supported public key families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// RSA keys (`RS*`/`PS*` signatures).
    Rsa,
    /// Elliptic curve keys (`ES*` signatures).
    Ec,
}

impl KeyFamily {
    /// Signature algorithms usable with keys of this family.
    #[must_use]
    pub const fn algorithms(self) -> &'static [Algorithm] {
        match self {
            Self::Rsa => RSA_ALGORITHMS,
            Self::Ec => EC_ALGORITHMS,
        }
    }
}

/// A public key ready for signature verification.
#[derive(Clone)]
pub enum VerificationKey {
    /// RSA public key.
    Rsa(DecodingKey),
    /// Elliptic curve public key.
    Ec(DecodingKey),
}

impl VerificationKey {
    /// The key family.
    #[must_use]
    pub const fn family(&self) -> KeyFamily {
        match self {
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::Ec(_) => KeyFamily::Ec,
        }
    }

    /// The underlying `jsonwebtoken` key.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        match self {
            Self::Rsa(key) | Self::Ec(key) => key,
        }
    }

    /// Whether tokens signed with `algorithm` can be verified with this key.
    #[must_use]
    pub fn supports(&self, algorithm: Algorithm) -> bool {
        self.family().algorithms().contains(&algorithm)
    }

    /// Verify `token` against this key and decode its claims.
    ///
    /// # Errors
    ///
    /// Returns the `jsonwebtoken` error if the signature or any check
    /// configured in `validation` fails.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> jsonwebtoken::errors::Result<TokenData<T>> {
        jsonwebtoken::decode(token, self.decoding_key(), validation)
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VerificationKey")
            .field(&self.family())
            .finish()
    }
}

/// Keys materialized from one document.
#[derive(Debug, Default)]
pub struct MaterializedKeys {
    /// Usable keys by key ID. Later duplicates replace earlier ones.
    pub keys: HashMap<String, Arc<VerificationKey>>,
    /// Entries that were skipped, as `AuthError::KeyMaterialization`.
    pub skipped: Vec<AuthError>,
}

/// Materialize every entry of `document`, skipping the ones that fail.
#[must_use]
pub fn materialize_document(document: &KeySetDocument) -> MaterializedKeys {
    let mut result = MaterializedKeys::default();

    for entry in &document.keys {
        match materialize(entry) {
            Ok((kid, key)) => {
                if result.keys.insert(kid.clone(), Arc::new(key)).is_some() {
                    tracing::warn!(kid = %kid, "Duplicate key ID in key set, keeping the later entry");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Skipping key set entry");
                result.skipped.push(err);
            }
        }
    }

    result
}

/// Materialize a single entry into its key ID and verification key.
///
/// # Errors
///
/// Returns `AuthError::KeyMaterialization` if the entry has no key ID, is not
/// a signing key, has no certificate, or its certificate does not hold a
/// supported public key.
pub fn materialize(entry: &KeyEntry) -> Result<(String, VerificationKey)> {
    let reject = |reason: String| AuthError::KeyMaterialization {
        kid: entry.kid.clone(),
        reason,
    };

    let kid = match entry.kid.as_deref() {
        Some(kid) if !kid.is_empty() => kid.to_string(),
        _ => return Err(reject("missing kid".to_string())),
    };

    if let Some(key_use) = entry.key_use.as_deref() {
        if key_use != "sig" {
            return Err(reject(format!("key use {key_use:?} is not \"sig\"")));
        }
    }

    let cert = entry
        .x5c
        .first()
        .ok_or_else(|| reject("empty certificate chain".to_string()))?;
    let pem = certificate_pem(cert).map_err(reject)?;

    let key = match entry.kty.as_deref() {
        Some("RSA") => rsa_key(&pem),
        Some("EC") => ec_key(&pem),
        None => rsa_key(&pem).or_else(|_| ec_key(&pem)),
        Some(other) => return Err(reject(format!("unsupported key type {other:?}"))),
    }
    .map_err(|e| reject(format!("certificate does not hold a usable public key: {e}")))?;

    Ok((kid, key))
}

fn rsa_key(pem: &str) -> jsonwebtoken::errors::Result<VerificationKey> {
    DecodingKey::from_rsa_pem(pem.as_bytes()).map(VerificationKey::Rsa)
}

fn ec_key(pem: &str) -> jsonwebtoken::errors::Result<VerificationKey> {
    DecodingKey::from_ec_pem(pem.as_bytes()).map(VerificationKey::Ec)
}

/// Wrap a base64 DER certificate in PEM delimiters with 64-column lines.
fn certificate_pem(cert: &str) -> std::result::Result<String, String> {
    let compact: String = cert.chars().filter(|c| !c.is_whitespace()).collect();
    let der = BASE64_STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| format!("invalid base64 certificate: {e}"))?;
    if der.is_empty() {
        return Err("empty certificate".to_string());
    }

    let body = BASE64_STANDARD.encode(der);
    let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 64);
    pem.push_str(CERT_BEGIN);
    pem.push('\n');
    for (i, ch) in body.chars().enumerate() {
        if i > 0 && i % PEM_LINE_WIDTH == 0 {
            pem.push('\n');
        }
        pem.push(ch);
    }
    pem.push('\n');
    pem.push_str(CERT_END);
    pem.push('\n');

    Ok(pem)
}
