// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker bearer tokens: ES256 JWTs pinned to PEM certificates.
//!
//! Each file in the trust directory is an X.509 certificate. Its key id is
//! the SHA-256 of the certificate's SubjectPublicKeyInfo; tokens select a
//! certificate via the `kid` header. The certificate's organizational-unit
//! attributes become the worker's `allowed_tags`.

use std::collections::HashMap;
use std::path::Path;

use base64::Engine as _;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::ApiError;

/// Identity a bearer token proves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerJwt {
    pub name: String,
    pub allowed_tags: Vec<String>,
}

struct TrustedCert {
    decoding: DecodingKey,
    allowed_tags: Vec<String>,
}

/// The trust directory, loaded once at startup.
pub struct KeyDir {
    keys: HashMap<String, TrustedCert>,
}

fn spki_pem(spki_der: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(spki_der);
    let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
    for chunk in b64.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

impl KeyDir {
    pub fn load(dir: &Path) -> Self {
        let mut keys = HashMap::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => {
                tracing::info!(dir = %dir.display(), "no worker JWT certificates defined");
                return Self { keys };
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match std::fs::read(&path).map_err(|e| e.to_string()).and_then(|raw| {
                parse_certificate(&raw).map_err(|e| e.to_string())
            }) {
                Ok((kid, cert)) => {
                    keys.insert(kid, cert);
                }
                Err(err) => {
                    tracing::error!(file = %path.display(), %err, "unable to read certificate");
                }
            }
        }
        Self { keys }
    }

    #[cfg(test)]
    pub(crate) fn kids(&self) -> Vec<String> {
        self.keys.keys().cloned().collect()
    }

    /// Verify a bearer token and extract the worker identity. `exp` and
    /// `name` claims are required.
    pub fn worker_from_jwt(&self, token: &str) -> Result<WorkerJwt, ApiError> {
        let header = decode_header(token)
            .map_err(|e| ApiError::AuthInvalid(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| {
                ApiError::AuthInvalid("Token is missing required `kid` header".to_string())
            })?;
        let cert = self
            .keys
            .get(&kid)
            .ok_or_else(|| ApiError::AuthInvalid(format!("No certificate found with id {kid}")))?;

        #[derive(Deserialize)]
        struct Claims {
            name: Option<String>,
        }

        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_required_spec_claims(&["exp"]);
        let data = decode::<Claims>(token, &cert.decoding, &validation)
            .map_err(|e| ApiError::AuthInvalid(e.to_string()))?;
        let name = data
            .claims
            .name
            .ok_or_else(|| ApiError::AuthInvalid("Missing required claim: name".to_string()))?;
        Ok(WorkerJwt { name, allowed_tags: cert.allowed_tags.clone() })
    }
}

fn parse_certificate(raw: &[u8]) -> Result<(String, TrustedCert), ApiError> {
    let parse_err = |e: String| ApiError::AuthInvalid(e);
    let der = if raw.starts_with(b"-----BEGIN") {
        let (_, pem) = x509_parser::pem::parse_x509_pem(raw)
            .map_err(|e| parse_err(format!("{e:?}")))?;
        pem.contents
    } else {
        raw.to_vec()
    };
    let (_, cert) = X509Certificate::from_der(&der).map_err(|e| parse_err(format!("{e:?}")))?;

    let spki_der = cert.public_key().raw;
    let kid = {
        let mut h = Sha256::new();
        h.update(spki_der);
        super::hex(&h.finalize())
    };

    let allowed_tags: Vec<String> = cert
        .subject()
        .iter_organizational_unit()
        .filter_map(|a| a.as_str().ok())
        .map(str::to_string)
        .collect();

    let decoding = DecodingKey::from_ec_pem(spki_pem(spki_der).as_bytes())
        .map_err(|e| parse_err(e.to_string()))?;

    Ok((kid, TrustedCert { decoding, allowed_tags }))
}

#[cfg(test)]
#[path = "jwt_tests.rs"]
mod tests;
