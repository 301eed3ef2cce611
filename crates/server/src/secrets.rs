// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger secrets at rest: AES-256-GCM under the `SECRETS_KEY`.
//!
//! Stored form is `base64(nonce || ciphertext)` over the JSON-encoded secret
//! map. Decryption happens only in the trigger pipeline, right before the
//! values are folded into a rundef.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use indexmap::IndexMap;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("SECRETS_KEY is not configured")]
    NoKey,
    #[error("secret data is corrupt")]
    Corrupt,
}

pub struct SecretBox {
    key: Option<Key<Aes256Gcm>>,
}

impl SecretBox {
    pub fn new(key: Option<[u8; 32]>) -> Self {
        Self { key: key.map(|k| Key::<Aes256Gcm>::from(k)) }
    }

    /// Encrypt a secret map for storage. An empty map encrypts to the empty
    /// string so deployments without secrets never need a key.
    pub fn encrypt(&self, secrets: &IndexMap<String, String>) -> Result<String, SecretsError> {
        if secrets.is_empty() {
            return Ok(String::new());
        }
        let key = self.key.as_ref().ok_or(SecretsError::NoKey)?;
        let cipher = Aes256Gcm::new(key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let plaintext = serde_json::to_vec(secrets).map_err(|_| SecretsError::Corrupt)?;
        let ciphertext =
            cipher.encrypt(&nonce, plaintext.as_slice()).map_err(|_| SecretsError::Corrupt)?;
        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(blob))
    }

    pub fn decrypt(&self, stored: &str) -> Result<IndexMap<String, String>, SecretsError> {
        if stored.is_empty() {
            return Ok(IndexMap::new());
        }
        let key = self.key.as_ref().ok_or(SecretsError::NoKey)?;
        let blob = base64::engine::general_purpose::STANDARD
            .decode(stored)
            .map_err(|_| SecretsError::Corrupt)?;
        if blob.len() <= NONCE_LEN {
            return Err(SecretsError::Corrupt);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(key);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretsError::Corrupt)?;
        serde_json::from_slice(&plaintext).map_err(|_| SecretsError::Corrupt)
    }
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
