// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication: internal HMAC, worker api keys, worker bearer tokens,
//! and webhook signatures. Every comparison of secret material is
//! constant time.

pub mod jwt;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::error::ApiError;

type HmacSha1 = Hmac<Sha1>;

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// HMAC-SHA1 signature over `"METHOD,TIME,BASE_URL"`, hex encoded. Shared by
/// verification and by clients (tests) signing their own requests.
pub fn sign_internal(key: &[u8], method: &str, time: &str, base_url: &str) -> String {
    let mut mac = HmacSha1::new_from_slice(key).unwrap_or_else(|_| {
        // HMAC accepts any key length; new_from_slice cannot fail.
        unreachable!()
    });
    mac.update(format!("{method},{time},{base_url}").as_bytes());
    hex(&mac.finalize().into_bytes())
}

/// Verify a privileged internal call: `X-Time` + `X-JobServ-Sig` headers
/// signed with the deployment's internal api key.
pub fn assert_internal(
    internal_key: &[u8],
    headers: &HeaderMap,
    method: &str,
    base_url: &str,
) -> Result<(), ApiError> {
    if internal_key.is_empty() {
        return Err(ApiError::unexpected(
            "An unexpected error occurred",
            "INTERNAL_API_KEY is not configured",
        ));
    }
    let sig = headers
        .get("X-JobServ-Sig")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::AuthMissing("X-JobServ-Sig not provided".to_string()))?;
    let time = headers
        .get("X-Time")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::AuthMissing("X-Time not provided".to_string()))?;
    let computed = sign_internal(internal_key, method, time, base_url);
    if !constant_time_eq(sig.as_bytes(), computed.as_bytes()) {
        return Err(ApiError::AuthInvalid("Invalid signature".to_string()));
    }
    Ok(())
}

/// Constant-time equality for secrets of possibly differing length.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}

/// The credential a worker presented.
pub enum WorkerCredential {
    Token(String),
    Bearer(String),
}

/// Parse the `Authorization` header into a worker credential.
pub fn worker_credential(headers: &HeaderMap) -> Result<WorkerCredential, ApiError> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::AuthMissing("No Authorization header provided".to_string()))?;
    match raw.split_once(' ') {
        Some(("Token", key)) if !key.is_empty() => Ok(WorkerCredential::Token(key.to_string())),
        Some(("Bearer", tok)) if !tok.is_empty() => Ok(WorkerCredential::Bearer(tok.to_string())),
        _ => Err(ApiError::AuthInvalid("Invalid Authorization header".to_string())),
    }
}

/// Verify a webhook body signature: `X-Hub-Signature: sha1=<hex>` computed
/// over the raw request body with the trigger's webhook key.
pub fn webhook_signature_ok(webhook_key: &str, header: &str, body: &[u8]) -> bool {
    let Some(sent) = header.strip_prefix("sha1=") else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(webhook_key.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = hex(&mac.finalize().into_bytes());
    constant_time_eq(sent.as_bytes(), computed.as_bytes())
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
