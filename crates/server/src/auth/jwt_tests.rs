// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use serde_json::json;

/// Self-signed EC P-256 certificate with the given OU attributes, written
/// into a fresh trust directory.
fn trust_dir(orgs: &[&str]) -> (tempfile::TempDir, KeyDir, EncodingKey, String) {
    let dir = tempfile::tempdir().unwrap();
    let key_pair = KeyPair::generate().unwrap();
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "foreman-test");
    for org in orgs {
        dn.push(DnType::OrganizationalUnitName, *org);
    }
    params.distinguished_name = dn;
    let cert = params.self_signed(&key_pair).unwrap();
    std::fs::write(dir.path().join("worker.pem"), cert.pem()).unwrap();

    let keys = KeyDir::load(dir.path());
    let kid = keys.kids().into_iter().next().unwrap();
    let encoding = EncodingKey::from_ec_der(&key_pair.serialize_der());
    (dir, keys, encoding, kid)
}

fn token(encoding: &EncodingKey, kid: Option<String>, claims: serde_json::Value) -> String {
    let mut header = Header::new(jsonwebtoken::Algorithm::ES256);
    header.kid = kid;
    encode(&header, &claims, encoding).unwrap()
}

fn future_exp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600
}

#[test]
fn valid_token_yields_name_and_allowed_tags() {
    let (_dir, keys, encoding, kid) = trust_dir(&["org1", "org2"]);
    let jwt = token(&encoding, Some(kid), json!({"name": "edge-1", "exp": future_exp()}));
    let worker = keys.worker_from_jwt(&jwt).unwrap();
    assert_eq!(worker.name, "edge-1");
    assert_eq!(worker.allowed_tags, vec!["org1".to_string(), "org2".to_string()]);
}

#[test]
fn missing_kid_is_rejected() {
    let (_dir, keys, encoding, _kid) = trust_dir(&[]);
    let jwt = token(&encoding, None, json!({"name": "w", "exp": future_exp()}));
    let err = keys.worker_from_jwt(&jwt).unwrap_err();
    assert!(err.to_string().contains("kid"), "{err}");
}

#[test]
fn unknown_kid_is_rejected() {
    let (_dir, keys, encoding, _kid) = trust_dir(&[]);
    let jwt = token(&encoding, Some("deadbeef".to_string()), json!({"name": "w", "exp": future_exp()}));
    let err = keys.worker_from_jwt(&jwt).unwrap_err();
    assert!(err.to_string().contains("No certificate found"), "{err}");
}

#[test]
fn missing_exp_is_rejected() {
    let (_dir, keys, encoding, kid) = trust_dir(&[]);
    let jwt = token(&encoding, Some(kid), json!({"name": "w"}));
    let err = keys.worker_from_jwt(&jwt).unwrap_err();
    assert!(err.to_string().contains("exp"), "{err}");
}

#[test]
fn missing_name_is_rejected() {
    let (_dir, keys, encoding, kid) = trust_dir(&[]);
    let jwt = token(&encoding, Some(kid), json!({"exp": future_exp()}));
    let err = keys.worker_from_jwt(&jwt).unwrap_err();
    assert!(err.to_string().contains("name"), "{err}");
}

#[test]
fn foreign_key_signature_is_rejected() {
    let (_dir, keys, _encoding, kid) = trust_dir(&[]);
    // A different key pair signs a token that names a trusted kid.
    let other = KeyPair::generate().unwrap();
    let forged = token(
        &EncodingKey::from_ec_der(&other.serialize_der()),
        Some(kid),
        json!({"name": "w", "exp": future_exp()}),
    );
    assert!(keys.worker_from_jwt(&forged).is_err());
}

#[test]
fn empty_trust_dir_rejects_everything() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyDir::load(dir.path());
    assert!(keys.kids().is_empty());
    assert!(keys.worker_from_jwt("not.a.jwt").is_err());
}
