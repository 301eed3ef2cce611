// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn secret_box() -> SecretBox {
    SecretBox::new(Some([9u8; 32]))
}

fn sample() -> IndexMap<String, String> {
    let mut m = IndexMap::new();
    m.insert("githubtok".to_string(), "gh-123".to_string());
    m.insert("webhook-key".to_string(), "hook".to_string());
    m
}

#[test]
fn roundtrip() {
    let sb = secret_box();
    let enc = sb.encrypt(&sample()).unwrap();
    assert_ne!(enc, "");
    assert!(!enc.contains("gh-123"));
    assert_eq!(sb.decrypt(&enc).unwrap(), sample());
}

#[test]
fn empty_map_needs_no_key() {
    let sb = SecretBox::new(None);
    let enc = sb.encrypt(&IndexMap::new()).unwrap();
    assert_eq!(enc, "");
    assert!(sb.decrypt("").unwrap().is_empty());
}

#[test]
fn missing_key_errors_when_secrets_present() {
    let sb = SecretBox::new(None);
    assert!(matches!(sb.encrypt(&sample()), Err(SecretsError::NoKey)));
}

#[test]
fn nonce_makes_ciphertexts_differ() {
    let sb = secret_box();
    let a = sb.encrypt(&sample()).unwrap();
    let b = sb.encrypt(&sample()).unwrap();
    assert_ne!(a, b);
}

#[test]
fn wrong_key_is_corrupt_not_garbage() {
    let enc = secret_box().encrypt(&sample()).unwrap();
    let other = SecretBox::new(Some([1u8; 32]));
    assert!(matches!(other.decrypt(&enc), Err(SecretsError::Corrupt)));
}
