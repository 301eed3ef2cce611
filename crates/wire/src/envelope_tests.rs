// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn success_envelope_shape() {
    let env = Envelope::success(serde_json::json!({"build_id": 1}));
    let json = serde_json::to_value(&env).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["data"]["build_id"], 1);
}

#[test]
fn error_envelope_omits_empty_detail() {
    let env: Envelope<()> = Envelope::error("Not Found");
    let json = serde_json::to_value(&env).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["message"], "Not Found");
    assert!(json.get("error_msg").is_none());

    let env: Envelope<()> = Envelope::error_with_detail("boom", "stack");
    let json = serde_json::to_value(&env).unwrap();
    assert_eq!(json["error_msg"], "stack");
}

#[test]
fn envelope_deserializes_by_tag() {
    let env: Envelope<serde_json::Value> =
        serde_json::from_str(r#"{"status":"success","data":{"ok":true}}"#).unwrap();
    assert!(matches!(env, Envelope::Success { .. }));

    let env: Envelope<serde_json::Value> =
        serde_json::from_str(r#"{"status":"error","message":"nope"}"#).unwrap();
    assert!(matches!(env, Envelope::Error { .. }));
}
