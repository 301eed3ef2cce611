// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_build_starts_queued() {
    let b = Build::new("proj-1", 1, 5_000);
    assert_eq!(b.status, BuildStatus::Queued);
    assert_eq!(b.build_id, 1);
    assert!(!b.complete());
    assert!(b.name.is_none());
}

#[test]
fn complete_follows_terminal_status() {
    let mut b = Build::new("proj-1", 1, 0);
    b.status = BuildStatus::Running;
    assert!(!b.complete());
    b.status = BuildStatus::Passed;
    assert!(b.complete());
    b.status = BuildStatus::Promoted;
    assert!(b.complete());
}

#[test]
fn builder_defaults() {
    let b = Build::builder().build_id(7).trigger_name("nightly").build();
    assert_eq!(b.project, "proj-1");
    assert_eq!(b.build_id, 7);
    assert_eq!(b.trigger_name.as_deref(), Some("nightly"));
}

#[test]
fn serde_skips_unset_optionals() {
    let b = Build::new("p", 1, 0);
    let json = serde_json::to_value(&b).unwrap();
    assert!(json.get("annotation").is_none());
    assert!(json.get("name").is_none());
    assert_eq!(json["status"], "QUEUED");
}
