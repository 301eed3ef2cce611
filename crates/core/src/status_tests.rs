// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn status_display_roundtrip() {
    for s in [
        BuildStatus::Queued,
        BuildStatus::Running,
        BuildStatus::Uploading,
        BuildStatus::Cancelling,
        BuildStatus::Passed,
        BuildStatus::Failed,
        BuildStatus::Cancelled,
        BuildStatus::Promoted,
        BuildStatus::Skipped,
    ] {
        let parsed: BuildStatus = s.to_string().parse().unwrap();
        assert_eq!(parsed, s);
    }
}

#[test]
fn status_serde_uses_wire_names() {
    let json = serde_json::to_string(&BuildStatus::Cancelling).unwrap();
    assert_eq!(json, "\"CANCELLING\"");
    let parsed: BuildStatus = serde_json::from_str("\"PASSED\"").unwrap();
    assert_eq!(parsed, BuildStatus::Passed);
}

#[test]
fn status_parse_rejects_unknown() {
    let err = "passed".parse::<BuildStatus>().unwrap_err();
    assert_eq!(err, StatusParseError("passed".to_string()));
}

#[parameterized(
    passed = { BuildStatus::Passed },
    failed = { BuildStatus::Failed },
    cancelled = { BuildStatus::Cancelled },
    promoted = { BuildStatus::Promoted },
    skipped = { BuildStatus::Skipped },
)]
fn terminal_statuses_absorb(s: BuildStatus) {
    assert!(s.is_terminal());
    for to in [BuildStatus::Queued, BuildStatus::Running, BuildStatus::Failed] {
        assert!(!s.run_transition_allowed(to), "{s} -> {to} must be rejected");
    }
}

#[parameterized(
    queued_to_running = { BuildStatus::Queued, BuildStatus::Running, true },
    queued_to_cancelling = { BuildStatus::Queued, BuildStatus::Cancelling, true },
    queued_to_failed = { BuildStatus::Queued, BuildStatus::Failed, true },
    queued_to_passed = { BuildStatus::Queued, BuildStatus::Passed, false },
    running_console_append = { BuildStatus::Running, BuildStatus::Running, true },
    running_to_uploading = { BuildStatus::Running, BuildStatus::Uploading, true },
    running_to_passed = { BuildStatus::Running, BuildStatus::Passed, true },
    uploading_to_passed = { BuildStatus::Uploading, BuildStatus::Passed, true },
    uploading_to_running = { BuildStatus::Uploading, BuildStatus::Running, false },
    cancelling_to_failed = { BuildStatus::Cancelling, BuildStatus::Failed, true },
    cancelling_to_passed = { BuildStatus::Cancelling, BuildStatus::Passed, true },
    cancelling_to_running = { BuildStatus::Cancelling, BuildStatus::Running, false },
)]
fn run_transitions(from: BuildStatus, to: BuildStatus, allowed: bool) {
    assert_eq!(from.run_transition_allowed(to), allowed, "{from} -> {to}");
}

#[test]
fn aggregate_empty_is_queued() {
    assert_eq!(aggregate_status([]), BuildStatus::Queued);
}

#[parameterized(
    one_running = { vec![BuildStatus::Running, BuildStatus::Queued], BuildStatus::Running },
    uploading_counts_as_running = { vec![BuildStatus::Uploading, BuildStatus::Passed], BuildStatus::Running },
    cancelling_counts_as_running = { vec![BuildStatus::Cancelling], BuildStatus::Running },
    all_passed = { vec![BuildStatus::Passed, BuildStatus::Passed], BuildStatus::Passed },
    any_failed = { vec![BuildStatus::Passed, BuildStatus::Failed], BuildStatus::Failed },
    cancelled_fails_build = { vec![BuildStatus::Passed, BuildStatus::Cancelled], BuildStatus::Failed },
    still_queued = { vec![BuildStatus::Queued, BuildStatus::Passed], BuildStatus::Queued },
)]
fn aggregate_cases(runs: Vec<BuildStatus>, expected: BuildStatus) {
    assert_eq!(aggregate_status(runs), expected);
}
