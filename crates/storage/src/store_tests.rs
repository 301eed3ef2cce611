// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use foreman_core::WorkerBuilder;
use std::sync::Arc;

fn open_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

fn seed_project(store: &Store, name: &str) {
    store.create_project(name, false, None, 0).unwrap();
}

fn seed_run(store: &Store, project: &str, build_id: u32, name: &str, tag: &str) -> Run {
    store
        .create_run(project, build_id, name, "t1", TriggerType::Simple, tag, 0, 0)
        .unwrap()
}

fn worker(name: &str, tags: &[&str]) -> Worker {
    WorkerBuilder::default()
        .name(name)
        .host_tags(tags.iter().map(|t| t.to_string()).collect())
        .build()
}

#[test]
fn build_ids_are_dense_per_project() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    seed_project(&store, "p2");
    assert_eq!(store.create_build("p1", None, None, 0).unwrap().build_id, 1);
    assert_eq!(store.create_build("p1", None, None, 0).unwrap().build_id, 2);
    assert_eq!(store.create_build("p2", None, None, 0).unwrap().build_id, 1);
    assert_eq!(store.create_build("p1", None, None, 0).unwrap().build_id, 3);
}

#[test]
fn concurrent_build_creates_stay_dense() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);
    seed_project(&store, "p1");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            (0..25).map(|_| store.create_build("p1", None, None, 0).unwrap().build_id).collect::<Vec<_>>()
        }));
    }
    let mut ids: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    let expected: Vec<u32> = (1..=200).collect();
    assert_eq!(ids, expected, "ids must be 1..=N with no gaps or duplicates");
}

#[test]
fn duplicate_run_name_conflicts() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    seed_run(&store, "p1", 1, "run0", "amd64");
    let err = store
        .create_run("p1", 1, "run0", "t1", TriggerType::Simple, "arm64", 0, 0)
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
}

#[test]
fn run_status_change_refreshes_build() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let r0 = seed_run(&store, "p1", 1, "run0", "amd64");
    let r1 = seed_run(&store, "p1", 1, "run1", "amd64");

    store.record_run_status(r0.id, BuildStatus::Running, 10).unwrap();
    assert_eq!(store.get_build("p1", 1).unwrap().status, BuildStatus::Running);

    store.record_run_status(r0.id, BuildStatus::Passed, 20).unwrap();
    assert_eq!(store.get_build("p1", 1).unwrap().status, BuildStatus::Queued);

    store.record_run_status(r1.id, BuildStatus::Failed, 30).unwrap();
    let build = store.get_build("p1", 1).unwrap();
    assert_eq!(build.status, BuildStatus::Failed);
    assert_eq!(build.completed_ms, Some(30));
}

#[test]
fn promote_requires_completion_and_unique_name() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let r = seed_run(&store, "p1", 1, "run0", "amd64");

    let err = store.promote_build("p1", 1, Some("v1".into()), None).unwrap_err();
    assert!(err.to_string().contains("not yet complete"));

    store.record_run_status(r.id, BuildStatus::Passed, 10).unwrap();
    store.promote_build("p1", 1, Some("v1".into()), Some("good".into())).unwrap();
    let build = store.get_build("p1", 1).unwrap();
    assert_eq!(build.status, BuildStatus::Promoted);
    assert_eq!(build.name.as_deref(), Some("v1"));

    // Second build may not reuse the promotion name.
    store.create_build("p1", None, None, 0).unwrap();
    let r2 = seed_run(&store, "p1", 2, "run0", "amd64");
    store.record_run_status(r2.id, BuildStatus::Passed, 20).unwrap();
    let err = store.promote_build("p1", 2, Some("v1".into()), None).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn terminal_runs_reject_further_transitions() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let r = seed_run(&store, "p1", 1, "run0", "amd64");
    store.record_run_status(r.id, BuildStatus::Passed, 10).unwrap();

    for status in [BuildStatus::Queued, BuildStatus::Running, BuildStatus::Failed] {
        let err = store.record_run_status(r.id, status, 20).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "PASSED -> {status} must conflict");
    }
    assert_eq!(store.get_run_by_id(r.id).unwrap().status_events.len(), 2);
}

#[test]
fn cancelling_accepts_workers_terminal_report() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let r = seed_run(&store, "p1", 1, "run0", "amd64");
    store.pop_queued_for_worker(&worker("w1", &["amd64"]), &Default::default(), 1).unwrap();
    store.cancel_build("p1", 1, 2).unwrap();

    // The worker finished before noticing the cancel; its PASSED wins.
    let run = store.record_run_status(r.id, BuildStatus::Passed, 3).unwrap();
    assert_eq!(run.status, BuildStatus::Passed);
}

#[test]
fn external_runs_are_born_passed() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let run = store.create_external_run("p1", 1, "imported", "external", 5).unwrap();
    assert_eq!(run.status, BuildStatus::Passed);
    assert_eq!(run.completed_ms, Some(5));
    assert_eq!(store.get_build("p1", 1).unwrap().status, BuildStatus::Passed);

    // External runs never appear in a dispatch candidate set.
    assert!(store
        .pop_queued_for_worker(&worker("w1", &["amd64"]), &Default::default(), 6)
        .unwrap()
        .is_none());
}

#[test]
fn pop_claims_exactly_once() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let run = seed_run(&store, "p1", 1, "run0", "amd64");

    let w1 = worker("w1", &["amd64"]);
    let got = store.pop_queued_for_worker(&w1, &Default::default(), 10).unwrap().unwrap();
    assert_eq!(got.id, run.id);
    assert_eq!(got.status, BuildStatus::Running);
    assert_eq!(got.worker.as_deref(), Some("w1"));
    assert!(!got.running_acked);

    // Nothing left for anyone, including the claimer.
    let w2 = worker("w2", &["amd64"]);
    assert!(store.pop_queued_for_worker(&w2, &Default::default(), 11).unwrap().is_none());
    assert!(store.pop_queued_for_worker(&w1, &Default::default(), 12).unwrap().is_none());
}

#[test]
fn pop_is_single_claim_under_concurrency() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    for i in 0..10 {
        seed_run(&store, "p1", 1, &format!("run{i}"), "amd64");
    }

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            let w = WorkerBuilder::default().name(format!("w{i}")).build();
            store
                .pop_queued_for_worker(&w, &Default::default(), 5)
                .unwrap()
                .map(|r| r.id)
        }));
    }
    let claimed: Vec<u64> =
        handles.into_iter().filter_map(|h| h.join().unwrap()).collect();
    let mut unique = claimed.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(claimed.len(), 10, "exactly the queued runs get claimed");
    assert_eq!(unique.len(), claimed.len(), "no run claimed twice");
}

#[test]
fn pop_honors_priority_then_age() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let _r1 = store
        .create_run("p1", 1, "r1", "t1", TriggerType::Simple, "amd64", 0, 0)
        .unwrap();
    let r2 = store
        .create_run("p1", 1, "r2", "t1", TriggerType::Simple, "amd64", 2, 0)
        .unwrap();

    let got = store
        .pop_queued_for_worker(&worker("w1", &["amd64"]), &Default::default(), 1)
        .unwrap()
        .unwrap();
    assert_eq!(got.id, r2.id, "higher priority wins over older run");
}

#[test]
fn pop_matches_globs_and_worker_name() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    seed_run(&store, "p1", 1, "glob", "aa?c*");
    let w = worker("w1", &["AARCH96"]);
    let got = store.pop_queued_for_worker(&w, &Default::default(), 1).unwrap();
    assert!(got.is_some(), "case-insensitive glob must match");

    // A run pinned to the worker's name matches even with no tags.
    seed_run(&store, "p1", 1, "pinned", "w2");
    let w2 = worker("w2", &[]);
    let got = store.pop_queued_for_worker(&w2, &Default::default(), 2).unwrap().unwrap();
    assert_eq!(got.name, "pinned");
}

#[test]
fn pop_respects_allowed_tags_restriction() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    seed_run(&store, "p1", 1, "run0", "amd64");

    let mut w = worker("w1", &["amd64", "arm64"]);
    w.allowed_tags = vec!["arm64".to_string()];
    assert!(
        store.pop_queued_for_worker(&w, &Default::default(), 1).unwrap().is_none(),
        "certificate narrows advertised tags"
    );
}

#[test]
fn pop_blocks_synchronous_projects_across_builds_only() {
    let (_dir, store) = open_store();
    store.create_project("sync", true, None, 0).unwrap();
    store.create_build("sync", None, None, 0).unwrap();
    let b1r0 = seed_run(&store, "sync", 1, "run0", "amd64");
    let _b1r1 = seed_run(&store, "sync", 1, "run1", "amd64");
    store.create_build("sync", None, None, 0).unwrap();
    // Different tag on purpose: blocking is project-wide, not per-tag.
    seed_run(&store, "sync", 2, "run0", "arm64");

    store.record_run_status(b1r0.id, BuildStatus::Running, 1).unwrap();

    // Build 2 is blocked while build 1 has active runs.
    let w_arm = worker("w-arm", &["arm64"]);
    assert!(store.pop_queued_for_worker(&w_arm, &Default::default(), 2).unwrap().is_none());

    // Runs within build 1 never block each other.
    let w_amd = worker("w-amd", &["amd64"]);
    let got = store.pop_queued_for_worker(&w_amd, &Default::default(), 3).unwrap().unwrap();
    assert_eq!((got.build_id, got.name.as_str()), (1, "run1"));
}

#[test]
fn pop_unblocks_when_earlier_build_terminates() {
    let (_dir, store) = open_store();
    store.create_project("sync", true, None, 0).unwrap();
    store.create_build("sync", None, None, 0).unwrap();
    let b1r0 = seed_run(&store, "sync", 1, "run0", "amd64");
    store.create_build("sync", None, None, 0).unwrap();
    seed_run(&store, "sync", 2, "run0", "amd64");

    let w = worker("w1", &["amd64"]);
    // UPLOADING still blocks.
    store.record_run_status(b1r0.id, BuildStatus::Running, 1).unwrap();
    store.record_run_status(b1r0.id, BuildStatus::Uploading, 2).unwrap();
    assert!(store
        .pop_queued_for_worker(&w, &Default::default(), 2)
        .unwrap()
        .is_none());

    store.record_run_status(b1r0.id, BuildStatus::Passed, 3).unwrap();
    let got = store.pop_queued_for_worker(&w, &Default::default(), 4).unwrap().unwrap();
    assert_eq!(got.build_id, 2);
}

#[test]
fn surges_only_worker_needs_surging_tag() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    seed_run(&store, "p1", 1, "run0", "amd64");

    let mut w = worker("w1", &["amd64"]);
    w.surges_only = true;
    assert!(store.pop_queued_for_worker(&w, &Default::default(), 1).unwrap().is_none());

    let surge = std::collections::HashSet::from(["amd64".to_string()]);
    assert!(store.pop_queued_for_worker(&w, &surge, 2).unwrap().is_some());
}

#[test]
fn rollback_restores_queued_without_audit_event() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let run = seed_run(&store, "p1", 1, "run0", "amd64");
    let events_before = store.get_run_by_id(run.id).unwrap().status_events.len();

    store.pop_queued_for_worker(&worker("w1", &["amd64"]), &Default::default(), 1).unwrap();
    store.rollback_assignment(run.id).unwrap();

    let run = store.get_run_by_id(run.id).unwrap();
    assert_eq!(run.status, BuildStatus::Queued);
    assert!(run.worker.is_none());
    assert_eq!(run.status_events.len(), events_before, "no transition recorded");

    // The run is claimable again.
    assert!(store
        .pop_queued_for_worker(&worker("w2", &["amd64"]), &Default::default(), 2)
        .unwrap()
        .is_some());
}

#[test]
fn requeue_appends_event_and_clears_worker() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let run = seed_run(&store, "p1", 1, "run0", "amd64");
    store.pop_queued_for_worker(&worker("w1", &["amd64"]), &Default::default(), 1).unwrap();

    store.requeue_run(run.id, 20).unwrap();
    let run = store.get_run_by_id(run.id).unwrap();
    assert_eq!(run.status, BuildStatus::Queued);
    assert!(run.worker.is_none());
    assert_eq!(run.last_event_ms(), Some(20));
}

#[test]
fn cancel_build_sweeps_non_terminal_runs() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let r0 = seed_run(&store, "p1", 1, "run0", "amd64");
    let r1 = seed_run(&store, "p1", 1, "run1", "amd64");
    let r2 = seed_run(&store, "p1", 1, "run2", "amd64");
    store.record_run_status(r0.id, BuildStatus::Passed, 1).unwrap();
    store.record_run_status(r1.id, BuildStatus::Running, 1).unwrap();

    store.cancel_build("p1", 1, 5).unwrap();
    assert_eq!(store.get_run_by_id(r0.id).unwrap().status, BuildStatus::Passed);
    assert_eq!(store.get_run_by_id(r1.id).unwrap().status, BuildStatus::Cancelling);
    assert_eq!(store.get_run_by_id(r2.id).unwrap().status, BuildStatus::Cancelling);
}

#[test]
fn test_rollup_resolves_run() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let run = seed_run(&store, "p1", 1, "run0", "amd64");

    store.create_test(run.id, "unit", None, 1).unwrap();
    store.create_test(run.id, "integration", None, 1).unwrap();
    store
        .update_test(run.id, "unit", None, Some(BuildStatus::Passed), vec![], 2)
        .unwrap();
    assert_eq!(store.get_run_by_id(run.id).unwrap().status, BuildStatus::Queued);

    store
        .update_test(run.id, "integration", None, Some(BuildStatus::Failed), vec![], 3)
        .unwrap();
    let run = store.get_run_by_id(run.id).unwrap();
    assert_eq!(run.status, BuildStatus::Failed, "any failed test fails the run");
}

#[test]
fn duplicate_test_triple_conflicts_but_context_disambiguates() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let run = seed_run(&store, "p1", 1, "run0", "amd64");

    store.create_test(run.id, "unit", Some("ctx-a".into()), 1).unwrap();
    store.create_test(run.id, "unit", Some("ctx-b".into()), 1).unwrap();
    let err = store.create_test(run.id, "unit", Some("ctx-a".into()), 1).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn monitor_queries_pick_the_right_runs() {
    let (_dir, store) = open_store();
    seed_project(&store, "p1");
    store.create_build("p1", None, None, 0).unwrap();
    let acked = seed_run(&store, "p1", 1, "acked", "amd64");
    let silent = seed_run(&store, "p1", 1, "silent", "amd64");
    let orphan = seed_run(&store, "p1", 1, "orphan", "amd64");

    let w = worker("w1", &["amd64"]);
    store.pop_queued_for_worker(&w, &Default::default(), 100).unwrap();
    store.pop_queued_for_worker(&w, &Default::default(), 100).unwrap();
    store.ack_run(acked.id).unwrap();
    store.record_run_status(orphan.id, BuildStatus::Cancelling, 100).unwrap();

    let unacked = store.unacked_running(200);
    assert_eq!(unacked.len(), 1);
    assert_eq!(unacked[0].id, silent.id);

    let cancelled = store.cancelled_unassigned();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, orphan.id);

    assert!(store.stale_runs(BuildStatus::Running, 50).is_empty());
    assert_eq!(store.stale_runs(BuildStatus::Running, 500).len(), 2);
}

#[test]
fn jwt_worker_autocreation_is_enlisted_placeholder() {
    let (_dir, store) = open_store();
    let w = store.ensure_jwt_worker("edge-1", vec!["org1".into()], 10).unwrap();
    assert!(w.enlisted);
    assert_eq!(w.distro, "?");
    assert_eq!(w.allowed_tags, vec!["org1".to_string()]);

    // Re-auth refreshes allowed_tags without clobbering the row.
    store
        .update_worker(
            "edge-1",
            WorkerPatch { distro: Some("alpine".into()), ..WorkerPatch::default() },
        )
        .unwrap();
    let w = store.ensure_jwt_worker("edge-1", vec!["org2".into()], 20).unwrap();
    assert_eq!(w.distro, "alpine");
    assert_eq!(w.allowed_tags, vec!["org2".to_string()]);
}

#[test]
fn store_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        seed_project(&store, "p1");
        store.create_build("p1", None, None, 0).unwrap();
        let r = seed_run(&store, "p1", 1, "run0", "amd64");
        store.record_run_status(r.id, BuildStatus::Running, 5).unwrap();
        store.compact().unwrap();
        store.record_run_status(r.id, BuildStatus::Passed, 9).unwrap();
    }
    let store = Store::open(dir.path()).unwrap();
    let run = store.get_run("p1", 1, "run0").unwrap();
    assert_eq!(run.status, BuildStatus::Passed);
    assert_eq!(run.status_events.len(), 3);
    assert_eq!(store.get_build("p1", 1).unwrap().status, BuildStatus::Passed);
}
