// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scheduling scenarios driven against the engine with a fake
//! clock: trigger → dispatch → lifecycle → monitor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use foreman_core::{BuildStatus, FakeClock, Worker, WorkerBuilder};
use foreman_projdef::ProjectDefinition;
use foreman_storage::BlobStore;
use foreman_server::engine::trigger::TriggerOptions;
use foreman_server::{Config, Engine};

struct Harness {
    engine: Arc<Engine<FakeClock>>,
    clock: FakeClock,
    _tmp: tempfile::TempDir,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = Engine::new(Config::for_dirs(tmp.path()), clock.clone()).unwrap();
    Harness { engine: Arc::new(engine), clock, _tmp: tmp }
}

fn definition(host_tag: &str) -> ProjectDefinition {
    ProjectDefinition::from_yaml(&format!(
        r#"
timeout: 5
scripts:
  compile: |
    #!/bin/sh
    make
triggers:
  - name: ci
    type: simple
    runs:
      - name: run0
        host-tag: {host_tag}
        container: ubuntu:24.04
        script: compile
"#
    ))
    .unwrap()
}

fn trigger(h: &Harness, project: &str, def: ProjectDefinition, priority: i32) {
    h.engine
        .trigger_build(
            project,
            def,
            TriggerOptions {
                trigger_name: "ci".to_string(),
                queue_priority: priority,
                ..TriggerOptions::default()
            },
        )
        .unwrap();
}

fn worker(h: &Harness, name: &str, tags: &[&str]) -> Worker {
    let w = WorkerBuilder::default()
        .name(name)
        .host_tags(tags.iter().map(|t| t.to_string()).collect())
        .build();
    h.engine.store.create_worker(w.clone()).unwrap();
    h.engine.store.ping_worker(name, h.engine.now_ms()).unwrap();
    w
}

fn checkin(h: &Harness, w: &Worker) -> Vec<serde_json::Value> {
    let mut query = HashMap::new();
    query.insert("available_runners".to_string(), "1".to_string());
    h.engine
        .worker_checkin(w, &query, "http://ci.example.com")
        .unwrap()
        .run_defs
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap())
        .collect()
}

/// Scenario 1: trigger, dispatch, report PASSED, build passes.
#[test]
fn happy_path() {
    let h = harness();
    h.engine.store.create_project("p1", false, None, 0).unwrap();
    trigger(&h, "p1", definition("amd64"), 0);

    let w1 = worker(&h, "w1", &["amd64"]);
    let defs = checkin(&h, &w1);
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0]["env"]["H_RUN"], "run0");
    assert_eq!(defs[0]["container"], "ubuntu:24.04");
    assert!(defs[0]["script"].as_str().unwrap().contains("make"));

    let run = h.engine.store.get_run("p1", 1, "run0").unwrap();
    assert_eq!(run.status, BuildStatus::Running);

    h.engine.update_run(&run, Some("PASSED"), b"ok").unwrap();
    assert_eq!(h.engine.store.get_build("p1", 1).unwrap().status, BuildStatus::Passed);
    let console = h.engine.blobs.get("p1/1/run0/console.log").unwrap();
    let console = String::from_utf8_lossy(&console);
    assert!(console.contains("# Run sent to worker: w1"));
    assert!(console.contains("ok"));
}

/// Scenario 2: queue depth beyond SURGE_SUPPORT_RATIO × supply enters a
/// surge; leaving it respects the 5-minute hysteresis.
#[test]
fn surge_lifecycle() {
    let h = harness();
    h.engine.store.create_project("p1", false, None, 0).unwrap();
    let build = h.engine.store.create_build("p1", None, None, 0).unwrap();
    for i in 0..4 {
        h.engine
            .store
            .create_run(
                "p1",
                build.build_id,
                &format!("run{i}"),
                "ci",
                foreman_core::TriggerType::Simple,
                "amd64",
                0,
                0,
            )
            .unwrap();
    }
    worker(&h, "w1", &["amd64"]);

    h.engine.sweep_queue();
    let marker = h.engine.config.worker_dir.join("enable_surge-amd64");
    assert!(marker.exists(), "4 queued > 3 × 1 worker");

    // Drop below the threshold: cancel one run and reap it.
    let run = h.engine.store.get_run("p1", 1, "run0").unwrap();
    h.engine.store.record_run_status(run.id, BuildStatus::Cancelling, 1).unwrap();
    h.engine.sweep_cancelled();

    h.clock.advance(Duration::from_secs(120));
    h.engine.sweep_queue();
    assert!(marker.exists(), "hysteresis keeps the surge alive");

    h.clock.advance(Duration::from_secs(200));
    h.engine.sweep_queue();
    assert!(!marker.exists(), "surge ends after the damping window");
}

/// Scenario 3: synchronous projects serialize builds; other projects are
/// untouched.
#[test]
fn synchronous_projects() {
    let h = harness();
    h.engine.store.create_project("p1", true, None, 0).unwrap();
    h.engine.store.create_project("p2", false, None, 0).unwrap();

    // Build 1: run0 running on w1, run1 still queued.
    let two_runs = ProjectDefinition::from_yaml(
        r#"
scripts:
  compile: "make"
triggers:
  - name: ci
    type: simple
    runs:
      - {name: run0, host-tag: amd64, container: c, script: compile}
      - {name: run1, host-tag: amd64, container: c, script: compile}
"#,
    )
    .unwrap();
    trigger(&h, "p1", two_runs, 0);
    let w1 = worker(&h, "w1", &["amd64"]);
    assert_eq!(checkin(&h, &w1)[0]["env"]["H_RUN"], "run0");

    // Build 2 of the same project, different host tag.
    trigger(&h, "p1", definition("arm64"), 0);
    let w_arm = worker(&h, "w-arm", &["arm64"]);
    assert!(checkin(&h, &w_arm).is_empty(), "later build blocked by build 1");

    // Same-build runs are never mutually blocked.
    let w2 = worker(&h, "w2", &["amd64"]);
    assert_eq!(checkin(&h, &w2)[0]["env"]["H_RUN"], "run1");

    // A non-synchronous project dispatches immediately.
    trigger(&h, "p2", definition("arm64"), 0);
    let defs = checkin(&h, &w_arm);
    assert_eq!(defs[0]["env"]["H_PROJECT"], "p2");
}

/// Scenario 4: queue priority beats age.
#[test]
fn priority_dispatch() {
    let h = harness();
    h.engine.store.create_project("p1", false, None, 0).unwrap();
    let build = h.engine.store.create_build("p1", None, None, 0).unwrap();
    h.engine
        .store
        .create_run("p1", build.build_id, "r1", "ci", foreman_core::TriggerType::Simple, "amd64", 0, 0)
        .unwrap();
    h.engine
        .store
        .create_run("p1", build.build_id, "r2", "ci", foreman_core::TriggerType::Simple, "amd64", 2, 0)
        .unwrap();
    // Dispatch needs a stored rundef for the winner.
    h.engine.blobs.put("p1/1/r2/.rundef.json", b"{\"run_url\":\"http://x/r2/\"}").unwrap();

    let w1 = worker(&h, "w1", &["amd64"]);
    let defs = checkin(&h, &w1);
    assert!(defs[0]["run_url"].as_str().unwrap().ends_with("/r2/"));
}

/// Scenario 5: an assignment that is never acknowledged is reclaimed after
/// the 15-second window and redispatched.
#[test]
fn ack_timeout_reclaim() {
    let h = harness();
    h.engine.store.create_project("p1", false, None, 0).unwrap();
    trigger(&h, "p1", definition("amd64"), 0);

    let w1 = worker(&h, "w1", &["amd64"]);
    assert_eq!(checkin(&h, &w1).len(), 1);

    h.clock.advance(Duration::from_secs(16));
    h.engine.sweep_acked();
    let run = h.engine.store.get_run("p1", 1, "run0").unwrap();
    assert_eq!(run.status, BuildStatus::Queued);
    assert!(run.worker.is_none());

    let w2 = worker(&h, "w2", &["amd64"]);
    assert_eq!(checkin(&h, &w2).len(), 1);
    assert_eq!(
        h.engine.store.get_run("p1", 1, "run0").unwrap().worker.as_deref(),
        Some("w2")
    );
}

/// Scenario 6: cancel marks every non-terminal run CANCELLING; unassigned
/// runs are failed by the monitor.
#[test]
fn cancel_in_flight() {
    let h = harness();
    h.engine.store.create_project("p1", false, None, 0).unwrap();
    let two_runs = ProjectDefinition::from_yaml(
        r#"
scripts:
  compile: "make"
triggers:
  - name: ci
    type: simple
    runs:
      - {name: r1, host-tag: amd64, container: c, script: compile}
      - {name: r2, host-tag: amd64, container: c, script: compile}
"#,
    )
    .unwrap();
    trigger(&h, "p1", two_runs, 0);
    let w1 = worker(&h, "w1", &["amd64"]);
    checkin(&h, &w1);

    h.engine.cancel_build("p1", 1).unwrap();
    let r1 = h.engine.store.get_run("p1", 1, "r1").unwrap();
    let r2 = h.engine.store.get_run("p1", 1, "r2").unwrap();
    assert_eq!(r1.status, BuildStatus::Cancelling);
    assert_eq!(r2.status, BuildStatus::Cancelling);
    assert!(r2.worker.is_none());

    h.engine.sweep_cancelled();
    assert_eq!(h.engine.store.get_run_by_id(r1.id).unwrap().status, BuildStatus::Cancelling);
    assert_eq!(h.engine.store.get_run_by_id(r2.id).unwrap().status, BuildStatus::Failed);

    // The assigned worker acknowledges the cancel on its next update.
    h.engine.update_run(&r1, Some("FAILED"), b"cancelled\n").unwrap();
    assert_eq!(h.engine.store.get_build("p1", 1).unwrap().status, BuildStatus::Failed);
}

/// The definition a build ran with round-trips through blob storage.
#[test]
fn stored_definition_roundtrips() {
    let h = harness();
    h.engine.store.create_project("p1", false, None, 0).unwrap();
    let def = definition("amd64");
    trigger(&h, "p1", def.clone(), 0);

    let raw = h.engine.blobs.get("p1/1/project.yml").unwrap();
    let parsed = ProjectDefinition::from_yaml(&String::from_utf8_lossy(&raw)).unwrap();
    assert_eq!(parsed, def);

    let rundef_raw = h.engine.blobs.get("p1/1/run0/.rundef.json").unwrap();
    let rundef: foreman_projdef::RunDef = serde_json::from_slice(&rundef_raw).unwrap();
    assert_eq!(serde_json::to_value(&rundef).unwrap(), serde_json::from_slice::<serde_json::Value>(&rundef_raw).unwrap());
}
