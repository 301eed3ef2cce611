// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use foreman_core::Project;

fn project_event(name: &str) -> StoreEvent {
    StoreEvent::ProjectCreated { project: Project::new(name, 1_000) }
}

#[test]
fn replay_rebuilds_state() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (mut wal, _) = Wal::open(dir.path()).unwrap();
        wal.append(&project_event("p1")).unwrap();
        wal.append(&project_event("p2")).unwrap();
    }
    let (_, state) = Wal::open(dir.path()).unwrap();
    assert_eq!(state.projects.len(), 2);
    assert!(state.projects.contains_key("p1"));
}

#[test]
fn compact_snapshots_and_truncates() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (mut wal, mut state) = Wal::open(dir.path()).unwrap();
        let ev = project_event("p1");
        wal.append(&ev).unwrap();
        state.apply(&ev);
        wal.compact(&state).unwrap();
        // Post-compaction appends land in the fresh WAL.
        let ev2 = project_event("p2");
        wal.append(&ev2).unwrap();
    }
    let wal_len = std::fs::metadata(dir.path().join("wal.jsonl")).unwrap().len();
    assert!(wal_len > 0, "post-compact append should survive");

    let (_, state) = Wal::open(dir.path()).unwrap();
    assert!(state.projects.contains_key("p1"), "from snapshot");
    assert!(state.projects.contains_key("p2"), "from wal tail");
}

#[test]
fn corrupt_tail_line_stops_replay_without_error() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (mut wal, _) = Wal::open(dir.path()).unwrap();
        wal.append(&project_event("p1")).unwrap();
    }
    // Simulate a torn write.
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(dir.path().join("wal.jsonl"))
        .unwrap();
    f.write_all(b"{\"type\":\"project_created\",\"proj").unwrap();

    let (_, state) = Wal::open(dir.path()).unwrap();
    assert_eq!(state.projects.len(), 1);
}

#[test]
fn replaying_snapshot_plus_overlapping_wal_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (mut wal, mut state) = Wal::open(dir.path()).unwrap();
        let ev = project_event("p1");
        wal.append(&ev).unwrap();
        state.apply(&ev);
        wal.compact(&state).unwrap();
        // The same event lands again after the snapshot (crash overlap).
        wal.append(&ev).unwrap();
    }
    let (_, state) = Wal::open(dir.path()).unwrap();
    assert_eq!(state.projects.len(), 1);
}
