// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn store() -> (tempfile::TempDir, LocalBlobStore) {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path());
    (dir, blobs)
}

#[test]
fn put_get_roundtrip() {
    let (_dir, blobs) = store();
    blobs.put("p1/1/project.yml", b"timeout: 5").unwrap();
    assert_eq!(blobs.get("p1/1/project.yml").unwrap(), b"timeout: 5");
}

#[test]
fn get_missing_is_not_found() {
    let (_dir, blobs) = store();
    let err = blobs.get("p1/1/nope").unwrap_err();
    assert!(matches!(err, BlobError::NotFound(_)));
}

#[test]
fn append_builds_console_log() {
    let (_dir, blobs) = store();
    let key = "p1/1/run0/console.log";
    blobs.append(key, b"# Run sent to worker: w1\n").unwrap();
    blobs.append(key, b"compiling\n").unwrap();
    let log = String::from_utf8(blobs.get(key).unwrap()).unwrap();
    assert_eq!(log, "# Run sent to worker: w1\ncompiling\n");
}

#[test]
fn list_excludes_rundef_and_recurses() {
    let (_dir, blobs) = store();
    blobs.put("p1/1/run0/.rundef.json", b"{}").unwrap();
    blobs.put("p1/1/run0/console.log", b"ok").unwrap();
    blobs.put("p1/1/run0/out/image.bin", b"abcd").unwrap();

    let entries = blobs.list("p1/1/run0").unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["console.log", "out/image.bin"]);
    assert_eq!(entries[1].size_bytes, 4);
}

#[test]
fn list_missing_prefix_is_empty() {
    let (_dir, blobs) = store();
    assert!(blobs.list("p1/9/none").unwrap().is_empty());
}

#[test]
fn delete_prefix_removes_build_artifacts() {
    let (_dir, blobs) = store();
    blobs.put("p1/1/run0/console.log", b"ok").unwrap();
    blobs.delete_prefix("p1/1").unwrap();
    assert!(matches!(blobs.get("p1/1/run0/console.log").unwrap_err(), BlobError::NotFound(_)));
    // Deleting again is fine.
    blobs.delete_prefix("p1/1").unwrap();
}
