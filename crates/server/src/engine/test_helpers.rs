// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use std::sync::Arc;

use foreman_core::{FakeClock, Worker, WorkerBuilder};
use foreman_projdef::ProjectDefinition;

use super::Engine;
use crate::config::Config;

pub(crate) struct TestEngine {
    pub engine: Arc<Engine<FakeClock>>,
    pub clock: FakeClock,
    _tmp: tempfile::TempDir,
}

impl std::ops::Deref for TestEngine {
    type Target = Engine<FakeClock>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

pub(crate) fn test_engine() -> TestEngine {
    let tmp = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = Engine::new(Config::for_dirs(tmp.path()), clock.clone()).unwrap();
    TestEngine { engine: Arc::new(engine), clock, _tmp: tmp }
}

/// One simple trigger (`ci`) with a single `run0` on `amd64`.
pub(crate) fn simple_definition() -> ProjectDefinition {
    ProjectDefinition::from_yaml(
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
        host-tag: amd64
        container: ubuntu:24.04
        script: compile
"#,
    )
    .unwrap()
}

pub(crate) fn enlisted_worker(name: &str, tags: &[&str]) -> Worker {
    WorkerBuilder::default()
        .name(name)
        .host_tags(tags.iter().map(|t| t.to_string()).collect())
        .build()
}

/// Seed a project and return a checked-in worker for it.
pub(crate) fn seed_worker(ctx: &TestEngine, worker: &Worker) {
    ctx.store.create_worker(worker.clone()).unwrap();
    ctx.store.ping_worker(&worker.name, ctx.now_ms()).unwrap();
}
