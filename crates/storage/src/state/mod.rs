// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

mod builds;
mod projects;
mod workers;

use foreman_core::{Build, BuildStatus, Project, ProjectTrigger, Run, TestResult, Worker};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Partial update applied to a worker row. `None` fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerPatch {
    pub distro: Option<String>,
    pub mem_total: Option<u64>,
    pub cpu_total: Option<u32>,
    pub cpu_type: Option<String>,
    pub concurrent_runs: Option<u32>,
    pub host_tags: Option<Vec<String>>,
    pub surges_only: Option<bool>,
    pub enlisted: Option<bool>,
    pub allowed_tags: Option<Vec<String>>,
}

/// One WAL record. State is derived by replaying these in order.
///
/// # Idempotency requirement
///
/// Every handler MUST be idempotent: applying the same event twice must
/// produce the same state as applying it once (a snapshot plus a WAL tail
/// can overlap after a crash). Guard inserts with existence checks and use
/// assignment rather than arithmetic mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    ProjectCreated { project: Project },
    ProjectDeleted { name: String },
    TriggerCreated { trigger: ProjectTrigger },
    TriggerUpdated {
        id: u32,
        secrets_enc: Option<String>,
        definition_repo: Option<String>,
        definition_file: Option<String>,
    },
    TriggerDeleted { id: u32 },
    BuildCreated { build: Build },
    BuildAnnotated { project: String, build_id: u32, annotation: String },
    BuildPromoted {
        project: String,
        build_id: u32,
        name: Option<String>,
        annotation: Option<String>,
    },
    RunCreated { run: Run },
    /// A transition: updates the run status, appends one audit event, and
    /// refreshes the parent build's aggregate status.
    RunStatusChanged { run_id: u64, status: BuildStatus, time_ms: u64 },
    /// Dispatcher claim: QUEUED → RUNNING with the worker recorded and
    /// `running_acked` cleared.
    RunAssigned { run_id: u64, worker: String, time_ms: u64 },
    /// Monitor reclaim of an un-acknowledged assignment; appends an event.
    RunRequeued { run_id: u64, time_ms: u64 },
    /// Dispatcher rollback after a failed response build; restores QUEUED
    /// and removes the claim's audit event so no transition is recorded.
    RunDispatchRolledBack { run_id: u64 },
    RunAcked { run_id: u64 },
    TestCreated { run_id: u64, name: String, context: Option<String>, time_ms: u64 },
    TestUpdated {
        run_id: u64,
        name: String,
        context: Option<String>,
        status: Option<BuildStatus>,
        results: Vec<TestResult>,
        time_ms: u64,
    },
    WorkerCreated { worker: Worker },
    WorkerUpdated { name: String, patch: WorkerPatch },
    WorkerPinged { name: String, time_ms: u64 },
    WorkerOnline { name: String, online: bool },
    WorkerDeleted { name: String },
}

/// Materialized state built from WAL replay
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreState {
    pub projects: HashMap<String, Project>,
    pub triggers: HashMap<u32, ProjectTrigger>,
    #[serde(default)]
    pub next_trigger_id: u32,
    /// project name → build_id → build. BTreeMap keeps newest-last order.
    pub builds: HashMap<String, BTreeMap<u32, Build>>,
    /// Global run table keyed by monotonic id; dispatch order relies on it.
    pub runs: BTreeMap<u64, Run>,
    #[serde(default)]
    pub next_run_id: u64,
    pub workers: HashMap<String, Worker>,
}

impl StoreState {
    pub fn get_build(&self, project: &str, build_id: u32) -> Option<&Build> {
        self.builds.get(project).and_then(|b| b.get(&build_id))
    }

    pub fn find_run(&self, project: &str, build_id: u32, name: &str) -> Option<&Run> {
        self.runs
            .values()
            .find(|r| r.project == project && r.build_id == build_id && r.name == name)
    }

    pub fn runs_for_build(&self, project: &str, build_id: u32) -> Vec<&Run> {
        self.runs
            .values()
            .filter(|r| r.project == project && r.build_id == build_id)
            .collect()
    }

    /// Apply an event to derive state changes.
    pub fn apply(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::ProjectCreated { .. }
            | StoreEvent::ProjectDeleted { .. }
            | StoreEvent::TriggerCreated { .. }
            | StoreEvent::TriggerUpdated { .. }
            | StoreEvent::TriggerDeleted { .. } => projects::apply(self, event),

            StoreEvent::BuildCreated { .. }
            | StoreEvent::BuildAnnotated { .. }
            | StoreEvent::BuildPromoted { .. }
            | StoreEvent::RunCreated { .. }
            | StoreEvent::RunStatusChanged { .. }
            | StoreEvent::RunAssigned { .. }
            | StoreEvent::RunRequeued { .. }
            | StoreEvent::RunDispatchRolledBack { .. }
            | StoreEvent::RunAcked { .. }
            | StoreEvent::TestCreated { .. }
            | StoreEvent::TestUpdated { .. } => builds::apply(self, event),

            StoreEvent::WorkerCreated { .. }
            | StoreEvent::WorkerUpdated { .. }
            | StoreEvent::WorkerPinged { .. }
            | StoreEvent::WorkerOnline { .. }
            | StoreEvent::WorkerDeleted { .. } => workers::apply(self, event),
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
