// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run: one unit of work executed on one worker.

use serde::{Deserialize, Serialize};

use crate::status::BuildStatus;
use crate::test::Test;
use crate::trigger::TriggerType;

/// Append-only audit record of a run's status transitions. The last entry's
/// time is the run's "most recent transition" used by the monitor sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: BuildStatus,
    pub time_ms: u64,
}

/// A run. `(build, name)` is unique; `worker` is set while a worker owns the
/// run. `running_acked` flips when the worker's first console message lands
/// after dispatch; until then the monitor may reclaim the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Globally monotonic id; dispatch order ties break on it.
    pub id: u64,
    pub project: String,
    pub build_id: u32,
    pub name: String,
    pub status: BuildStatus,
    /// Name of the definition trigger that created this run.
    pub trigger_name: String,
    /// Effective trigger kind carried into the rundef (may be upgraded from
    /// `simple` when the parent build came from a PR or poller).
    pub trigger_type: TriggerType,
    pub host_tag: String,
    /// Higher first; ties broken by run id (oldest first).
    pub queue_priority: i32,
    /// Opaque per-run secret the worker presents on every update.
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default)]
    pub running_acked: bool,
    pub created_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_ms: Option<u64>,
    pub status_events: Vec<StatusEvent>,
    #[serde(default)]
    pub tests: Vec<Test>,
}

impl Run {
    pub fn new(
        project: impl Into<String>,
        build_id: u32,
        id: u64,
        name: impl Into<String>,
        trigger_name: impl Into<String>,
        api_key: impl Into<String>,
        created_ms: u64,
    ) -> Self {
        Self {
            id,
            project: project.into(),
            build_id,
            name: name.into(),
            status: BuildStatus::Queued,
            trigger_name: trigger_name.into(),
            trigger_type: TriggerType::Simple,
            host_tag: String::new(),
            queue_priority: 0,
            api_key: api_key.into(),
            worker: None,
            running_acked: false,
            created_ms,
            completed_ms: None,
            status_events: vec![StatusEvent { status: BuildStatus::Queued, time_ms: created_ms }],
            tests: Vec::new(),
        }
    }

    /// Record a transition: set the status, stamp completion when terminal,
    /// and append exactly one audit event.
    pub fn record_status(&mut self, status: BuildStatus, now_ms: u64) {
        self.status = status;
        if status.is_terminal() {
            self.completed_ms = Some(now_ms);
        }
        self.status_events.push(StatusEvent { status, time_ms: now_ms });
    }

    /// Time of the most recent transition.
    pub fn last_event_ms(&self) -> Option<u64> {
        self.status_events.last().map(|e| e.time_ms)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Blob-storage key prefix for this run's artifacts.
    pub fn storage_prefix(&self) -> String {
        format!("{}/{}/{}", self.project, self.build_id, self.name)
    }

    /// Find a test by name, optionally narrowed by context.
    pub fn find_test_mut(&mut self, name: &str, context: Option<&str>) -> Option<&mut Test> {
        self.tests
            .iter_mut()
            .find(|t| t.name == name && (context.is_none() || t.context.as_deref() == context))
    }
}

crate::builder! {
    pub struct RunBuilder => Run {
        into {
            project: String = "proj-1",
            name: String = "run0",
            trigger_name: String = "trigger",
            host_tag: String = "amd64",
            api_key: String = "run-secret",
        }
        set {
            id: u64 = 1,
            build_id: u32 = 1,
            status: BuildStatus = BuildStatus::Queued,
            trigger_type: TriggerType = TriggerType::Simple,
            queue_priority: i32 = 0,
            running_acked: bool = false,
            created_ms: u64 = 0,
            status_events: Vec<StatusEvent> = Vec::new(),
            tests: Vec<Test> = Vec::new(),
        }
        option {
            worker: String = None,
            completed_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
