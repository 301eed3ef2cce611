// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DTOs: external projections of the entities.

use chrono::{DateTime, SecondsFormat};
use foreman_core::{Build, Project, ProjectTrigger, Run, StatusEvent, Test, TestResult, Worker};
use serde::{Deserialize, Serialize};

/// Epoch milliseconds rendered as an ISO-8601 UTC timestamp.
pub fn iso8601(ms: u64) -> String {
    DateTime::from_timestamp_millis(ms as i64)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,
    pub synchronous_builds: bool,
}

impl From<&Project> for ProjectSummary {
    fn from(p: &Project) -> Self {
        Self { name: p.name.clone(), synchronous_builds: p.synchronous_builds }
    }
}

/// Trigger row as exposed over HTTP; `secret_data` never leaves the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSummary {
    pub id: u32,
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_file: Option<String>,
}

impl From<&ProjectTrigger> for TriggerSummary {
    fn from(t: &ProjectTrigger) -> Self {
        Self {
            id: t.id,
            trigger_type: t.trigger_type.to_string(),
            definition_repo: t.definition_repo.clone(),
            definition_file: t.definition_file.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEventDetail {
    pub time: String,
    pub status: String,
}

impl From<&StatusEvent> for StatusEventDetail {
    fn from(e: &StatusEvent) -> Self {
        Self { time: iso8601(e.time_ms), status: e.status.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResultDetail {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl From<&TestResult> for TestResultDetail {
    fn from(r: &TestResult) -> Self {
        Self {
            name: r.name.clone(),
            context: r.context.clone(),
            status: r.status.to_string(),
            output: r.output.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDetail {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub status: String,
    pub created: String,
    pub results: Vec<TestResultDetail>,
}

impl From<&Test> for TestDetail {
    fn from(t: &Test) -> Self {
        Self {
            name: t.name.clone(),
            context: t.context.clone(),
            status: t.status.to_string(),
            created: iso8601(t.created_ms),
            results: t.results.iter().map(TestResultDetail::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub status: String,
    pub host_tag: String,
    pub queue_priority: i32,
    pub created: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RunSummary {
    pub fn from_run(run: &Run, url: Option<String>) -> Self {
        Self {
            name: run.name.clone(),
            status: run.status.to_string(),
            host_tag: run.host_tag.clone(),
            queue_priority: run.queue_priority,
            created: iso8601(run.created_ms),
            completed: run.completed_ms.map(iso8601),
            worker: run.worker.clone(),
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub status_events: Vec<StatusEventDetail>,
    pub tests: Vec<TestDetail>,
}

impl RunDetail {
    pub fn from_run(run: &Run, url: Option<String>) -> Self {
        Self {
            summary: RunSummary::from_run(run, url),
            status_events: run.status_events.iter().map(StatusEventDetail::from).collect(),
            tests: run.tests.iter().map(TestDetail::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub build_id: u32,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    pub created: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl BuildSummary {
    pub fn from_build(build: &Build, url: Option<String>) -> Self {
        Self {
            build_id: build.build_id,
            status: build.status.to_string(),
            trigger_name: build.trigger_name.clone(),
            reason: build.reason.clone(),
            name: build.name.clone(),
            annotation: build.annotation.clone(),
            created: iso8601(build.created_ms),
            completed: build.completed_ms.map(iso8601),
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDetail {
    #[serde(flatten)]
    pub summary: BuildSummary,
    pub runs: Vec<RunSummary>,
}

/// One page of a build listing, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPage {
    pub builds: Vec<BuildSummary>,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub name: String,
    pub distro: String,
    pub enlisted: bool,
    pub online: bool,
    pub surges_only: bool,
    pub host_tags: Vec<String>,
}

impl From<&Worker> for WorkerSummary {
    fn from(w: &Worker) -> Self {
        Self {
            name: w.name.clone(),
            distro: w.distro.clone(),
            enlisted: w.enlisted,
            online: w.online,
            surges_only: w.surges_only,
            host_tags: w.host_tags.clone(),
        }
    }
}

/// Detailed worker view for the worker's own check-in. The api key is
/// deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerDetail {
    #[serde(flatten)]
    pub summary: WorkerSummary,
    pub mem_total: u64,
    pub cpu_total: u32,
    pub cpu_type: String,
    pub concurrent_runs: u32,
}

impl From<&Worker> for WorkerDetail {
    fn from(w: &Worker) -> Self {
        Self {
            summary: WorkerSummary::from(w),
            mem_total: w.mem_total,
            cpu_total: w.cpu_total,
            cpu_type: w.cpu_type.clone(),
            concurrent_runs: w.concurrent_runs,
        }
    }
}

/// Check-in payload: the worker's own row plus, when the dispatcher assigned
/// work, the serialized rundefs to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCheckin {
    #[serde(flatten)]
    pub worker: WorkerDetail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Each entry is a complete rundef, JSON-encoded.
    #[serde(rename = "run-defs", default, skip_serializing_if = "Vec::is_empty")]
    pub run_defs: Vec<String>,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
