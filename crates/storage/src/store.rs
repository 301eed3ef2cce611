// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The entity store.
//!
//! Every mutation appends a WAL record, then applies it to the materialized
//! state, all under one write lock. That lock is the serialisation point the
//! spec's compound operations rely on: concurrent `create_build` calls for a
//! project still yield dense ids, and two dispatchers can never claim the
//! same queued run.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use foreman_core::{
    new_api_key, run_matches_worker, Build, BuildStatus, Project, ProjectTrigger, Run,
    TestResult, TriggerType, Worker,
};
use parking_lot::Mutex;
use thiserror::Error;

use crate::state::{StoreEvent, StoreState, WorkerPatch};
use crate::wal::{Wal, WalError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Wal(#[from] WalError),
}

struct Inner {
    state: StoreState,
    wal: Wal,
}

impl Inner {
    fn commit(&mut self, event: StoreEvent) -> Result<(), StoreError> {
        self.wal.append(&event)?;
        self.state.apply(&event);
        Ok(())
    }
}

/// Handle on the persisted entity state. Cheap to share behind an `Arc`.
pub struct Store {
    inner: Mutex<Inner>,
}

impl Store {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let (wal, state) = Wal::open(dir)?;
        Ok(Self { inner: Mutex::new(Inner { state, wal }) })
    }

    /// Snapshot the current state and truncate the WAL.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let state = inner.state.clone();
        inner.wal.compact(&state)?;
        Ok(())
    }

    /// Read-only access to a consistent view of the state.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        f(&self.inner.lock().state)
    }

    // ----- projects -----

    pub fn create_project(
        &self,
        name: &str,
        synchronous_builds: bool,
        allowed_host_tags: Option<Vec<String>>,
        now_ms: u64,
    ) -> Result<Project, StoreError> {
        let mut inner = self.inner.lock();
        if inner.state.projects.contains_key(name) {
            return Err(StoreError::Conflict(format!("project '{name}' already exists")));
        }
        let mut project = Project::new(name, now_ms);
        project.synchronous_builds = synchronous_builds;
        project.allowed_host_tags = allowed_host_tags;
        inner.commit(StoreEvent::ProjectCreated { project: project.clone() })?;
        Ok(project)
    }

    pub fn get_project(&self, name: &str) -> Result<Project, StoreError> {
        self.read(|s| s.projects.get(name).cloned())
            .ok_or_else(|| StoreError::NotFound("project", name.to_string()))
    }

    pub fn list_projects(&self) -> Vec<Project> {
        self.read(|s| {
            let mut all: Vec<_> = s.projects.values().filter(|p| !p.deleted).cloned().collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            all
        })
    }

    pub fn delete_project(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.projects.contains_key(name) {
            return Err(StoreError::NotFound("project", name.to_string()));
        }
        inner.commit(StoreEvent::ProjectDeleted { name: name.to_string() })
    }

    // ----- triggers -----

    pub fn create_trigger(
        &self,
        project: &str,
        trigger_type: TriggerType,
        secrets_enc: String,
        definition_repo: Option<String>,
        definition_file: Option<String>,
    ) -> Result<ProjectTrigger, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.projects.contains_key(project) {
            return Err(StoreError::NotFound("project", project.to_string()));
        }
        let trigger = ProjectTrigger {
            id: inner.state.next_trigger_id.max(1),
            project: project.to_string(),
            trigger_type,
            definition_repo,
            definition_file,
            secrets_enc,
        };
        inner.commit(StoreEvent::TriggerCreated { trigger: trigger.clone() })?;
        Ok(trigger)
    }

    pub fn get_trigger(&self, id: u32) -> Result<ProjectTrigger, StoreError> {
        self.read(|s| s.triggers.get(&id).cloned())
            .ok_or_else(|| StoreError::NotFound("trigger", id.to_string()))
    }

    pub fn triggers_for(&self, project: &str) -> Vec<ProjectTrigger> {
        self.read(|s| {
            let mut all: Vec<_> =
                s.triggers.values().filter(|t| t.project == project).cloned().collect();
            all.sort_by_key(|t| t.id);
            all
        })
    }

    pub fn update_trigger(
        &self,
        id: u32,
        secrets_enc: Option<String>,
        definition_repo: Option<String>,
        definition_file: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.triggers.contains_key(&id) {
            return Err(StoreError::NotFound("trigger", id.to_string()));
        }
        inner.commit(StoreEvent::TriggerUpdated { id, secrets_enc, definition_repo, definition_file })
    }

    pub fn delete_trigger(&self, id: u32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.triggers.contains_key(&id) {
            return Err(StoreError::NotFound("trigger", id.to_string()));
        }
        inner.commit(StoreEvent::TriggerDeleted { id })
    }

    // ----- builds -----

    /// Create the next build for a project. The id is `max(existing) + 1`,
    /// computed and committed under the store lock so concurrent creates for
    /// the same project serialise into dense, gap-free ids.
    pub fn create_build(
        &self,
        project: &str,
        trigger_name: Option<String>,
        reason: Option<String>,
        now_ms: u64,
    ) -> Result<Build, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.projects.contains_key(project) {
            return Err(StoreError::NotFound("project", project.to_string()));
        }
        let next_id = inner
            .state
            .builds
            .get(project)
            .and_then(|m| m.keys().next_back().copied())
            .unwrap_or(0)
            + 1;
        let mut build = Build::new(project, next_id, now_ms);
        build.trigger_name = trigger_name;
        build.reason = reason;
        inner.commit(StoreEvent::BuildCreated { build: build.clone() })?;
        Ok(build)
    }

    pub fn get_build(&self, project: &str, build_id: u32) -> Result<Build, StoreError> {
        self.read(|s| s.get_build(project, build_id).cloned())
            .ok_or_else(|| StoreError::NotFound("build", format!("{project}/{build_id}")))
    }

    /// Builds for a project, newest first.
    pub fn list_builds(&self, project: &str) -> Vec<Build> {
        self.read(|s| {
            s.builds
                .get(project)
                .map(|m| m.values().rev().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// The most recent build matching the filters, newest first.
    pub fn latest_build(
        &self,
        project: &str,
        trigger_name: Option<&str>,
        status: Option<BuildStatus>,
    ) -> Option<Build> {
        self.read(|s| {
            s.builds.get(project).and_then(|m| {
                m.values()
                    .rev()
                    .find(|b| {
                        status.is_none_or(|want| b.status == want)
                            && trigger_name.is_none_or(|t| b.trigger_name.as_deref() == Some(t))
                    })
                    .cloned()
            })
        })
    }

    pub fn annotate_build(
        &self,
        project: &str,
        build_id: u32,
        annotation: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.state.get_build(project, build_id).is_none() {
            return Err(StoreError::NotFound("build", format!("{project}/{build_id}")));
        }
        inner.commit(StoreEvent::BuildAnnotated {
            project: project.to_string(),
            build_id,
            annotation: annotation.to_string(),
        })
    }

    /// Promote a completed build. Fails with Conflict while any run is still
    /// active, or when the promotion name is already taken in the project.
    pub fn promote_build(
        &self,
        project: &str,
        build_id: u32,
        name: Option<String>,
        annotation: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let build = inner
            .state
            .get_build(project, build_id)
            .ok_or_else(|| StoreError::NotFound("build", format!("{project}/{build_id}")))?;
        if !build.complete() {
            return Err(StoreError::Conflict("Build is not yet complete".to_string()));
        }
        if let Some(n) = &name {
            let taken = inner.state.builds.get(project).is_some_and(|m| {
                m.values().any(|b| b.build_id != build_id && b.name.as_deref() == Some(n))
            });
            if taken {
                return Err(StoreError::Conflict(format!("build name '{n}' already in use")));
            }
        }
        inner.commit(StoreEvent::BuildPromoted {
            project: project.to_string(),
            build_id,
            name,
            annotation,
        })
    }

    // ----- runs -----

    /// Insert a QUEUED run. `(build, name)` must be unique.
    #[allow(clippy::too_many_arguments)]
    pub fn create_run(
        &self,
        project: &str,
        build_id: u32,
        name: &str,
        trigger_name: &str,
        trigger_type: TriggerType,
        host_tag: &str,
        queue_priority: i32,
        now_ms: u64,
    ) -> Result<Run, StoreError> {
        let mut inner = self.inner.lock();
        if inner.state.get_build(project, build_id).is_none() {
            return Err(StoreError::NotFound("build", format!("{project}/{build_id}")));
        }
        if inner.state.find_run(project, build_id, name).is_some() {
            return Err(StoreError::Conflict(format!("A run named \"{name}\" already exists")));
        }
        let id = inner.state.next_run_id.max(1);
        let mut run = Run::new(project, build_id, id, name, trigger_name, new_api_key(), now_ms);
        run.trigger_type = trigger_type;
        run.host_tag = host_tag.to_string();
        run.queue_priority = queue_priority;
        inner.commit(StoreEvent::RunCreated { run: run.clone() })?;
        Ok(run)
    }

    pub fn get_run(&self, project: &str, build_id: u32, name: &str) -> Result<Run, StoreError> {
        self.read(|s| s.find_run(project, build_id, name).cloned()).ok_or_else(|| {
            StoreError::NotFound("run", format!("{project}/{build_id}/{name}"))
        })
    }

    pub fn get_run_by_id(&self, run_id: u64) -> Result<Run, StoreError> {
        self.read(|s| s.runs.get(&run_id).cloned())
            .ok_or_else(|| StoreError::NotFound("run", run_id.to_string()))
    }

    pub fn runs_for_build(&self, project: &str, build_id: u32) -> Vec<Run> {
        self.read(|s| s.runs_for_build(project, build_id).into_iter().cloned().collect())
    }

    /// Record a run transition. Rejects anything the run state machine does
    /// not allow: terminal statuses are sinks. The parent build's aggregate
    /// status refreshes as part of the same committed event.
    pub fn record_run_status(
        &self,
        run_id: u64,
        status: BuildStatus,
        now_ms: u64,
    ) -> Result<Run, StoreError> {
        let mut inner = self.inner.lock();
        let run = inner
            .state
            .runs
            .get(&run_id)
            .ok_or_else(|| StoreError::NotFound("run", run_id.to_string()))?;
        if !run.status.run_transition_allowed(status) {
            return Err(StoreError::Conflict(format!(
                "run '{}' cannot move {} -> {status}",
                run.name, run.status
            )));
        }
        inner.commit(StoreEvent::RunStatusChanged { run_id, status, time_ms: now_ms })?;
        Ok(inner.state.runs[&run_id].clone())
    }

    /// Insert a run for an externally executed build: born PASSED, never
    /// queued for dispatch.
    pub fn create_external_run(
        &self,
        project: &str,
        build_id: u32,
        name: &str,
        trigger_name: &str,
        now_ms: u64,
    ) -> Result<Run, StoreError> {
        let mut inner = self.inner.lock();
        if inner.state.get_build(project, build_id).is_none() {
            return Err(StoreError::NotFound("build", format!("{project}/{build_id}")));
        }
        if inner.state.find_run(project, build_id, name).is_some() {
            return Err(StoreError::Conflict(format!("A run named \"{name}\" already exists")));
        }
        let id = inner.state.next_run_id.max(1);
        let mut run = Run::new(project, build_id, id, name, trigger_name, new_api_key(), now_ms);
        run.status = BuildStatus::Passed;
        run.completed_ms = Some(now_ms);
        run.status_events =
            vec![foreman_core::StatusEvent { status: BuildStatus::Passed, time_ms: now_ms }];
        inner.commit(StoreEvent::RunCreated { run: run.clone() })?;
        Ok(run)
    }

    pub fn ack_run(&self, run_id: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.runs.contains_key(&run_id) {
            return Err(StoreError::NotFound("run", run_id.to_string()));
        }
        inner.commit(StoreEvent::RunAcked { run_id })
    }

    /// Monitor reclaim: the worker never acknowledged the assignment.
    pub fn requeue_run(&self, run_id: u64, now_ms: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.runs.contains_key(&run_id) {
            return Err(StoreError::NotFound("run", run_id.to_string()));
        }
        inner.commit(StoreEvent::RunRequeued { run_id, time_ms: now_ms })
    }

    /// Dispatcher rollback: undo a claim whose response could not be built.
    pub fn rollback_assignment(&self, run_id: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.runs.contains_key(&run_id) {
            return Err(StoreError::NotFound("run", run_id.to_string()));
        }
        inner.commit(StoreEvent::RunDispatchRolledBack { run_id })
    }

    /// Cancel a build: every non-terminal run goes to CANCELLING. Runs with
    /// no worker are reaped by the monitor's cancelled sweep.
    pub fn cancel_build(&self, project: &str, build_id: u32, now_ms: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.state.get_build(project, build_id).is_none() {
            return Err(StoreError::NotFound("build", format!("{project}/{build_id}")));
        }
        let targets: Vec<u64> = inner
            .state
            .runs
            .values()
            .filter(|r| r.project == project && r.build_id == build_id && !r.is_terminal())
            .map(|r| r.id)
            .collect();
        for run_id in targets {
            inner.commit(StoreEvent::RunStatusChanged {
                run_id,
                status: BuildStatus::Cancelling,
                time_ms: now_ms,
            })?;
        }
        Ok(())
    }

    // ----- dispatch -----

    /// Atomically pop at most one QUEUED run for a worker check-in.
    ///
    /// Candidates are QUEUED runs whose host-tag glob-matches one of the
    /// worker's effective tags (or names the worker). Runs of synchronous
    /// projects are blocked while any earlier build of the project still has
    /// an active run; runs within the same build never block each other.
    /// Winners order by queue priority (higher first), then run id (oldest
    /// first). The claim (RUNNING, worker set, audit event, ack cleared)
    /// commits before this returns, so no other check-in can see the run.
    ///
    /// `surge_tags` is the set of host-tags currently under surge; a
    /// surges-only worker is restricted to runs queued for those tags.
    pub fn pop_queued_for_worker(
        &self,
        worker: &Worker,
        surge_tags: &HashSet<String>,
        now_ms: u64,
    ) -> Result<Option<Run>, StoreError> {
        let mut inner = self.inner.lock();
        let tags: Vec<String> =
            worker.effective_host_tags().iter().map(|t| t.to_string()).collect();

        let mut candidates: Vec<(i32, u64)> = Vec::new();
        for run in inner.state.runs.values() {
            if run.status != BuildStatus::Queued {
                continue;
            }
            if !run_matches_worker(&run.host_tag, &worker.name, tags.iter().map(String::as_str)) {
                continue;
            }
            if worker.surges_only && !surge_tags.contains(&run.host_tag) {
                continue;
            }
            if is_sync_blocked(&inner.state, run) {
                continue;
            }
            candidates.push((run.queue_priority, run.id));
        }

        // Highest priority first; ties go to the oldest run.
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let Some(&(_, run_id)) = candidates.first() else {
            return Ok(None);
        };

        inner.commit(StoreEvent::RunAssigned {
            run_id,
            worker: worker.name.clone(),
            time_ms: now_ms,
        })?;
        Ok(Some(inner.state.runs[&run_id].clone()))
    }

    // ----- tests -----

    pub fn create_test(
        &self,
        run_id: u64,
        name: &str,
        context: Option<String>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let run = inner
            .state
            .runs
            .get(&run_id)
            .ok_or_else(|| StoreError::NotFound("run", run_id.to_string()))?;
        if run.tests.iter().any(|t| t.name == name && t.context == context) {
            return Err(StoreError::Conflict(format!("test '{name}' already exists")));
        }
        inner.commit(StoreEvent::TestCreated {
            run_id,
            name: name.to_string(),
            context,
            time_ms: now_ms,
        })
    }

    pub fn update_test(
        &self,
        run_id: u64,
        name: &str,
        context: Option<String>,
        status: Option<BuildStatus>,
        results: Vec<TestResult>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let run = inner
            .state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| StoreError::NotFound("run", run_id.to_string()))?;
        if run.find_test_mut(name, context.as_deref()).is_none() {
            return Err(StoreError::NotFound("test", name.to_string()));
        }
        inner.commit(StoreEvent::TestUpdated {
            run_id,
            name: name.to_string(),
            context,
            status,
            results,
            time_ms: now_ms,
        })
    }

    // ----- workers -----

    pub fn create_worker(&self, worker: Worker) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.state.workers.contains_key(&worker.name) {
            return Err(StoreError::Conflict(format!(
                "worker '{}' already exists",
                worker.name
            )));
        }
        inner.commit(StoreEvent::WorkerCreated { worker })
    }

    pub fn get_worker(&self, name: &str) -> Result<Worker, StoreError> {
        self.read(|s| s.workers.get(name).cloned())
            .ok_or_else(|| StoreError::NotFound("worker", name.to_string()))
    }

    pub fn list_workers(&self) -> Vec<Worker> {
        self.read(|s| {
            let mut all: Vec<_> = s.workers.values().filter(|w| !w.deleted).cloned().collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            all
        })
    }

    pub fn update_worker(&self, name: &str, patch: WorkerPatch) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.workers.contains_key(name) {
            return Err(StoreError::NotFound("worker", name.to_string()));
        }
        inner.commit(StoreEvent::WorkerUpdated { name: name.to_string(), patch })
    }

    pub fn ping_worker(&self, name: &str, now_ms: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.workers.contains_key(name) {
            return Err(StoreError::NotFound("worker", name.to_string()));
        }
        inner.commit(StoreEvent::WorkerPinged { name: name.to_string(), time_ms: now_ms })
    }

    pub fn set_worker_online(&self, name: &str, online: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.workers.contains_key(name) {
            return Err(StoreError::NotFound("worker", name.to_string()));
        }
        inner.commit(StoreEvent::WorkerOnline { name: name.to_string(), online })
    }

    pub fn delete_worker(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.workers.contains_key(name) {
            return Err(StoreError::NotFound("worker", name.to_string()));
        }
        inner.commit(StoreEvent::WorkerDeleted { name: name.to_string() })
    }

    /// First bearer-token sighting of an unknown worker auto-creates a
    /// placeholder row; every sighting refreshes `allowed_tags` from the
    /// certificate.
    pub fn ensure_jwt_worker(
        &self,
        name: &str,
        allowed_tags: Vec<String>,
        now_ms: u64,
    ) -> Result<Worker, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.workers.contains_key(name) {
            let worker = Worker {
                name: name.to_string(),
                distro: "?".to_string(),
                mem_total: 1,
                cpu_total: 1,
                cpu_type: "?".to_string(),
                api_key: new_api_key(),
                concurrent_runs: 1,
                host_tags: Vec::new(),
                enlisted: true,
                online: false,
                surges_only: false,
                deleted: false,
                allowed_tags: allowed_tags.clone(),
                last_ping_ms: Some(now_ms),
            };
            inner.commit(StoreEvent::WorkerCreated { worker })?;
        }
        inner.commit(StoreEvent::WorkerUpdated {
            name: name.to_string(),
            patch: WorkerPatch { allowed_tags: Some(allowed_tags), ..WorkerPatch::default() },
        })?;
        Ok(inner.state.workers[name].clone())
    }

    // ----- monitor queries -----

    /// RUNNING runs whose assignment was never acknowledged and whose last
    /// transition is older than `cutoff_ms`.
    pub fn unacked_running(&self, cutoff_ms: u64) -> Vec<Run> {
        self.read(|s| {
            s.runs
                .values()
                .filter(|r| {
                    r.status == BuildStatus::Running
                        && !r.running_acked
                        && r.last_event_ms().is_some_and(|t| t < cutoff_ms)
                })
                .cloned()
                .collect()
        })
    }

    /// Runs stuck in `status` since before `cutoff_ms`.
    pub fn stale_runs(&self, status: BuildStatus, cutoff_ms: u64) -> Vec<Run> {
        self.read(|s| {
            s.runs
                .values()
                .filter(|r| r.status == status && r.last_event_ms().is_some_and(|t| t < cutoff_ms))
                .cloned()
                .collect()
        })
    }

    /// CANCELLING runs that never had (or lost) a worker.
    pub fn cancelled_unassigned(&self) -> Vec<Run> {
        self.read(|s| {
            s.runs
                .values()
                .filter(|r| r.status == BuildStatus::Cancelling && r.worker.is_none())
                .cloned()
                .collect()
        })
    }

    /// QUEUED run counts per host-tag, for the surge sweep.
    pub fn queued_by_tag(&self) -> HashMap<String, usize> {
        self.read(|s| {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for r in s.runs.values() {
                if r.status == BuildStatus::Queued {
                    *counts.entry(r.host_tag.clone()).or_default() += 1;
                }
            }
            counts
        })
    }
}

/// Synchronous-project blocking: a run is held back while any run of an
/// earlier build of the same project is still active. Runs within the same
/// build never block each other.
fn is_sync_blocked(state: &StoreState, run: &Run) -> bool {
    let synchronous = state
        .projects
        .get(&run.project)
        .is_some_and(|p| p.synchronous_builds);
    if !synchronous {
        return false;
    }
    state.runs.values().any(|other| {
        other.project == run.project
            && other.build_id < run.build_id
            && other.status.is_active()
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
