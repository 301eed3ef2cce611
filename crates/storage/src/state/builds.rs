// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build, run, and test event handlers.

use foreman_core::{aggregate_status, BuildStatus, Test};

use super::{StoreEvent, StoreState};

pub(crate) fn apply(state: &mut StoreState, event: &StoreEvent) {
    match event {
        StoreEvent::BuildCreated { build } => {
            let builds = state.builds.entry(build.project.clone()).or_default();
            builds.entry(build.build_id).or_insert_with(|| build.clone());
        }

        StoreEvent::BuildAnnotated { project, build_id, annotation } => {
            if let Some(b) = state.builds.get_mut(project).and_then(|m| m.get_mut(build_id)) {
                b.annotation = Some(annotation.clone());
            }
        }

        StoreEvent::BuildPromoted { project, build_id, name, annotation } => {
            if let Some(b) = state.builds.get_mut(project).and_then(|m| m.get_mut(build_id)) {
                b.status = BuildStatus::Promoted;
                b.name.clone_from(name);
                b.annotation.clone_from(annotation);
            }
        }

        StoreEvent::RunCreated { run } => {
            if !state.runs.contains_key(&run.id) {
                state.runs.insert(run.id, run.clone());
            }
            if state.next_run_id <= run.id {
                state.next_run_id = run.id + 1;
            }
            refresh_build(state, &run.project.clone(), run.build_id);
        }

        StoreEvent::RunStatusChanged { run_id, status, time_ms } => {
            let Some(run) = state.runs.get_mut(run_id) else { return };
            // Idempotency: skip if this exact transition is already the tail
            // of the audit log.
            let dup = run.status == *status
                && run.status_events.last().map(|e| (e.status, e.time_ms))
                    == Some((*status, *time_ms));
            if !dup {
                run.record_status(*status, *time_ms);
            }
            let (project, build_id) = (run.project.clone(), run.build_id);
            refresh_build(state, &project, build_id);
        }

        StoreEvent::RunAssigned { run_id, worker, time_ms } => {
            let Some(run) = state.runs.get_mut(run_id) else { return };
            if run.worker.as_deref() == Some(worker) && run.status == BuildStatus::Running {
                return;
            }
            run.worker = Some(worker.clone());
            run.running_acked = false;
            run.record_status(BuildStatus::Running, *time_ms);
            let (project, build_id) = (run.project.clone(), run.build_id);
            refresh_build(state, &project, build_id);
        }

        StoreEvent::RunRequeued { run_id, time_ms } => {
            let Some(run) = state.runs.get_mut(run_id) else { return };
            if run.status == BuildStatus::Queued && run.worker.is_none() {
                return;
            }
            run.worker = None;
            run.running_acked = false;
            run.record_status(BuildStatus::Queued, *time_ms);
            let (project, build_id) = (run.project.clone(), run.build_id);
            refresh_build(state, &project, build_id);
        }

        StoreEvent::RunDispatchRolledBack { run_id } => {
            let Some(run) = state.runs.get_mut(run_id) else { return };
            // Undo the claim without leaving a transition in the audit log.
            run.worker = None;
            run.running_acked = false;
            run.status = BuildStatus::Queued;
            if run.status_events.last().map(|e| e.status) == Some(BuildStatus::Running) {
                run.status_events.pop();
            }
            let (project, build_id) = (run.project.clone(), run.build_id);
            refresh_build(state, &project, build_id);
        }

        StoreEvent::RunAcked { run_id } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                run.running_acked = true;
            }
        }

        StoreEvent::TestCreated { run_id, name, context, time_ms } => {
            let Some(run) = state.runs.get_mut(run_id) else { return };
            let exists = run
                .tests
                .iter()
                .any(|t| t.name == *name && t.context == *context);
            if !exists {
                run.tests.push(Test::new(name.clone(), context.clone(), *time_ms));
            }
        }

        StoreEvent::TestUpdated { run_id, name, context, status, results, time_ms } => {
            let Some(run) = state.runs.get_mut(run_id) else { return };
            if let Some(test) = run.find_test_mut(name, context.as_deref()) {
                if let Some(s) = status {
                    test.status = *s;
                }
                for r in results {
                    if !test.results.iter().any(|x| x.name == r.name && x.context == r.context) {
                        test.results.push(r.clone());
                    }
                }
            }
            resolve_run_from_tests(state, *run_id, *time_ms);
        }

        _ => {}
    }
}

/// Recompute a build's aggregate status from its runs (spec'd as a pure
/// function of run statuses). PROMOTED is a manual post-terminal state and
/// is never overwritten.
pub(crate) fn refresh_build(state: &mut StoreState, project: &str, build_id: u32) {
    let statuses: Vec<BuildStatus> = state
        .runs
        .values()
        .filter(|r| r.project == project && r.build_id == build_id)
        .map(|r| r.status)
        .collect();
    let completed_at = state
        .runs
        .values()
        .filter(|r| r.project == project && r.build_id == build_id)
        .filter_map(|r| r.completed_ms)
        .max();
    if let Some(b) = state.builds.get_mut(project).and_then(|m| m.get_mut(&build_id)) {
        if b.status == BuildStatus::Promoted {
            return;
        }
        b.status = aggregate_status(statuses);
        b.completed_ms = if b.status.is_terminal() { completed_at } else { None };
    }
}

/// Once every test of a run is terminal, the run resolves: FAILED if any
/// test failed, else PASSED. Mirrors what workers expect when they report
/// results without a final run status.
fn resolve_run_from_tests(state: &mut StoreState, run_id: u64, time_ms: u64) {
    let Some(run) = state.runs.get_mut(&run_id) else { return };
    if run.is_terminal() || run.tests.is_empty() {
        return;
    }
    if !run.tests.iter().all(|t| t.status.is_terminal()) {
        return;
    }
    let failed = run
        .tests
        .iter()
        .any(|t| matches!(t.status, BuildStatus::Failed | BuildStatus::Cancelled));
    let status = if failed { BuildStatus::Failed } else { BuildStatus::Passed };
    run.record_status(status, time_ms);
    let (project, build_id) = (run.project.clone(), run.build_id);
    refresh_build(state, &project, build_id);
}
