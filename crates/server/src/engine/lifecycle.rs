// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run state machine: worker-driven status updates, console streaming, and
//! test reporting.

use foreman_core::{BuildStatus, Clock, Run, TestResult};
use foreman_storage::BlobStore;

use super::Engine;
use crate::auth::constant_time_eq;
use crate::error::ApiError;

/// Parsed body of a test PUT.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TestUpdate {
    pub status: Option<String>,
    #[serde(default)]
    pub results: Vec<TestResultInput>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TestResultInput {
    pub name: String,
    #[serde(default)]
    pub context: Option<String>,
    pub status: String,
    #[serde(default)]
    pub output: Option<String>,
}

impl<C: Clock> Engine<C> {
    /// Look up a run and check its per-run api key in constant time.
    pub fn authenticate_run(
        &self,
        project: &str,
        build_id: u32,
        run_name: &str,
        token: &str,
    ) -> Result<Run, ApiError> {
        let run = self.store.get_run(project, build_id, run_name)?;
        if !constant_time_eq(token.as_bytes(), run.api_key.as_bytes()) {
            return Err(ApiError::AuthInvalid("Incorrect API key for run".to_string()));
        }
        Ok(run)
    }

    /// Handle a worker's run update: streamed console bytes plus an optional
    /// `X-RUN-STATUS` transition.
    ///
    /// The first message after dispatch acknowledges the assignment. A
    /// repeated RUNNING is a plain console append; log appends outside a
    /// transition record nothing in the audit log. QUEUED → RUNNING is the
    /// dispatcher's transition alone; a worker reporting it here races a
    /// reclaim and is told to conflict.
    pub fn update_run(
        &self,
        run: &Run,
        status_header: Option<&str>,
        console: &[u8],
    ) -> Result<(), ApiError> {
        if !console.is_empty() {
            self.blobs
                .append(&format!("{}/console.log", run.storage_prefix()), console)?;
        }
        if run.status == BuildStatus::Running && !run.running_acked {
            self.store.ack_run(run.id)?;
        }

        let Some(raw) = status_header else {
            return Ok(());
        };
        let status: BuildStatus = raw
            .parse()
            .map_err(|_| ApiError::Validation(format!("invalid X-RUN-STATUS: {raw}")))?;

        if status == run.status {
            return Ok(());
        }
        if run.status == BuildStatus::Queued && status == BuildStatus::Running {
            return Err(ApiError::Conflict(
                "run is not assigned; only the dispatcher starts runs".to_string(),
            ));
        }

        let updated = self.store.record_run_status(run.id, status, self.now_ms())?;
        tracing::info!(
            project = %run.project,
            build = run.build_id,
            run = %run.name,
            from = %run.status,
            to = %status,
            "run transition"
        );

        if updated.status == BuildStatus::Passed {
            if let Err(err) = self.fire_chained_triggers(&updated) {
                tracing::error!(%err, run = %run.name, "chained trigger failed");
            }
        }
        Ok(())
    }

    /// Create a test under a RUNNING run.
    pub fn create_test(
        &self,
        run: &Run,
        name: &str,
        context: Option<String>,
    ) -> Result<(), ApiError> {
        self.store.create_test(run.id, name, context, self.now_ms())?;
        Ok(())
    }

    /// Apply a test PUT: status and/or result rows. A terminal test status
    /// may resolve the whole run (all tests terminal → run PASSED/FAILED).
    /// Returns whether the test is now complete.
    pub fn update_test(
        &self,
        run: &Run,
        name: &str,
        context: Option<String>,
        update: TestUpdate,
    ) -> Result<bool, ApiError> {
        let status = match &update.status {
            Some(raw) => Some(
                raw.parse::<BuildStatus>()
                    .map_err(|_| ApiError::Validation(format!("invalid status: {raw}")))?,
            ),
            None => None,
        };
        let results: Vec<TestResult> = update
            .results
            .iter()
            .map(|r| {
                Ok(TestResult {
                    name: r.name.clone(),
                    context: r.context.clone(),
                    status: r
                        .status
                        .parse()
                        .map_err(|_| ApiError::Validation(format!("invalid status: {}", r.status)))?,
                    output: r.output.clone(),
                })
            })
            .collect::<Result<_, ApiError>>()?;

        self.store.update_test(run.id, name, context.clone(), status, results, self.now_ms())?;

        let run = self.store.get_run_by_id(run.id)?;
        let complete = run
            .tests
            .iter()
            .find(|t| t.name == name && (context.is_none() || t.context == context))
            .is_some_and(|t| t.status.is_terminal());
        if run.status == BuildStatus::Passed {
            if let Err(err) = self.fire_chained_triggers(&run) {
                tracing::error!(%err, run = %run.name, "chained trigger failed");
            }
        }
        Ok(complete)
    }

    /// Cancel every non-terminal run of a build. Workers observe CANCELLING
    /// on their next update; unassigned runs are reaped by the monitor.
    pub fn cancel_build(&self, project: &str, build_id: u32) -> Result<(), ApiError> {
        self.store.cancel_build(project, build_id, self.now_ms())?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
