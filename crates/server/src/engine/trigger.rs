// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger pipeline: materialize a build and its queued runs from a
//! project definition.

use std::sync::Arc;

use foreman_core::{Build, BuildStatus, Clock, Run, TriggerType};
use foreman_projdef::{build_run_def, format_run_name, ProjectDefinition, RunUrls, TriggerDef};
use foreman_storage::BlobStore;
use indexmap::IndexMap;

use super::Engine;
use crate::error::ApiError;

/// Caller-supplied inputs to a build trigger.
#[derive(Debug, Clone, Default)]
pub struct TriggerOptions {
    pub trigger_name: String,
    pub reason: Option<String>,
    pub params: IndexMap<String, String>,
    /// Already decrypted; merged into each rundef.
    pub secrets: IndexMap<String, String>,
    pub queue_priority: i32,
}

/// Deferred half of a webhook-triggered build: the blob persistence and run
/// materialization, run after the HTTP reply went out. A failure mid-commit
/// marks the build failed with a `build-failure` diagnostic run and hands
/// back the failure's artifact URL.
pub struct PendingCommit<C: Clock> {
    engine: Arc<Engine<C>>,
    build: Build,
    projdef: ProjectDefinition,
    opts: TriggerOptions,
    parent_type: Option<TriggerType>,
}

impl<C: Clock> PendingCommit<C> {
    pub fn commit(self) -> Result<(), ApiError> {
        self.engine.persist_and_materialize(&self.build, &self.projdef, &self.opts, self.parent_type)
    }
}

/// `github_pr` and `git_poller` builds upgrade chained `simple` entries so
/// their runs engage the PR-status reporting path.
fn upgraded_type(child: TriggerType, parent: Option<TriggerType>) -> TriggerType {
    match (parent, child) {
        (Some(TriggerType::GithubPr), TriggerType::Simple) => {
            tracing::info!("updating the rundef from simple to github_pr");
            TriggerType::GithubPr
        }
        (Some(TriggerType::GitPoller), TriggerType::Simple) => {
            tracing::info!("updating the rundef from simple to git_poller");
            TriggerType::GitPoller
        }
        _ => child,
    }
}

impl<C: Clock> Engine<C> {
    /// Trigger a build and materialize its runs before returning.
    pub fn trigger_build(
        &self,
        project: &str,
        projdef: ProjectDefinition,
        opts: TriggerOptions,
    ) -> Result<Build, ApiError> {
        let build = self.start_build(project, &projdef, &opts)?;
        self.persist_and_materialize(&build, &projdef, &opts, None)?;
        Ok(self.store.get_build(project, build.build_id)?)
    }

    /// Webhook flavor: create the build, return it together with the
    /// deferred persistence + materialization step so the caller can reply
    /// first.
    pub fn trigger_build_deferred(
        self: Arc<Self>,
        project: &str,
        projdef: ProjectDefinition,
        opts: TriggerOptions,
        parent_type: Option<TriggerType>,
    ) -> Result<(Build, PendingCommit<C>), ApiError> {
        let build = self.start_build(project, &projdef, &opts)?;
        let pending = PendingCommit {
            engine: self,
            build: build.clone(),
            projdef,
            opts,
            parent_type,
        };
        Ok((build, pending))
    }

    fn start_build(
        &self,
        project: &str,
        projdef: &ProjectDefinition,
        opts: &TriggerOptions,
    ) -> Result<Build, ApiError> {
        let proj = self.store.get_project(project)?;
        if proj.deleted {
            return Err(ApiError::NotFound(format!("project not found: {project}")));
        }
        projdef.validate()?;
        if projdef.get_trigger(&opts.trigger_name).is_none() {
            return Err(ApiError::Validation(format!(
                "Project({project}) does not have a trigger: {}",
                opts.trigger_name
            )));
        }
        Ok(self.store.create_build(
            project,
            Some(opts.trigger_name.clone()),
            opts.reason.clone(),
            self.now_ms(),
        )?)
    }

    fn persist_and_materialize(
        &self,
        build: &Build,
        projdef: &ProjectDefinition,
        opts: &TriggerOptions,
        parent_type: Option<TriggerType>,
    ) -> Result<(), ApiError> {
        // A validated trigger name cannot vanish between start and commit,
        // but the deferred path re-checks to fail loudly instead of
        // panicking in a detached task.
        let Some(trigger) = projdef.get_trigger(&opts.trigger_name) else {
            return Err(self.fail_unexpected(
                build,
                &format!("trigger disappeared: {}", opts.trigger_name),
            ));
        };

        let prefix = format!("{}/{}", build.project, build.build_id);
        let persisted = projdef
            .to_yaml()
            .map_err(ApiError::from)
            .and_then(|yaml| {
                self.blobs.put(&format!("{prefix}/project.yml"), yaml.as_bytes())?;
                Ok(())
            })
            .and_then(|()| {
                if trigger.triggers.is_empty()
                    && trigger.runs.iter().all(|r| r.triggers.is_empty())
                {
                    return Ok(());
                }
                // Chained triggers fire later and need this build's params.
                let params = serde_json::to_vec(&opts.params)
                    .map_err(|e| ApiError::unexpected("bad params", e.to_string()))?;
                self.blobs.put(&format!("{prefix}/params.json"), &params)?;
                Ok(())
            });
        if let Err(err) = persisted {
            return Err(self.fail_unexpected(build, &err.to_string()));
        }

        self.trigger_runs(build, projdef, trigger, &opts.params, &opts.secrets, parent_type, opts.queue_priority)
    }

    /// Materialize one trigger's run entries into QUEUED runs of `build`.
    pub(crate) fn trigger_runs(
        &self,
        build: &Build,
        projdef: &ProjectDefinition,
        trigger: &TriggerDef,
        params: &IndexMap<String, String>,
        secrets: &IndexMap<String, String>,
        parent_type: Option<TriggerType>,
        queue_priority: i32,
    ) -> Result<(), ApiError> {
        let project = self.store.get_project(&build.project)?;
        let mut added: Vec<u64> = Vec::new();

        let result = (|| -> Result<(), ApiError> {
            for spec in &trigger.runs {
                let name = match &trigger.run_names {
                    Some(fmt) => format_run_name(fmt, &spec.name),
                    None => spec.name.clone(),
                };
                let effective_type = upgraded_type(trigger.trigger_type, parent_type);
                let run = self.store.create_run(
                    &build.project,
                    build.build_id,
                    &name,
                    &trigger.name,
                    effective_type,
                    &spec.host_tag,
                    queue_priority,
                    self.now_ms(),
                )?;
                added.push(run.id);

                if let Some(allowed) = &project.allowed_host_tags {
                    if !allowed.iter().any(|t| t == &spec.host_tag) {
                        let error = format!(
                            "Run requested a host-tag that is not configured for this project: {}\n",
                            spec.host_tag
                        );
                        tracing::error!(run = %name, "{}", error.trim_end());
                        self.blobs.append(
                            &format!("{}/console.log", run.storage_prefix()),
                            error.as_bytes(),
                        )?;
                        self.store.record_run_status(run.id, BuildStatus::Failed, self.now_ms())?;
                        continue;
                    }
                }

                let chained = !trigger.triggers.is_empty() || !spec.triggers.is_empty();
                let urls = RunUrls {
                    run_url: self.config.run_api_url(&build.project, build.build_id, &name),
                    runner_url: format!("{}/runner", self.config.base_url),
                    trigger_url: chained.then(|| self.config.trigger_api_url(&build.project)),
                };
                let rundef = build_run_def(projdef, trigger, spec, &run, params, secrets, urls)?;
                let encoded = serde_json::to_vec_pretty(&rundef)
                    .map_err(|e| ApiError::unexpected("bad rundef", e.to_string()))?;
                self.blobs.put(&format!("{}/.rundef.json", run.storage_prefix()), &encoded)?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => Ok(()),
            // Duplicate run names surface as-is; the caller sees the 409
            // equivalent.
            Err(err @ (ApiError::Conflict(_) | ApiError::Validation(_))) => Err(err),
            Err(err) => {
                tracing::error!(%err, trigger = %trigger.name, "unexpected error creating runs");
                for run_id in added {
                    if let Ok(run) = self.store.get_run_by_id(run_id) {
                        if !run.is_terminal() {
                            let _ = self.store.record_run_status(
                                run_id,
                                BuildStatus::Failed,
                                self.now_ms(),
                            );
                        }
                    }
                }
                Err(ApiError::unexpected("An unexpected error occurred", err.to_string()))
            }
        }
    }

    /// Trigger-pipeline failure after the build row exists: insert a
    /// synthetic `build-failure` run carrying the diagnostic, so the caller
    /// always gets an artifact to look at.
    pub(crate) fn fail_unexpected(&self, build: &Build, detail: &str) -> ApiError {
        let location = match self.store.create_run(
            &build.project,
            build.build_id,
            "build-failure",
            "build-failure",
            TriggerType::Simple,
            "",
            0,
            self.now_ms(),
        ) {
            Ok(run) => {
                let _ = self.store.record_run_status(run.id, BuildStatus::Failed, self.now_ms());
                let msg = format!("Unexpected error prevented build from running:\n{detail}");
                let _ = self
                    .blobs
                    .append(&format!("{}/console.log", run.storage_prefix()), msg.as_bytes());
                Some(self.config.build_web_url(&build.project, build.build_id).unwrap_or_else(
                    || {
                        format!(
                            "{}/projects/{}/builds/{}/runs/build-failure/console.log",
                            self.config.base_url, build.project, build.build_id
                        )
                    },
                ))
            }
            Err(err) => {
                tracing::error!(%err, "unable to record build failure");
                None
            }
        };
        ApiError::Unexpected {
            message: detail.to_string(),
            detail: detail.to_string(),
            location,
        }
    }

    /// After a run passes: if its trigger chains others and every sibling of
    /// the same trigger passed, materialize the chained triggers' runs into
    /// the same build.
    pub(crate) fn fire_chained_triggers(&self, run: &Run) -> Result<(), ApiError> {
        let prefix = format!("{}/{}", run.project, run.build_id);
        let projdef_raw = match self.blobs.get(&format!("{prefix}/project.yml")) {
            Ok(raw) => raw,
            // Externally recorded builds have no stored definition.
            Err(_) => return Ok(()),
        };
        let projdef = ProjectDefinition::from_yaml(&String::from_utf8_lossy(&projdef_raw))?;
        let Some(trigger) = projdef.get_trigger(&run.trigger_name) else {
            return Ok(());
        };

        let spec_triggers = trigger
            .runs
            .iter()
            .find(|s| {
                let expanded = trigger
                    .run_names
                    .as_ref()
                    .map(|fmt| format_run_name(fmt, &s.name))
                    .unwrap_or_else(|| s.name.clone());
                expanded == run.name
            })
            .map(|s| s.triggers.clone())
            .unwrap_or_default();
        let mut chained = trigger.triggers.clone();
        chained.extend(spec_triggers);
        if chained.is_empty() {
            return Ok(());
        }

        // Wait for every sibling from this trigger to pass.
        let siblings = self.store.runs_for_build(&run.project, run.build_id);
        let all_passed = siblings
            .iter()
            .filter(|r| r.trigger_name == trigger.name)
            .all(|r| r.status == BuildStatus::Passed);
        if !all_passed {
            return Ok(());
        }

        let params: IndexMap<String, String> = self
            .blobs
            .get(&format!("{prefix}/params.json"))
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .unwrap_or_default();

        let build = self.store.get_build(&run.project, run.build_id)?;
        for entry in chained {
            let Some(child) = projdef.get_trigger(&entry.name) else { continue };
            // Already fired if any of the child's runs exist.
            let fired = child.runs.iter().any(|s| {
                let name = entry
                    .run_names
                    .as_ref()
                    .or(child.run_names.as_ref())
                    .map(|fmt| format_run_name(fmt, &s.name))
                    .unwrap_or_else(|| s.name.clone());
                siblings.iter().any(|r| r.name == name)
            });
            if fired {
                continue;
            }
            let mut child = child.clone();
            if let Some(fmt) = &entry.run_names {
                child.run_names = Some(fmt.clone());
            }
            self.trigger_runs(
                &build,
                &projdef,
                &child,
                &params,
                &IndexMap::new(),
                Some(run.trigger_type),
                run.queue_priority,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
