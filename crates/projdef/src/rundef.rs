// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RunDef: the fully resolved execution descriptor served to a worker.

use foreman_core::Run;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::def::{DefinitionError, ProjectDefinition, RunSpec, TriggerDef};

/// Script repository reference resolved into clone coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRepo {
    #[serde(rename = "clone-url")]
    pub clone_url: String,
    #[serde(rename = "git-ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    pub path: String,
}

/// Callback URLs stamped into a rundef. The dispatcher rewrites them to the
/// host the worker actually checked in on before serving the descriptor.
#[derive(Debug, Clone)]
pub struct RunUrls {
    pub run_url: String,
    pub runner_url: String,
    /// Present when the trigger declares chained triggers; exposed to the
    /// executor as `H_TRIGGER_URL`.
    pub trigger_url: Option<String>,
}

/// Everything the executor needs to run one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDef {
    pub run_url: String,
    pub runner_url: String,
    pub api_key: String,
    pub trigger_type: String,
    pub container: String,
    pub env: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(rename = "script-repo", default, skip_serializing_if = "Option::is_none")]
    pub script_repo: Option<ScriptRepo>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub secrets: IndexMap<String, String>,
    #[serde(rename = "persistent-volumes", default, skip_serializing_if = "Option::is_none")]
    pub persistent_volumes: Option<IndexMap<String, String>>,
    #[serde(rename = "shared-volumes", default, skip_serializing_if = "Option::is_none")]
    pub shared_volumes: Option<IndexMap<String, String>>,
    #[serde(rename = "max-mem-bytes", default, skip_serializing_if = "Option::is_none")]
    pub max_mem_bytes: Option<u64>,
    /// Minutes; enforced by the executor, backstopped by the stuck-run sweep.
    pub timeout: u32,
}

/// Resolve a run entry into its executor descriptor.
///
/// Parameter precedence, later wins: definition params, trigger params, run
/// params, caller params. Caller secrets override run-level secret defaults.
/// The run entity's `trigger_type` is authoritative: the pipeline already
/// applied any trigger upgrade to it.
pub fn build_run_def(
    def: &ProjectDefinition,
    trigger: &TriggerDef,
    spec: &RunSpec,
    run: &Run,
    params: &IndexMap<String, String>,
    secrets: &IndexMap<String, String>,
    urls: RunUrls,
) -> Result<RunDef, DefinitionError> {
    let mut env = IndexMap::new();
    for source in [&def.params, &trigger.params, &spec.params, params] {
        for (k, v) in source {
            env.insert(k.clone(), v.clone());
        }
    }
    env.insert("H_PROJECT".to_string(), run.project.clone());
    env.insert("H_BUILD".to_string(), run.build_id.to_string());
    env.insert("H_RUN".to_string(), run.name.clone());
    if let Some(url) = &urls.trigger_url {
        env.insert("H_TRIGGER_URL".to_string(), url.clone());
    }

    let mut merged_secrets = spec.secrets.clone();
    for (k, v) in secrets {
        merged_secrets.insert(k.clone(), v.clone());
    }

    let script = match &spec.script {
        Some(key) => Some(
            def.scripts
                .get(key)
                .cloned()
                .ok_or_else(|| DefinitionError::Invalid(format!("unknown script '{key}'")))?,
        ),
        None => None,
    };
    let script_repo = match &spec.script_repo {
        Some(r) => {
            let repo = def.script_repos.get(&r.name).ok_or_else(|| {
                DefinitionError::Invalid(format!("unknown script-repo '{}'", r.name))
            })?;
            Some(ScriptRepo {
                clone_url: repo.clone_url.clone(),
                git_ref: repo.git_ref.clone(),
                path: r.path.clone(),
            })
        }
        None => None,
    };

    Ok(RunDef {
        run_url: urls.run_url,
        runner_url: urls.runner_url,
        api_key: run.api_key.clone(),
        trigger_type: run.trigger_type.to_string(),
        container: spec.container.clone(),
        env,
        script,
        script_repo,
        secrets: merged_secrets,
        persistent_volumes: spec.persistent_volumes.clone(),
        shared_volumes: spec.shared_volumes.clone(),
        max_mem_bytes: spec.max_mem_bytes,
        timeout: def.timeout,
    })
}

#[cfg(test)]
#[path = "rundef_tests.rs"]
mod tests;
