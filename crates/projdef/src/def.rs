// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project definition tree: parse, validate, look up triggers.

use foreman_core::TriggerType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DefinitionError {
    /// The definition parsed but violates a structural rule.
    #[error("invalid project definition: {0}")]
    Invalid(String),
    #[error("invalid project definition: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid project definition: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where build notifications go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub users: String,
    #[serde(default, rename = "only_failures")]
    pub only_failures: bool,
}

/// A git repository holding scripts shared across definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRepoDef {
    #[serde(rename = "clone-url")]
    pub clone_url: String,
    #[serde(rename = "git-ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

/// A run's reference into `script-repos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRepoRef {
    pub name: String,
    pub path: String,
}

/// A chained trigger entry: fires after every run of the parent trigger
/// completes. Its presence makes the pipeline persist the build's params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainedTrigger {
    pub name: String,
    #[serde(rename = "run-names", default, skip_serializing_if = "Option::is_none")]
    pub run_names: Option<String>,
}

/// One run entry under a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    pub name: String,
    #[serde(rename = "host-tag")]
    pub host_tag: String,
    pub container: String,
    /// Key into the top-level `scripts` map. Exactly one of `script` and
    /// `script-repo` must be set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(rename = "script-repo", default, skip_serializing_if = "Option::is_none")]
    pub script_repo: Option<ScriptRepoRef>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub secrets: IndexMap<String, String>,
    #[serde(rename = "persistent-volumes", default, skip_serializing_if = "Option::is_none")]
    pub persistent_volumes: Option<IndexMap<String, String>>,
    #[serde(rename = "shared-volumes", default, skip_serializing_if = "Option::is_none")]
    pub shared_volumes: Option<IndexMap<String, String>>,
    #[serde(rename = "max-mem-bytes", default, skip_serializing_if = "Option::is_none")]
    pub max_mem_bytes: Option<u64>,
    /// Chained triggers scoped to this run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<ChainedTrigger>,
}

/// A trigger entry: the unit the trigger pipeline materializes into runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDef {
    pub name: String,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, String>,
    /// Format string applied to every run name; `{name}` expands to the
    /// run entry's own name.
    #[serde(rename = "run-names", default, skip_serializing_if = "Option::is_none")]
    pub run_names: Option<String>,
    pub runs: Vec<RunSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<ChainedTrigger>,
}

/// A validated project definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDefinition {
    /// Per-run timeout in minutes, enforced by the executor.
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailConfig>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scripts: IndexMap<String, String>,
    #[serde(rename = "script-repos", default, skip_serializing_if = "IndexMap::is_empty")]
    pub script_repos: IndexMap<String, ScriptRepoDef>,
    pub triggers: Vec<TriggerDef>,
}

fn default_timeout() -> u32 {
    30
}

/// Expand a `run-names` format string: `{name}` is the run entry's name.
pub fn format_run_name(fmt: &str, name: &str) -> String {
    fmt.replace("{name}", name)
}

impl ProjectDefinition {
    /// Parse and validate a YAML document.
    pub fn from_yaml(raw: &str) -> Result<Self, DefinitionError> {
        let def: Self = serde_yaml::from_str(raw)?;
        def.validate()?;
        Ok(def)
    }

    /// Parse and validate a definition embedded in a JSON request body.
    pub fn from_value(value: serde_json::Value) -> Result<Self, DefinitionError> {
        let def: Self = serde_json::from_value(value)?;
        def.validate()?;
        Ok(def)
    }

    /// Serialize back to YAML for persistence as `project.yml`.
    pub fn to_yaml(&self) -> Result<String, DefinitionError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Enforce the structural rules serde cannot express.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.triggers.is_empty() {
            return Err(DefinitionError::Invalid("no triggers defined".to_string()));
        }
        let mut trigger_names = std::collections::HashSet::new();
        for trigger in &self.triggers {
            if !trigger_names.insert(trigger.name.as_str()) {
                return Err(DefinitionError::Invalid(format!(
                    "duplicate trigger name: {}",
                    trigger.name
                )));
            }
            if trigger.runs.is_empty() {
                return Err(DefinitionError::Invalid(format!(
                    "trigger '{}' has no runs",
                    trigger.name
                )));
            }
            let mut run_names = std::collections::HashSet::new();
            for run in &trigger.runs {
                if !run_names.insert(run.name.as_str()) {
                    return Err(DefinitionError::Invalid(format!(
                        "trigger '{}' declares run '{}' more than once",
                        trigger.name, run.name
                    )));
                }
                self.validate_run(trigger, run)?;
            }
            for chained in &trigger.triggers {
                if !self.triggers.iter().any(|t| t.name == chained.name) {
                    return Err(DefinitionError::Invalid(format!(
                        "trigger '{}' chains unknown trigger '{}'",
                        trigger.name, chained.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_run(&self, trigger: &TriggerDef, run: &RunSpec) -> Result<(), DefinitionError> {
        if run.host_tag.is_empty() {
            return Err(DefinitionError::Invalid(format!(
                "run '{}/{}' is missing a host-tag",
                trigger.name, run.name
            )));
        }
        match (&run.script, &run.script_repo) {
            (Some(script), None) => {
                if !self.scripts.contains_key(script) {
                    return Err(DefinitionError::Invalid(format!(
                        "run '{}/{}' references unknown script '{}'",
                        trigger.name, run.name, script
                    )));
                }
            }
            (None, Some(repo)) => {
                if !self.script_repos.contains_key(&repo.name) {
                    return Err(DefinitionError::Invalid(format!(
                        "run '{}/{}' references unknown script-repo '{}'",
                        trigger.name, run.name, repo.name
                    )));
                }
            }
            (Some(_), Some(_)) => {
                return Err(DefinitionError::Invalid(format!(
                    "run '{}/{}' sets both script and script-repo",
                    trigger.name, run.name
                )));
            }
            (None, None) => {
                return Err(DefinitionError::Invalid(format!(
                    "run '{}/{}' needs either script or script-repo",
                    trigger.name, run.name
                )));
            }
        }
        Ok(())
    }

    pub fn get_trigger(&self, name: &str) -> Option<&TriggerDef> {
        self.triggers.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
#[path = "def_tests.rs"]
mod tests;
