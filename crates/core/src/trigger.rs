// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stored trigger configuration: how external events produce builds.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::status::StatusParseError;

/// Closed set of trigger kinds. Each kind selects a webhook-validation and
/// status-reporting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Simple,
    GitPoller,
    GithubPr,
    GitlabMr,
}

crate::simple_display! {
    TriggerType {
        Simple => "simple",
        GitPoller => "git_poller",
        GithubPr => "github_pr",
        GitlabMr => "gitlab_mr",
    }
}

impl FromStr for TriggerType {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Self::Simple),
            "git_poller" => Ok(Self::GitPoller),
            "github_pr" => Ok(Self::GithubPr),
            "gitlab_mr" => Ok(Self::GitlabMr),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// A stored trigger for a project. `secrets_enc` holds the trigger's secret
/// map encrypted at rest; it is decrypted only inside the trigger pipeline
/// and never serialized to API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTrigger {
    pub id: u32,
    pub project: String,
    pub trigger_type: TriggerType,
    /// Repository holding an out-of-tree project definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_repo: Option<String>,
    /// File within `definition_repo`; defaults to `<project>.yml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_file: Option<String>,
    pub secrets_enc: String,
}
