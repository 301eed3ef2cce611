// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build: one attempt to execute a project definition.

use serde::{Deserialize, Serialize};

use crate::status::BuildStatus;

/// A build. `build_id` values are dense and gap-free within a project; the
/// aggregate `status` is a pure function of the build's runs (recomputed
/// after every run transition), except for PROMOTED which is set manually
/// after completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub project: String,
    pub build_id: u32,
    pub status: BuildStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Set on promotion; unique within the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    pub created_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_ms: Option<u64>,
}

impl Build {
    pub fn new(project: impl Into<String>, build_id: u32, created_ms: u64) -> Self {
        Self {
            project: project.into(),
            build_id,
            status: BuildStatus::Queued,
            trigger_name: None,
            reason: None,
            name: None,
            annotation: None,
            created_ms,
            completed_ms: None,
        }
    }

    /// A build is complete once its aggregate status is terminal.
    pub fn complete(&self) -> bool {
        self.status.is_terminal()
    }
}

crate::builder! {
    pub struct BuildBuilder => Build {
        into {
            project: String = "proj-1",
        }
        set {
            build_id: u32 = 1,
            status: BuildStatus = BuildStatus::Queued,
            created_ms: u64 = 0,
        }
        option {
            trigger_name: String = None,
            reason: String = None,
            name: String = None,
            annotation: String = None,
            completed_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
