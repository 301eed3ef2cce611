// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project: a named namespace owning builds and triggers.

use serde::{Deserialize, Serialize};

/// A project namespace. Soft-deleted projects keep their builds and triggers
/// but refuse new work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    /// When set, a run of build N is not dispatched while any run of an
    /// earlier build of this project is still active.
    #[serde(default)]
    pub synchronous_builds: bool,
    /// Optional whitelist of host-tags runs of this project may request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_host_tags: Option<Vec<String>>,
    #[serde(default)]
    pub deleted: bool,
    pub created_ms: u64,
}

impl Project {
    pub fn new(name: impl Into<String>, created_ms: u64) -> Self {
        Self {
            name: name.into(),
            synchronous_builds: false,
            allowed_host_tags: None,
            deleted: false,
            created_ms,
        }
    }
}
