// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hierarchical test artifacts posted by a worker while its run executes.

use serde::{Deserialize, Serialize};

use crate::status::BuildStatus;

/// A test attached to a run. `(run, name, context)` uniquely identifies a
/// test; the context disambiguates tests sharing a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub status: BuildStatus,
    pub created_ms: u64,
    #[serde(default)]
    pub results: Vec<TestResult>,
}

impl Test {
    pub fn new(name: impl Into<String>, context: Option<String>, created_ms: u64) -> Self {
        Self {
            name: name.into(),
            context,
            status: BuildStatus::Running,
            created_ms,
            results: Vec::new(),
        }
    }
}

/// A single result row under a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub status: BuildStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}
