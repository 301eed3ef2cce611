// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build and run status: the closed state set and its transition rules.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Status shared by builds, runs, and tests.
///
/// Terminal statuses are absorbing: once a run reaches one, no further
/// transition is recorded. PROMOTED and SKIPPED apply to builds only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Queued,
    Running,
    Uploading,
    Cancelling,
    Passed,
    Failed,
    Cancelled,
    Promoted,
    Skipped,
}

crate::simple_display! {
    BuildStatus {
        Queued => "QUEUED",
        Running => "RUNNING",
        Uploading => "UPLOADING",
        Cancelling => "CANCELLING",
        Passed => "PASSED",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
        Promoted => "PROMOTED",
        Skipped => "SKIPPED",
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("not a valid status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for BuildStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "UPLOADING" => Ok(Self::Uploading),
            "CANCELLING" => Ok(Self::Cancelling),
            "PASSED" => Ok(Self::Passed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            "PROMOTED" => Ok(Self::Promoted),
            "SKIPPED" => Ok(Self::Skipped),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

impl BuildStatus {
    /// Terminal statuses are sinks.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Passed | Self::Failed | Self::Cancelled | Self::Promoted | Self::Skipped
        )
    }

    /// A run in one of these states still occupies (or will occupy) a worker.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running | Self::Uploading | Self::Cancelling)
    }

    /// Whether a run may move from `self` to `to`.
    ///
    /// QUEUED → RUNNING is reserved for the dispatcher. A worker that reports
    /// a terminal status after a cancel wins: CANCELLING accepts PASSED as
    /// well as FAILED. Any non-terminal state may be forced to FAILED
    /// (precondition failures, monitor sweeps).
    pub fn run_transition_allowed(self, to: BuildStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == Self::Failed {
            return true;
        }
        match self {
            Self::Queued => matches!(to, Self::Running | Self::Cancelling),
            Self::Running => {
                matches!(to, Self::Running | Self::Uploading | Self::Cancelling | Self::Passed)
            }
            Self::Uploading => matches!(to, Self::Passed | Self::Cancelling),
            Self::Cancelling => matches!(to, Self::Passed),
            _ => false,
        }
    }
}

/// Aggregate a build's status from its runs' statuses.
///
/// Any run executing keeps the build RUNNING; all runs terminal resolves the
/// build to FAILED (any failure or cancellation) or PASSED; otherwise the
/// build is still QUEUED. A build with no runs yet is QUEUED.
pub fn aggregate_status<I: IntoIterator<Item = BuildStatus>>(runs: I) -> BuildStatus {
    let mut saw_any = false;
    let mut all_terminal = true;
    let mut any_failed = false;
    for s in runs {
        saw_any = true;
        if matches!(s, BuildStatus::Running | BuildStatus::Uploading | BuildStatus::Cancelling) {
            return BuildStatus::Running;
        }
        if !s.is_terminal() {
            all_terminal = false;
        }
        if matches!(s, BuildStatus::Failed | BuildStatus::Cancelled) {
            any_failed = true;
        }
    }
    if !saw_any || !all_terminal {
        return BuildStatus::Queued;
    }
    if any_failed {
        BuildStatus::Failed
    } else {
        BuildStatus::Passed
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
