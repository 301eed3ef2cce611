// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! foreman-wire: the HTTP envelope and JSON DTOs.
//!
//! Every response is wrapped in a JSend-style envelope:
//! `{"status": "success", "data": …}` or
//! `{"status": "error", "message": …, "error_msg": …}`.
//! DTOs are the externally visible projections of the entities; they never
//! carry api keys or trigger secrets.

mod envelope;
mod types;

pub use envelope::Envelope;
pub use types::{
    iso8601, BuildDetail, BuildPage, BuildSummary, ProjectSummary, RunDetail, RunSummary,
    StatusEventDetail, TestDetail, TestResultDetail, TriggerSummary, WorkerCheckin, WorkerDetail,
    WorkerSummary,
};
