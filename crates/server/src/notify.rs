// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification emission. Delivery (email, metrics) is an external concern;
//! here each event gets a stable message id and a structured log line that
//! downstream shippers consume. Surge markers persist the id so the "ended"
//! notification can thread onto the "started" one.

use foreman_core::Run;
use uuid::Uuid;

/// Announce surge support for a tag. Returns the message id recorded in the
/// surge marker file.
pub fn surge_started(tag: &str) -> String {
    let msg_id = Uuid::new_v4().to_string();
    tracing::warn!(tag, msg_id, "surge support started");
    msg_id
}

pub fn surge_ended(tag: &str, msg_id: &str) {
    tracing::warn!(tag, msg_id, "surge support ended");
}

pub fn worker_offline(name: &str) {
    tracing::warn!(worker = name, "worker offline");
}

/// A run was forcibly terminated by the stuck-run sweep.
pub fn run_terminated(run: &Run, stuck_for_ms: u64) {
    tracing::warn!(
        project = %run.project,
        build = run.build_id,
        run = %run.name,
        worker = ?run.worker,
        stuck_for_ms,
        "run terminated by monitor"
    );
}
