// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background monitor: one cooperative loop sweeping the whole deployment.
//!
//! The loop ticks every ~10 seconds. The acknowledgement check runs every
//! tick; the heavier sweeps (worker liveness, surge accounting, stuck runs,
//! cancelled reaping, log GC) run on the two-minute cadence.

use std::sync::Arc;
use std::time::Duration;

use foreman_core::{run_matches_worker, BuildStatus, Clock};
use foreman_storage::BlobStore;
use foreman_wire::iso8601;

use super::Engine;
use crate::notify;

/// Loop period.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(10);
/// Slow sweeps run every this many ticks (~2 minutes).
const SLOW_SWEEP_TICKS: u64 = 12;

/// A dispatched run must be acknowledged within this window or it is
/// reclaimed; the worker's connection likely died before it got the
/// response.
const ACK_TIMEOUT_MS: u64 = 15_000;
/// Workers check in every ~20 s; four missed check-ins means offline.
const WORKER_OFFLINE_MS: u64 = 80_000;
/// Surge workers poll every ~90 s, so they get a longer leash.
const SURGE_WORKER_OFFLINE_MS: u64 = 120_000;
/// Safety net for runs whose executor never came back.
const STUCK_RUNNING_MS: u64 = 12 * 3600 * 1000;
const STUCK_CANCELLING_MS: u64 = 10 * 60 * 1000;
/// Surges may not exit within this window of entry, so threshold noise
/// does not flap notifications.
const SURGE_EXIT_HYSTERESIS_MS: u64 = 5 * 60 * 1000;
/// Roughly two days of ping entries.
const PINGS_LOG_MAX_BYTES: u64 = 1024 * 1024;

impl<C: Clock> Engine<C> {
    /// The long-running monitor task. Shares only the store and filesystem
    /// with the HTTP tier.
    pub async fn run_monitor(self: Arc<Self>) {
        tracing::info!("worker monitor has started");
        let mut tick: u64 = 0;
        loop {
            self.monitor_tick(tick);
            tick = tick.wrapping_add(1);
            tokio::time::sleep(MONITOR_INTERVAL).await;
        }
    }

    /// One iteration of the loop; split out so tests drive it directly.
    pub fn monitor_tick(&self, tick: u64) {
        self.sweep_acked();
        if tick % SLOW_SWEEP_TICKS == 0 {
            self.sweep_workers();
            self.sweep_queue();
            self.sweep_stuck();
            self.sweep_cancelled();
            self.sweep_worker_logs();
        }
    }

    /// Reclaim dispatched runs whose worker never acknowledged them.
    pub fn sweep_acked(&self) {
        let now = self.now_ms();
        for run in self.store.unacked_running(now.saturating_sub(ACK_TIMEOUT_MS)) {
            tracing::warn!(
                run = %run.name,
                build = run.build_id,
                worker = ?run.worker,
                "assignment never acknowledged, requeueing"
            );
            if let Err(err) = self.store.requeue_run(run.id, now) {
                tracing::error!(%err, run = %run.name, "unable to requeue run");
            }
        }
    }

    /// Mark workers offline when their pings go stale, and keep the pings
    /// log bounded.
    pub fn sweep_workers(&self) {
        let now = self.now_ms();
        for worker in self.store.list_workers() {
            if !worker.enlisted {
                continue;
            }
            let threshold =
                if worker.surges_only { SURGE_WORKER_OFFLINE_MS } else { WORKER_OFFLINE_MS };
            let stale = match worker.last_ping_ms {
                Some(last) => now.saturating_sub(last) > threshold,
                None => true,
            };
            if stale && worker.online {
                tracing::info!(
                    worker = %worker.name,
                    "marking offline, no check-in within threshold"
                );
                notify::worker_offline(&worker.name);
                if let Err(err) = self.store.set_worker_online(&worker.name, false) {
                    tracing::error!(%err, worker = %worker.name, "unable to mark offline");
                }
            }
            self.bound_pings_log(&worker.name, now);
        }
    }

    fn bound_pings_log(&self, worker: &str, now: u64) {
        let path = self.worker_files_dir(worker).join("pings.log");
        let Ok(meta) = std::fs::metadata(&path) else { return };
        if meta.len() <= PINGS_LOG_MAX_BYTES {
            return;
        }
        if self.config.worker_rotate_pings_log {
            let rotated = path.with_file_name(format!("pings.log.{}", now / 1000));
            tracing::info!(worker, rotated = %rotated.display(), "rotating pings log");
            if let Err(err) = std::fs::rename(&path, &rotated) {
                tracing::error!(%err, worker, "unable to rotate pings log");
            }
        } else {
            tracing::info!(worker, "truncating the pings log");
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::error!(%err, worker, "unable to truncate pings log");
            }
        }
    }

    /// Surge accounting: compare per-tag queue depth against servicing
    /// capacity, create/remove marker files, and emit the notifications
    /// whose ids the markers carry.
    pub fn sweep_queue(&self) {
        let now = self.now_ms();
        let queued = self.store.queued_by_tag();
        let workers: Vec<_> = self
            .store
            .list_workers()
            .into_iter()
            .filter(|w| w.enlisted && w.online && !w.surges_only)
            .collect();

        let over_supply = |tag: &str| -> bool {
            let Some(&depth) = queued.get(tag) else { return false };
            let supply: usize = workers
                .iter()
                .filter(|w| {
                    run_matches_worker(tag, &w.name, w.effective_host_tags())
                })
                .count()
                * self.config.surge_support_ratio;
            depth > supply
        };

        // Exit pass: markers for tags no longer over supply, kept inside a
        // surge for at least the hysteresis window.
        for (tag, path) in self.surge_marker_files() {
            if over_supply(&tag) {
                continue;
            }
            let entered = self.surge_entered_at(&tag).unwrap_or(now);
            if now.saturating_sub(entered) < SURGE_EXIT_HYSTERESIS_MS {
                continue;
            }
            tracing::info!(tag, "exiting surge support");
            let msg_id = std::fs::read_to_string(&path).unwrap_or_default();
            notify::surge_ended(&tag, msg_id.trim());
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::error!(%err, tag, "unable to remove surge marker");
            }
            self.clear_surge_entry(&tag);
        }

        // Entry pass.
        for tag in queued.keys() {
            if !over_supply(tag) {
                continue;
            }
            let path = self.surge_marker_path(tag);
            if path.exists() {
                continue;
            }
            tracing::info!(tag, depth = queued[tag], "entering surge support");
            let msg_id = notify::surge_started(tag);
            if let Err(err) = std::fs::write(&path, &msg_id) {
                tracing::error!(%err, tag, "unable to write surge marker");
                continue;
            }
            self.mark_surge_entered(tag, now);
        }
    }

    /// Force-fail runs that stopped making progress: RUNNING for over 12
    /// hours, or CANCELLING for over 10 minutes.
    pub fn sweep_stuck(&self) {
        let now = self.now_ms();
        for run in self.store.stale_runs(BuildStatus::Running, now.saturating_sub(STUCK_RUNNING_MS))
        {
            let age_ms = now.saturating_sub(run.last_event_ms().unwrap_or(now));
            tracing::error!(
                project = %run.project,
                build = run.build_id,
                run = %run.name,
                worker = ?run.worker,
                "found stuck run"
            );
            let bar = "=".repeat(72);
            let diag = format!(
                "\n{bar}\n{} ERROR: Run appears to be stuck after {} hours\n{bar}\n",
                iso8601(now),
                age_ms / 3_600_000
            );
            self.force_fail(&run, &diag);
            notify::run_terminated(&run, age_ms);
        }
        for run in
            self.store.stale_runs(BuildStatus::Cancelling, now.saturating_sub(STUCK_CANCELLING_MS))
        {
            tracing::error!(
                project = %run.project,
                build = run.build_id,
                run = %run.name,
                "failing stale cancelling run"
            );
            self.force_fail(&run, "\nCANCELLED\n");
        }
    }

    /// CANCELLING runs that never had a worker have nobody to report their
    /// end; fail them here.
    pub fn sweep_cancelled(&self) {
        for run in self.store.cancelled_unassigned() {
            tracing::info!(
                project = %run.project,
                build = run.build_id,
                run = %run.name,
                "failing cancelled run with no worker"
            );
            self.force_fail(&run, "\nCANCELLED\n");
        }
    }

    fn force_fail(&self, run: &foreman_core::Run, console: &str) {
        if let Err(err) = self
            .blobs
            .append(&format!("{}/console.log", run.storage_prefix()), console.as_bytes())
        {
            tracing::error!(%err, run = %run.name, "unable to append console diagnostic");
        }
        if let Err(err) = self.store.record_run_status(run.id, BuildStatus::Failed, self.now_ms())
        {
            tracing::error!(%err, run = %run.name, "unable to force-fail run");
        }
    }

    /// Delete uploaded worker logs older than the retention window.
    pub fn sweep_worker_logs(&self) {
        let now = self.now_ms();
        let retention_ms = self.config.worker_logs_threshold.as_millis() as u64;
        let Ok(workers) = std::fs::read_dir(&self.config.worker_dir) else { return };
        for worker in workers.flatten() {
            let logs = worker.path().join("logs");
            let Ok(files) = std::fs::read_dir(&logs) else { continue };
            for file in files.flatten() {
                let age_ms = std::fs::metadata(file.path())
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| now.saturating_sub(d.as_millis() as u64));
                if age_ms.is_some_and(|age| age > retention_ms) {
                    tracing::info!(file = %file.path().display(), "deleting expired worker log");
                    if let Err(err) = std::fs::remove_file(file.path()) {
                        tracing::error!(%err, "unable to delete worker log");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
