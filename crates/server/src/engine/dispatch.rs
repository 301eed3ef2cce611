// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker check-in: ping bookkeeping and the dispatch side effect.

use std::collections::HashMap;
use std::io::Read;

use foreman_core::{Clock, Worker};
use foreman_storage::BlobStore;
use foreman_wire::{WorkerCheckin, WorkerDetail};

use super::Engine;
use crate::error::ApiError;

/// Rewrite a rundef's callback URLs onto the host the worker reached us on,
/// so replies route back through the same load balancer.
pub(crate) fn fix_run_urls(raw: &[u8], public: &str) -> Result<String, ApiError> {
    fn url_path(url: &str) -> &str {
        url.find("://")
            .and_then(|i| url[i + 3..].find('/').map(|j| &url[i + 3 + j..]))
            .unwrap_or(url)
    }

    let mut rundef: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| ApiError::unexpected("corrupt rundef", e.to_string()))?;
    for key in ["run_url", "runner_url"] {
        if let Some(serde_json::Value::String(url)) = rundef.get(key) {
            let fixed = format!("{public}{}", url_path(url));
            rundef[key] = serde_json::Value::String(fixed);
        }
    }
    if let Some(serde_json::Value::String(url)) =
        rundef.get("env").and_then(|e| e.get("H_TRIGGER_URL"))
    {
        let fixed = format!("{public}{}", url_path(url));
        rundef["env"]["H_TRIGGER_URL"] = serde_json::Value::String(fixed);
    }
    serde_json::to_string(&rundef).map_err(|e| ApiError::unexpected("corrupt rundef", e.to_string()))
}

impl<C: Clock> Engine<C> {
    /// Handle an authenticated worker check-in GET.
    ///
    /// Records the ping. When the worker is enlisted, reports a free
    /// runner, and clears the disk threshold, it pops at most one queued run.
    /// A dispatch failure after the claim rolls the run back to QUEUED.
    pub fn worker_checkin(
        &self,
        worker: &Worker,
        query: &HashMap<String, String>,
        public_base: &str,
    ) -> Result<WorkerCheckin, ApiError> {
        let mut checkin = WorkerCheckin {
            worker: WorkerDetail::from(worker),
            version: self.worker_script_version.clone(),
            run_defs: Vec::new(),
        };
        if worker.deleted {
            return Ok(checkin);
        }

        if worker.enlisted {
            self.record_ping(worker, query)?;
        }

        let available_runners: u32 = query
            .get("available_runners")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if available_runners == 0 || !worker.enlisted {
            return Ok(checkin);
        }

        if let Some(disk_free) = query.get("disk_free").and_then(|v| v.parse::<u64>().ok()) {
            if disk_free < self.config.worker_disk_free_threshold_bytes {
                tracing::info!(
                    worker = %worker.name,
                    disk_free,
                    "worker is low on disk, not assigning work"
                );
                return Ok(checkin);
            }
        }

        let surge_tags = self.current_surge_tags();
        let Some(run) = self.store.pop_queued_for_worker(worker, &surge_tags, self.now_ms())?
        else {
            return Ok(checkin);
        };

        // Everything after the claim must either produce a servable rundef
        // or put the run back exactly as it was.
        let served = (|| -> Result<String, ApiError> {
            self.blobs.append(
                &format!("{}/console.log", run.storage_prefix()),
                format!("# Run sent to worker: {}\n", worker.name).as_bytes(),
            )?;
            let raw = self.blobs.get(&format!("{}/.rundef.json", run.storage_prefix()))?;
            fix_run_urls(&raw, public_base)
        })();

        match served {
            Ok(rundef) => {
                tracing::info!(worker = %worker.name, run = %run.name, "run dispatched");
                checkin.run_defs.push(rundef);
                Ok(checkin)
            }
            Err(err) => {
                tracing::error!(worker = %worker.name, run = %run.name, %err, "dispatch failed, rolling back");
                self.store.rollback_assignment(run.id)?;
                Err(err)
            }
        }
    }

    /// Append the ping to the worker's pings log and stamp the store row.
    fn record_ping(
        &self,
        worker: &Worker,
        query: &HashMap<String, String>,
    ) -> Result<(), ApiError> {
        self.store.ping_worker(&worker.name, self.now_ms())?;
        let dir = self.worker_files_dir(&worker.name);
        std::fs::create_dir_all(&dir)
            .map_err(|e| ApiError::unexpected("worker dir", e.to_string()))?;
        let mut args: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        args.sort();
        let line = format!("{}: {}\n", self.now_ms() / 1000, args.join(", "));
        use std::io::Write;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("pings.log"))
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .map_err(|e| ApiError::unexpected("pings log", e.to_string()))
    }

    /// Worker-reported events (enlisted workers only) land in a per-worker
    /// log file.
    pub fn record_worker_event(
        &self,
        name: &str,
        payload: &serde_json::Value,
    ) -> Result<(), ApiError> {
        let dir = self.worker_files_dir(name);
        std::fs::create_dir_all(&dir)
            .map_err(|e| ApiError::unexpected("worker dir", e.to_string()))?;
        use std::io::Write;
        let line = format!("{}: {payload}\n", self.now_ms() / 1000);
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("events.log"))
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .map_err(|e| ApiError::unexpected("events log", e.to_string()))
    }

    /// Store a gzipped log upload under the worker's logs directory; the
    /// monitor garbage-collects these after the retention window.
    pub fn store_worker_log(&self, name: &str, gzipped: &[u8]) -> Result<(), ApiError> {
        let mut decoder = flate2::read::GzDecoder::new(gzipped);
        let mut contents = String::new();
        decoder
            .read_to_string(&mut contents)
            .map_err(|e| ApiError::Validation(format!("body must be gzipped: {e}")))?;
        let dir = self.worker_files_dir(name).join("logs");
        std::fs::create_dir_all(&dir)
            .map_err(|e| ApiError::unexpected("worker logs dir", e.to_string()))?;
        let path = dir.join(format!("{}.log", self.now_ms()));
        std::fs::write(&path, contents)
            .map_err(|e| ApiError::unexpected("worker log write", e.to_string()))
    }

    /// Volume prefixes the worker may delete: those with no project left
    /// under them. Giving the worker answers only about prefixes it already
    /// holds keeps tenants from enumerating each other.
    pub fn deleted_volumes(&self, directories: &[String]) -> Vec<String> {
        let projects = self.store.list_projects();
        directories
            .iter()
            .filter(|d| !projects.iter().any(|p| p.name.starts_with(d.as_str())))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
