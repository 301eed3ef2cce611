// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduling and run-lifecycle core.
//!
//! [`Engine`] owns the entity store, the blob store, and the configuration.
//! Its impl is split by concern: trigger pipeline ([`trigger`]), worker
//! dispatch ([`dispatch`]), run state machine ([`lifecycle`]), and the
//! background monitor ([`monitor`]). HTTP handlers call into it; the monitor
//! runs beside them sharing only this state.

pub mod dispatch;
pub mod forge;
pub mod lifecycle;
pub mod monitor;
pub mod trigger;

use std::collections::HashMap;
use std::path::PathBuf;

use foreman_core::Clock;
use foreman_storage::{BlobStore, LocalBlobStore, Store};
use parking_lot::Mutex;

use crate::auth::jwt::KeyDir;
use crate::config::Config;
use crate::error::ApiError;
use crate::secrets::SecretBox;

pub struct Engine<C: Clock> {
    pub store: Store,
    pub blobs: Box<dyn BlobStore>,
    pub config: Config,
    pub clock: C,
    pub secrets: SecretBox,
    pub jwt_keys: KeyDir,
    /// Content hash of the distributable worker script, served to workers
    /// so they can self-update.
    pub worker_script_version: Option<String>,
    pub simulator_version: Option<String>,
    /// Surge hysteresis bookkeeping: tag → epoch ms the surge was entered.
    /// Seeded from marker-file mtimes at startup so a restart keeps the
    /// 5-minute exit damping.
    surge_entered: Mutex<HashMap<String, u64>>,
}

/// SHA-256 of a distributable file, used as its version tag.
fn file_version(path: Option<&std::path::Path>) -> Option<String> {
    use sha2::{Digest, Sha256};
    let raw = std::fs::read(path?).ok()?;
    let mut h = Sha256::new();
    h.update(&raw);
    Some(crate::auth::hex(&h.finalize()))
}

impl<C: Clock> Engine<C> {
    pub fn new(config: Config, clock: C) -> Result<Self, ApiError> {
        let store = Store::open(&config.state_dir)
            .map_err(|e| ApiError::unexpected("unable to open entity store", e.to_string()))?;
        let blobs = Box::new(LocalBlobStore::new(&config.artifacts_dir));
        std::fs::create_dir_all(&config.worker_dir)
            .map_err(|e| ApiError::unexpected("unable to create worker dir", e.to_string()))?;
        let secrets = SecretBox::new(config.secrets_key);
        let jwt_keys = KeyDir::load(&config.worker_jwts_dir);
        let worker_script_version = file_version(config.worker_script_path.as_deref());
        let simulator_version = file_version(config.simulator_path.as_deref());
        let engine = Self {
            store,
            blobs,
            config,
            clock,
            secrets,
            jwt_keys,
            worker_script_version,
            simulator_version,
            surge_entered: Mutex::new(HashMap::new()),
        };
        engine.seed_surge_entries();
        Ok(engine)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Directory for one worker's server-side files (pings log, uploaded
    /// logs).
    pub fn worker_files_dir(&self, name: &str) -> PathBuf {
        self.config.worker_dir.join(name)
    }

    fn seed_surge_entries(&self) {
        let mut entered = self.surge_entered.lock();
        for (tag, path) in self.surge_marker_files() {
            let ms = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or_else(|| self.now_ms());
            entered.insert(tag, ms);
        }
    }

    /// Tags currently under surge support, from the marker files.
    pub fn current_surge_tags(&self) -> std::collections::HashSet<String> {
        self.surge_marker_files().into_iter().map(|(tag, _)| tag).collect()
    }

    pub(crate) fn surge_marker_path(&self, tag: &str) -> PathBuf {
        self.config.worker_dir.join(format!("enable_surge-{tag}"))
    }

    pub(crate) fn surge_marker_files(&self) -> Vec<(String, PathBuf)> {
        let mut markers = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.config.worker_dir) else {
            return markers;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(tag) = name.strip_prefix("enable_surge-") {
                markers.push((tag.to_string(), entry.path()));
            }
        }
        markers
    }

    pub(crate) fn surge_entered_at(&self, tag: &str) -> Option<u64> {
        self.surge_entered.lock().get(tag).copied()
    }

    pub(crate) fn mark_surge_entered(&self, tag: &str, now_ms: u64) {
        self.surge_entered.lock().insert(tag.to_string(), now_ms);
    }

    pub(crate) fn clear_surge_entry(&self, tag: &str) {
        self.surge_entered.lock().remove(tag);
    }
}

#[cfg(test)]
pub(crate) mod test_helpers;
