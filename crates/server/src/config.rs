// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized configuration: one immutable struct built from the
//! environment at startup and injected everywhere by reference.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine as _;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP tier.
    pub bind: SocketAddr,
    /// Directory holding the entity store's WAL and snapshot.
    pub state_dir: PathBuf,
    /// Root of the local blob store.
    pub artifacts_dir: PathBuf,
    /// Per-worker files: pings log, uploaded logs, surge markers.
    pub worker_dir: PathBuf,
    /// PEM certificates trusted for worker bearer tokens.
    pub worker_jwts_dir: PathBuf,
    /// HMAC secret for privileged internal calls.
    pub internal_api_key: Vec<u8>,
    /// 32-byte key (base64 in the environment) encrypting trigger secrets.
    pub secrets_key: Option<[u8; 32]>,
    /// Queue-to-supply ratio beyond which a host-tag enters surge support.
    pub surge_support_ratio: usize,
    /// Workers reporting less free disk than this get no work.
    pub worker_disk_free_threshold_bytes: u64,
    /// Uploaded worker logs older than this are garbage collected.
    pub worker_logs_threshold: Duration,
    /// Rotate (keep an archive) rather than truncate oversized pings logs.
    pub worker_rotate_pings_log: bool,
    pub git_poller_interval: Duration,
    /// Extra validation applied to new project names.
    pub project_name_regex: Option<Regex>,
    /// Frontend URL templates; `{project}`, `{build}`, `{run}` placeholders.
    pub build_url_fmt: Option<String>,
    pub run_url_fmt: Option<String>,
    /// Canonical server URL stamped into rundefs (no trailing slash).
    pub base_url: String,
    /// Distributables served to workers.
    pub runner_path: Option<PathBuf>,
    pub worker_script_path: Option<PathBuf>,
    pub simulator_path: Option<PathBuf>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name, raw)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut base_url = var_or("FOREMAN_URL", "http://foreman");
        while base_url.ends_with('/') {
            base_url.pop();
        }

        let secrets_key = match var("SECRETS_KEY") {
            None => None,
            Some(raw) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(&raw)
                    .map_err(|e| ConfigError::Invalid("SECRETS_KEY", e.to_string()))?;
                let key: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| ConfigError::Invalid("SECRETS_KEY", "must be 32 bytes".into()))?;
                Some(key)
            }
        };

        let project_name_regex = match var("PROJECT_NAME_REGEX") {
            None => None,
            Some(raw) => {
                Some(Regex::new(&raw).map_err(|e| ConfigError::Invalid("PROJECT_NAME_REGEX", e.to_string()))?)
            }
        };

        Ok(Self {
            bind: parse_var("FOREMAN_BIND", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            state_dir: var_or("FOREMAN_STATE_DIR", "/data/state").into(),
            artifacts_dir: var_or("LOCAL_ARTIFACTS_DIR", "/data/artifacts").into(),
            worker_dir: var_or("WORKER_DIR", "/data/workers").into(),
            worker_jwts_dir: var_or("WORKER_JWTS_DIR", "/data/worker-jwts").into(),
            internal_api_key: var("INTERNAL_API_KEY").unwrap_or_default().into_bytes(),
            secrets_key,
            surge_support_ratio: parse_var("SURGE_SUPPORT_RATIO", 3usize)?,
            worker_disk_free_threshold_bytes: parse_var(
                "WORKER_DISK_FREE_THRESHOLD_BYTES",
                30_000_000_000u64,
            )?,
            worker_logs_threshold: Duration::from_secs(
                parse_var("WORKER_LOGS_THRESHOLD_DAYS", 4u64)? * 24 * 3600,
            ),
            worker_rotate_pings_log: var_or("ROTATE_PINGS_LOG", "0") != "0",
            git_poller_interval: Duration::from_secs(parse_var("GIT_POLLER_INTERVAL", 90u64)?),
            project_name_regex,
            build_url_fmt: var("BUILD_URL_FMT"),
            run_url_fmt: var("RUN_URL_FMT"),
            base_url,
            runner_path: var("RUNNER").map(Into::into),
            worker_script_path: var("WORKER_SCRIPT").map(Into::into),
            simulator_path: var("SIMULATOR_SCRIPT").map(Into::into),
        })
    }

    /// Test-friendly configuration rooted at a scratch directory.
    pub fn for_dirs(root: &std::path::Path) -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            state_dir: root.join("state"),
            artifacts_dir: root.join("artifacts"),
            worker_dir: root.join("workers"),
            worker_jwts_dir: root.join("worker-jwts"),
            internal_api_key: b"internal-test-key".to_vec(),
            secrets_key: Some([7u8; 32]),
            surge_support_ratio: 3,
            worker_disk_free_threshold_bytes: 30_000_000_000,
            worker_logs_threshold: Duration::from_secs(4 * 24 * 3600),
            worker_rotate_pings_log: false,
            git_poller_interval: Duration::from_secs(90),
            project_name_regex: None,
            build_url_fmt: None,
            run_url_fmt: None,
            base_url: "http://foreman".to_string(),
            runner_path: None,
            worker_script_path: None,
            simulator_path: None,
        }
    }

    /// Canonical URL of a run's update endpoint.
    pub fn run_api_url(&self, project: &str, build_id: u32, run: &str) -> String {
        format!("{}/projects/{project}/builds/{build_id}/runs/{run}/", self.base_url)
    }

    /// Canonical URL for triggering builds of a project.
    pub fn trigger_api_url(&self, project: &str) -> String {
        format!("{}/projects/{project}/builds/", self.base_url)
    }

    /// Frontend URL for a build, when a template is configured.
    pub fn build_web_url(&self, project: &str, build_id: u32) -> Option<String> {
        self.build_url_fmt.as_ref().map(|fmt| {
            fmt.replace("{project}", project).replace("{build}", &build_id.to_string())
        })
    }

    /// Frontend URL for a run, when a template is configured.
    pub fn run_web_url(&self, project: &str, build_id: u32, run: &str) -> Option<String> {
        self.run_url_fmt.as_ref().map(|fmt| {
            fmt.replace("{project}", project)
                .replace("{build}", &build_id.to_string())
                .replace("{run}", run)
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
