// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker: an external executor that polls for runs.

use serde::{Deserialize, Serialize};

/// Parse a comma-separated host-tags string, trimming whitespace and
/// dropping empty entries.
pub fn parse_host_tags(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// A registered worker. `online` is derived from ping freshness by the
/// monitor; `allowed_tags` comes from the worker's bearer-token certificate
/// and caps what `host_tags` may advertise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub name: String,
    pub distro: String,
    pub mem_total: u64,
    pub cpu_total: u32,
    pub cpu_type: String,
    /// Never serialized to API responses; compared in constant time.
    pub api_key: String,
    pub concurrent_runs: u32,
    pub host_tags: Vec<String>,
    #[serde(default)]
    pub enlisted: bool,
    #[serde(default)]
    pub online: bool,
    /// Only eligible for dispatch while a matching tag is in surge.
    #[serde(default)]
    pub surges_only: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub allowed_tags: Vec<String>,
    /// Epoch ms of the last check-in; None until the first ping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ping_ms: Option<u64>,
}

impl Worker {
    /// Tags this worker may currently service: its advertised `host_tags`,
    /// narrowed to `allowed_tags` when the certificate supplies any.
    pub fn effective_host_tags(&self) -> Vec<&str> {
        self.host_tags
            .iter()
            .map(String::as_str)
            .filter(|t| self.allowed_tags.is_empty() || self.allowed_tags.iter().any(|a| a == t))
            .collect()
    }
}

crate::builder! {
    pub struct WorkerBuilder => Worker {
        into {
            name: String = "w1",
            distro: String = "ubuntu",
            cpu_type: String = "x86_64",
            api_key: String = "worker-secret",
        }
        set {
            mem_total: u64 = 8_000_000_000,
            cpu_total: u32 = 4,
            concurrent_runs: u32 = 2,
            host_tags: Vec<String> = vec!["amd64".to_string()],
            enlisted: bool = true,
            online: bool = true,
            surges_only: bool = false,
            deleted: bool = false,
            allowed_tags: Vec<String> = Vec::new(),
        }
        option {
            last_ping_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
