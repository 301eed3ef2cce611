// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-tag matching: routes queued runs to workers.

use glob::{MatchOptions, Pattern};

/// Case-insensitive glob match of a run's host-tag pattern against one
/// concrete worker tag. `?` matches a single character, `*` any sequence.
///
/// A pattern that fails to parse as a glob falls back to a case-insensitive
/// literal comparison.
pub fn host_tag_matches(pattern: &str, tag: &str) -> bool {
    let opts = MatchOptions { case_sensitive: false, ..MatchOptions::new() };
    match Pattern::new(pattern) {
        Ok(p) => p.matches_with(tag, opts),
        Err(_) => pattern.eq_ignore_ascii_case(tag),
    }
}

/// Whether a run routes to a worker.
///
/// The run's host-tag may glob-match any of the worker's effective tags, or
/// name the worker exactly (runs can be pinned to one host).
pub fn run_matches_worker<'a, I>(run_host_tag: &str, worker_name: &str, worker_tags: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    if run_host_tag == worker_name {
        return true;
    }
    worker_tags.into_iter().any(|t| host_tag_matches(run_host_tag, t))
}

#[cfg(test)]
#[path = "tag_tests.rs"]
mod tests;
