// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source-forge integration behind a narrow contract.
//!
//! Each trigger kind supplies a strategy: validate the webhook, resolve the
//! project definition, report status back. The HTTP side of that contract is
//! [`ForgeApi`]; tests swap in a fake.

use async_trait::async_trait;
use foreman_core::TriggerType;
use indexmap::IndexMap;
use serde_json::json;

use crate::error::ApiError;

#[async_trait]
pub trait ForgeApi: Send + Sync {
    async fn get_json(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<serde_json::Value, ApiError>;
    async fn get_text(&self, url: &str, headers: &[(String, String)]) -> Result<String, ApiError>;
    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: serde_json::Value,
    ) -> Result<(), ApiError>;
}

/// reqwest-backed implementation used in production.
pub struct HttpForge {
    client: reqwest::Client,
}

impl HttpForge {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    fn apply_headers(
        mut req: reqwest::RequestBuilder,
        headers: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        for (k, v) in headers {
            req = req.header(k, v);
        }
        req.header("User-Agent", "foreman")
    }
}

impl Default for HttpForge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ForgeApi for HttpForge {
    async fn get_json(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<serde_json::Value, ApiError> {
        let resp = Self::apply_headers(self.client.get(url), headers)
            .send()
            .await
            .map_err(|e| ApiError::unexpected("forge request failed", e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ApiError::unexpected(
                "forge request failed",
                format!("{url}: HTTP {}", resp.status()),
            ));
        }
        resp.json()
            .await
            .map_err(|e| ApiError::unexpected("forge response not json", e.to_string()))
    }

    async fn get_text(&self, url: &str, headers: &[(String, String)]) -> Result<String, ApiError> {
        let resp = Self::apply_headers(self.client.get(url), headers)
            .send()
            .await
            .map_err(|e| ApiError::unexpected("forge request failed", e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ApiError::NotFound(format!("{url}: HTTP {}", resp.status())));
        }
        resp.text()
            .await
            .map_err(|e| ApiError::unexpected("forge response unreadable", e.to_string()))
    }

    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: serde_json::Value,
    ) -> Result<(), ApiError> {
        Self::apply_headers(self.client.post(url), headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::unexpected("forge post failed", e.to_string()))?;
        Ok(())
    }
}

fn token_headers(token: &str) -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Authorization".to_string(), format!("token {token}")),
    ]
}

/// Fetch the parameters a GitHub PR build runs with.
pub async fn github_pr_params(
    forge: &dyn ForgeApi,
    owner: &str,
    repo: &str,
    pr_num: u64,
    token: &str,
) -> Result<IndexMap<String, String>, ApiError> {
    let url = format!("https://api.github.com/repos/{owner}/{repo}/pulls/{pr_num}");
    let data = forge.get_json(&url, &token_headers(token)).await?;
    let s = |v: &serde_json::Value| v.as_str().unwrap_or_default().to_string();
    let mut params = IndexMap::new();
    params.insert("GH_PRNUM".to_string(), pr_num.to_string());
    params.insert("GH_OWNER".to_string(), owner.to_string());
    params.insert("GH_REPO".to_string(), repo.to_string());
    params.insert("GH_BRANCH".to_string(), s(&data["base"]["ref"]));
    params.insert("GH_STATUS_URL".to_string(), s(&data["statuses_url"]));
    params.insert("GH_TARGET_REPO".to_string(), s(&data["base"]["repo"]["clone_url"]));
    params.insert("GIT_URL".to_string(), s(&data["head"]["repo"]["clone_url"]));
    params.insert("GIT_SHA_BASE".to_string(), s(&data["base"]["sha"]));
    params.insert("GIT_OLD_SHA".to_string(), s(&data["base"]["sha"]));
    params.insert("GIT_SHA".to_string(), s(&data["head"]["sha"]));
    Ok(params)
}

/// Resolve the project definition for a PR: out-of-tree when the stored
/// trigger names a definition repo, in-tree `.foreman.yml` at the PR head
/// otherwise. Returns the definition trigger entry to fire along with the
/// parsed definition.
pub async fn resolve_github_definition(
    forge: &dyn ForgeApi,
    definition_repo: Option<&str>,
    definition_file: Option<&str>,
    project: &str,
    owner: &str,
    repo: &str,
    sha: &str,
    branch: &str,
    token: &str,
) -> Result<(String, foreman_projdef::ProjectDefinition), ApiError> {
    let url = match definition_repo {
        Some(def_repo) => {
            let name = definition_file
                .map(str::to_string)
                .unwrap_or_else(|| format!("{project}.yml"));
            let ghproj = def_repo
                .trim_start_matches("https://github.com/")
                .trim_end_matches(".git");
            format!("https://raw.githubusercontent.com/{ghproj}/master/{name}")
        }
        None => format!("https://raw.githubusercontent.com/{owner}/{repo}/{sha}/.foreman.yml"),
    };

    let raw = forge.get_text(&url, &token_headers(token)).await.map_err(|_| {
        ApiError::Validation(format!("Project definition does not exist: {url}"))
    })?;
    let def = foreman_projdef::ProjectDefinition::from_yaml(&raw)?;

    let entry = def
        .triggers
        .iter()
        .find(|t| {
            if t.trigger_type != TriggerType::GithubPr {
                return false;
            }
            let branches = t.params.get("GH_BRANCH").map(String::as_str).unwrap_or("");
            branches.is_empty() || branches.split(',').any(|b| b.trim() == branch)
        })
        .map(|t| t.name.clone())
        .ok_or_else(|| ApiError::Validation("No github_pr trigger types defined".to_string()))?;
    Ok((entry, def))
}

/// Tell GitHub a PR's checks are underway: one pending status per run.
pub async fn report_pr_pending(
    forge: &dyn ForgeApi,
    status_url: &str,
    token: &str,
    build_id: u32,
    runs: &[(String, Option<String>)],
) {
    for (name, url) in runs {
        let body = json!({
            "context": name,
            "description": format!("Build {build_id}"),
            "target_url": url,
            "state": "pending",
        });
        if let Err(err) = forge.post_json(status_url, &token_headers(token), body).await {
            tracing::error!(%err, run = %name, "unable to report pending status");
        }
    }
}

/// Tell GitHub the webhook could not produce a build.
pub async fn report_pr_failure(
    forge: &dyn ForgeApi,
    repo_full: &str,
    sha: &str,
    failure_url: Option<&str>,
    token: &str,
) {
    let url = format!("https://api.github.com/repos/{repo_full}/statuses/{sha}");
    let body = json!({
        "context": "Foreman",
        "description": "unexpected failure",
        "state": "failure",
        "target_url": failure_url,
    });
    if let Err(err) = forge.post_json(&url, &token_headers(token), body).await {
        tracing::error!(%err, repo = repo_full, "unable to report PR failure");
    }
}
