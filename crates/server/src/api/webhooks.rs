// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source-forge webhooks. The reply goes out as soon as the build row
//! exists; run materialization happens on a detached task so a slow
//! definition fetch never stalls the forge's delivery timeout.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use foreman_core::{ProjectTrigger, TriggerType};
use foreman_wire::Envelope;
use indexmap::IndexMap;
use serde_json::json;

use super::{ok, public_base, AppState};
use crate::auth::{constant_time_eq, webhook_signature_ok};
use crate::engine::forge;
use crate::engine::trigger::TriggerOptions;
use crate::error::ApiError;

/// Find the stored trigger whose webhook key signed this body. Every
/// trigger of the right type gets a chance, so key rotation can stage two.
fn resolve_trigger(
    state: &AppState,
    proj: &str,
    trigger_type: TriggerType,
    validate: impl Fn(&IndexMap<String, String>) -> bool,
) -> Result<(ProjectTrigger, IndexMap<String, String>), ApiError> {
    for trigger in state.engine.store.triggers_for(proj) {
        if trigger.trigger_type != trigger_type {
            continue;
        }
        let Ok(secrets) = state.engine.secrets.decrypt(&trigger.secrets_enc) else {
            continue;
        };
        if validate(&secrets) {
            return Ok((trigger, secrets));
        }
    }
    Err(ApiError::AuthInvalid("Invalid X-Hub-Signature".to_string()))
}

pub async fn github(
    State(state): State<AppState>,
    Path(proj): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    state.engine.store.get_project(&proj)?;

    let event = headers.get("X-Github-Event").and_then(|v| v.to_str().ok()).unwrap_or("");
    if event == "ping" {
        return Ok((StatusCode::OK, ok(json!({"message": "pong"}))));
    }
    if event != "pull_request" {
        return Ok((StatusCode::OK, ok(json!({"message": "ignored"}))));
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("invalid webhook payload: {e}")))?;
    let action = payload["action"].as_str().unwrap_or("");
    if action != "opened" && action != "synchronize" {
        return Ok((StatusCode::OK, ok(json!({"message": "ignored"}))));
    }

    let signature = headers
        .get("X-Hub-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::AuthMissing("X-Hub-Signature not provided".to_string()))?;
    let (trigger, secrets) = resolve_trigger(&state, &proj, TriggerType::GithubPr, |secrets| {
        secrets
            .get("webhook-key")
            .is_some_and(|key| webhook_signature_ok(key, signature, &body))
    })?;

    let token = secrets
        .get("githubtok")
        .cloned()
        .ok_or_else(|| ApiError::Validation("trigger is missing a githubtok secret".to_string()))?;

    let full_name = payload["pull_request"]["base"]["repo"]["full_name"].as_str().unwrap_or("");
    let (owner, repo) = full_name
        .split_once('/')
        .ok_or_else(|| ApiError::Validation("payload is missing base repo".to_string()))?;
    let pr_num = payload["number"]
        .as_u64()
        .ok_or_else(|| ApiError::Validation("payload is missing PR number".to_string()))?;

    let params = forge::github_pr_params(state.forge.as_ref(), owner, repo, pr_num, &token).await?;
    let head_sha = params.get("GIT_SHA").cloned().unwrap_or_default();
    let branch = params.get("GH_BRANCH").cloned().unwrap_or_default();
    let status_url = params.get("GH_STATUS_URL").cloned().unwrap_or_default();

    let (trigger_name, projdef) = forge::resolve_github_definition(
        state.forge.as_ref(),
        trigger.definition_repo.as_deref(),
        trigger.definition_file.as_deref(),
        &proj,
        owner,
        repo,
        &head_sha,
        &branch,
        &token,
    )
    .await?;

    let reason = format!("GitHub PR({pr_num}): {action}");
    let (build, pending) = state.engine.clone().trigger_build_deferred(
        &proj,
        projdef,
        TriggerOptions {
            trigger_name,
            reason: Some(reason),
            params,
            secrets,
            queue_priority: 0,
        },
        Some(TriggerType::GithubPr),
    )?;

    let base = public_base(&headers);
    let url = format!("{base}/projects/{proj}/builds/{}/", build.build_id);

    // Materialize on a detached task; a mid-commit failure reports back to
    // the PR with the diagnostic artifact.
    let forge_api = state.forge.clone();
    let engine = state.engine.clone();
    let full_name = full_name.to_string();
    let build_id = build.build_id;
    let proj_name = proj.clone();
    tokio::spawn(async move {
        let result = tokio::task::spawn_blocking(move || pending.commit()).await;
        let failed = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(join_err) => Some(ApiError::unexpected("commit panicked", join_err.to_string())),
        };
        if let Some(err) = failed {
            tracing::error!(%err, project = %proj_name, build = build_id, "webhook commit failed");
            let location = match &err {
                ApiError::Unexpected { location, .. } => location.clone(),
                _ => None,
            };
            forge::report_pr_failure(
                forge_api.as_ref(),
                &full_name,
                &head_sha,
                location.as_deref(),
                &token,
            )
            .await;
            return;
        }
        let runs: Vec<(String, Option<String>)> = engine
            .store
            .runs_for_build(&proj_name, build_id)
            .iter()
            .map(|r| (r.name.clone(), engine.config.run_web_url(&proj_name, build_id, &r.name)))
            .collect();
        forge::report_pr_pending(forge_api.as_ref(), &status_url, &token, build_id, &runs).await;
    });

    Ok((StatusCode::CREATED, ok(json!({ "url": url }))))
}

pub async fn gitlab(
    State(state): State<AppState>,
    Path(proj): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    state.engine.store.get_project(&proj)?;

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("invalid webhook payload: {e}")))?;
    if payload["object_kind"].as_str() != Some("merge_request") {
        return Ok((StatusCode::OK, ok(json!({"message": "ignored"}))));
    }
    let attrs = &payload["object_attributes"];
    let action = attrs["action"].as_str().unwrap_or("");
    if action != "open" && action != "update" && action != "reopen" {
        return Ok((StatusCode::OK, ok(json!({"message": "ignored"}))));
    }

    // GitLab sends the shared secret verbatim rather than a body signature.
    let sent_token = headers
        .get("X-Gitlab-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::AuthMissing("X-Gitlab-Token not provided".to_string()))?;
    let (_, secrets) = resolve_trigger(&state, &proj, TriggerType::GitlabMr, |secrets| {
        secrets
            .get("webhook-key")
            .is_some_and(|key| constant_time_eq(key.as_bytes(), sent_token.as_bytes()))
    })
    .map_err(|_| ApiError::AuthInvalid("Invalid X-Gitlab-Token".to_string()))?;

    let mut params = IndexMap::new();
    let s = |v: &serde_json::Value| v.as_str().unwrap_or_default().to_string();
    params.insert("GL_MR".to_string(), attrs["iid"].as_u64().unwrap_or(0).to_string());
    params.insert("GL_TARGET_REPO".to_string(), s(&attrs["target"]["git_http_url"]));
    params.insert("GIT_URL".to_string(), s(&attrs["source"]["git_http_url"]));
    params.insert("GIT_SHA".to_string(), s(&attrs["last_commit"]["id"]));
    params.insert("GH_BRANCH".to_string(), s(&attrs["target_branch"]));

    // The merge request ships its definition in-tree; fetch it raw off the
    // source project.
    let def_url = format!(
        "{}/raw/{}/.foreman.yml",
        s(&attrs["source"]["git_http_url"]).trim_end_matches(".git"),
        s(&attrs["last_commit"]["id"]),
    );
    let raw = state
        .forge
        .get_text(&def_url, &[])
        .await
        .map_err(|_| ApiError::Validation(format!("Project definition does not exist: {def_url}")))?;
    let projdef = foreman_projdef::ProjectDefinition::from_yaml(&raw)?;
    let trigger_name = projdef
        .triggers
        .iter()
        .find(|t| t.trigger_type == TriggerType::GitlabMr)
        .map(|t| t.name.clone())
        .ok_or_else(|| ApiError::Validation("No gitlab_mr trigger types defined".to_string()))?;

    let (build, pending) = state.engine.clone().trigger_build_deferred(
        &proj,
        projdef,
        TriggerOptions {
            trigger_name,
            reason: Some(format!("GitLab MR: {action}")),
            params,
            secrets,
            queue_priority: 0,
        },
        Some(TriggerType::GitlabMr),
    )?;

    let base = public_base(&headers);
    let url = format!("{base}/projects/{proj}/builds/{}/", build.build_id);
    tokio::spawn(async move {
        if let Ok(Err(err)) = tokio::task::spawn_blocking(move || pending.commit()).await {
            tracing::error!(%err, "gitlab webhook commit failed");
        }
    });
    Ok((StatusCode::CREATED, ok(json!({ "url": url }))))
}
