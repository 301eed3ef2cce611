// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build listing, triggering, promotion, cancellation.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use foreman_core::{Build, BuildStatus, TriggerType};
use foreman_storage::BlobStore;
use foreman_wire::{BuildPage, BuildSummary, Envelope, RunSummary, TestDetail};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;

use super::{assert_signed, ok, public_base, AppState};
use crate::engine::trigger::TriggerOptions;
use crate::error::ApiError;

fn build_api_url(base: &str, build: &Build) -> String {
    format!("{base}/projects/{}/builds/{}/", build.project, build.build_id)
}

fn build_summary(state: &AppState, base: &str, build: &Build) -> BuildSummary {
    let url = Some(build_api_url(base, build));
    let mut dto = BuildSummary::from_build(build, url);
    if dto.url.is_none() {
        dto.url = state.engine.config.build_web_url(&build.project, build.build_id);
    }
    dto
}

fn build_detail(state: &AppState, base: &str, build: &Build) -> serde_json::Value {
    let runs: Vec<RunSummary> = state
        .engine
        .store
        .runs_for_build(&build.project, build.build_id)
        .iter()
        .map(|r| {
            RunSummary::from_run(
                r,
                Some(format!(
                    "{base}/projects/{}/builds/{}/runs/{}/",
                    r.project, r.build_id, r.name
                )),
            )
        })
        .collect();
    let mut detail = serde_json::to_value(build_summary(state, base, build)).unwrap_or_default();
    detail["runs"] = json!(runs);
    detail
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(proj): Path<String>,
    Query(page): Query<PageQuery>,
    headers: HeaderMap,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    state.engine.store.get_project(&proj)?;
    let base = public_base(&headers);
    let all = state.engine.store.list_builds(&proj);
    let limit = page.limit.unwrap_or(25).max(1);
    let total = all.len();
    let builds: Vec<BuildSummary> = all
        .iter()
        .skip(page.page * limit)
        .take(limit)
        .map(|b| build_summary(&state, &base, b))
        .collect();
    let next = ((page.page + 1) * limit < total).then(|| {
        format!("{base}/projects/{proj}/builds/?page={}&limit={limit}", page.page + 1)
    });
    let page = BuildPage { builds, total, next };
    Ok(ok(json!({ "builds": page.builds, "total": page.total, "next": page.next })))
}

#[derive(Deserialize)]
pub struct BuildCreate {
    #[serde(rename = "trigger-name")]
    pub trigger_name: String,
    #[serde(default)]
    pub params: IndexMap<String, String>,
    #[serde(default)]
    pub secrets: IndexMap<String, String>,
    #[serde(rename = "project-definition")]
    pub project_definition: serde_json::Value,
    /// Inherit secrets from the project's stored trigger of this type. A
    /// `-optional` suffix tolerates the trigger's absence.
    #[serde(rename = "trigger-type", default)]
    pub trigger_type: Option<String>,
    /// Inherit secrets from one specific stored trigger.
    #[serde(rename = "trigger-id", default)]
    pub trigger_id: Option<u32>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(rename = "queue-priority", default)]
    pub queue_priority: i32,
}

/// Fold inherited trigger secrets under the caller's, enforcing the
/// reserved `triggered-by` key.
fn resolve_secrets(
    state: &AppState,
    proj: &str,
    body: &BuildCreate,
) -> Result<IndexMap<String, String>, ApiError> {
    let mut secrets = IndexMap::new();
    let stored = state.engine.store.triggers_for(proj);

    if let Some(raw) = &body.trigger_type {
        let (wanted, optional) = match raw.strip_suffix("-optional") {
            Some(t) => (t, true),
            None => (raw.as_str(), false),
        };
        let trigger_type: TriggerType = wanted
            .parse()
            .map_err(|_| ApiError::Validation(format!("No such trigger-type: {raw}")))?;
        match stored.iter().find(|t| t.trigger_type == trigger_type) {
            Some(t) => {
                let decrypted = state
                    .engine
                    .secrets
                    .decrypt(&t.secrets_enc)
                    .map_err(|e| ApiError::Validation(e.to_string()))?;
                secrets.extend(decrypted);
            }
            None if optional => {}
            None => return Err(ApiError::Validation(format!("No such trigger-type: {wanted}"))),
        }
    }

    if let Some(id) = body.trigger_id {
        let trigger = stored
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ApiError::Validation(format!("Unknown trigger-id: {id}")))?;
        let decrypted = state
            .engine
            .secrets
            .decrypt(&trigger.secrets_enc)
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        secrets.extend(decrypted);
    }

    secrets.extend(body.secrets.clone());
    // Never allow the caller to impersonate the trigger audit field.
    secrets.shift_remove("triggered-by");
    Ok(secrets)
}

pub async fn create(
    State(state): State<AppState>,
    Path(proj): Path<String>,
    headers: HeaderMap,
    Json(body): Json<BuildCreate>,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    assert_signed(&state.engine, &headers, "POST", &format!("/projects/{proj}/builds/"))?;
    let secrets = resolve_secrets(&state, &proj, &body)?;
    let projdef = foreman_projdef::ProjectDefinition::from_value(body.project_definition.clone())?;
    let build = state.engine.trigger_build(
        &proj,
        projdef,
        TriggerOptions {
            trigger_name: body.trigger_name.clone(),
            reason: body.reason.clone(),
            params: body.params.clone(),
            secrets,
            queue_priority: body.queue_priority,
        },
    )?;
    let base = public_base(&headers);
    Ok((
        StatusCode::CREATED,
        ok(json!({
            "url": build_api_url(&base, &build),
            "build_id": build.build_id,
            "web_url": state.engine.config.build_web_url(&proj, build.build_id),
        })),
    ))
}

pub async fn get(
    State(state): State<AppState>,
    Path((proj, build)): Path<(String, u32)>,
    headers: HeaderMap,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let build = state.engine.store.get_build(&proj, build)?;
    let base = public_base(&headers);
    Ok(ok(json!({ "build": build_detail(&state, &base, &build) })))
}

#[derive(Deserialize)]
pub struct Annotate {
    #[serde(default)]
    pub annotation: Option<String>,
}

pub async fn annotate(
    State(state): State<AppState>,
    Path((proj, build)): Path<(String, u32)>,
    headers: HeaderMap,
    Json(body): Json<Annotate>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    assert_signed(&state.engine, &headers, "PATCH", &format!("/projects/{proj}/builds/{build}/"))?;
    let Some(annotation) = body.annotation else {
        return Err(ApiError::Validation("No changes found in payload".to_string()));
    };
    state.engine.store.annotate_build(&proj, build, &annotation)?;
    Ok(ok(json!({})))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path((proj, build)): Path<(String, u32)>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    assert_signed(
        &state.engine,
        &headers,
        "POST",
        &format!("/projects/{proj}/builds/{build}/cancel"),
    )?;
    state.engine.cancel_build(&proj, build)?;
    Ok((StatusCode::ACCEPTED, ok(json!({}))))
}

#[derive(Deserialize)]
pub struct Promote {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub annotation: Option<String>,
}

pub async fn promote(
    State(state): State<AppState>,
    Path((proj, build)): Path<(String, u32)>,
    headers: HeaderMap,
    body: Option<Json<Promote>>,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    assert_signed(
        &state.engine,
        &headers,
        "POST",
        &format!("/projects/{proj}/builds/{build}/promote"),
    )?;
    let Some(Json(body)) = body else {
        return Err(ApiError::Validation("Input data must be JSON".to_string()));
    };
    state.engine.store.promote_build(&proj, build, body.name, body.annotation)?;
    Ok((StatusCode::CREATED, ok(json!({}))))
}

#[derive(Deserialize)]
pub struct LatestQuery {
    #[serde(default)]
    pub trigger_name: Option<String>,
    #[serde(default)]
    pub promoted: Option<String>,
    #[serde(default)]
    pub all: Option<String>,
}

pub async fn latest(
    State(state): State<AppState>,
    Path(proj): Path<String>,
    Query(q): Query<LatestQuery>,
    headers: HeaderMap,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let status = if q.all.is_some() {
        None
    } else if q.promoted.is_some() {
        Some(BuildStatus::Promoted)
    } else {
        Some(BuildStatus::Passed)
    };
    let build = state
        .engine
        .store
        .latest_build(&proj, q.trigger_name.as_deref(), status)
        .ok_or_else(|| ApiError::NotFound(format!("no matching build for {proj}")))?;
    let base = public_base(&headers);
    Ok(ok(json!({ "build": build_detail(&state, &base, &build) })))
}

pub async fn definition(
    State(state): State<AppState>,
    Path((proj, build)): Path<(String, u32)>,
) -> Result<Response, ApiError> {
    state.engine.store.get_build(&proj, build)?;
    let raw = state.engine.blobs.get(&format!("{proj}/{build}/project.yml"))?;
    Ok(([(header::CONTENT_TYPE, "text/yaml")], raw).into_response())
}

#[derive(Deserialize)]
pub struct ExternalBuild {
    #[serde(rename = "trigger-name", default)]
    pub trigger_name: Option<String>,
    #[serde(default)]
    pub runs: Vec<ExternalRun>,
}

#[derive(Deserialize)]
pub struct ExternalRun {
    pub name: String,
    #[serde(rename = "artifact-links", default)]
    pub artifact_links: Option<serde_json::Value>,
}

/// Record a build that was executed outside the fleet; every run starts
/// PASSED.
pub async fn external(
    State(state): State<AppState>,
    Path(proj): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ExternalBuild>,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    assert_signed(&state.engine, &headers, "POST", &format!("/projects/{proj}/external-builds/"))?;
    let build = state.engine.store.create_build(
        &proj,
        body.trigger_name.clone(),
        None,
        state.engine.now_ms(),
    )?;
    for run in &body.runs {
        state.engine.store.create_external_run(
            &proj,
            build.build_id,
            &run.name,
            body.trigger_name.as_deref().unwrap_or("external"),
            state.engine.now_ms(),
        )?;
        if run.artifact_links.is_some() {
            tracing::warn!(run = %run.name, "storage backend does not support links");
        }
    }
    Ok((StatusCode::CREATED, ok(json!({ "build_id": build.build_id }))))
}

fn promoted_json(state: &AppState, base: &str, build: &Build) -> Result<serde_json::Value, ApiError> {
    let mut detail = build_detail(state, base, build);
    let mut tests: Vec<TestDetail> = Vec::new();
    let mut artifacts: Vec<String> = Vec::new();
    for run in state.engine.store.runs_for_build(&build.project, build.build_id) {
        for test in &run.tests {
            let mut dto = TestDetail::from(test);
            dto.name = format!("{}-{}", run.name, dto.name);
            tests.push(dto);
        }
        for artifact in state.engine.blobs.list(&run.storage_prefix())? {
            artifacts.push(format!("{}/{}", run.name, artifact.name));
        }
    }
    detail["tests"] = json!(tests);
    detail["artifacts"] = json!(artifacts);
    Ok(detail)
}

pub async fn promoted_list(
    State(state): State<AppState>,
    Path(proj): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    state.engine.store.get_project(&proj)?;
    let base = public_base(&headers);
    let builds: Vec<serde_json::Value> = state
        .engine
        .store
        .list_builds(&proj)
        .iter()
        .filter(|b| b.status == BuildStatus::Promoted)
        .map(|b| promoted_json(&state, &base, b))
        .collect::<Result<_, _>>()?;
    Ok(ok(json!({ "builds": builds })))
}

pub async fn promoted_get(
    State(state): State<AppState>,
    Path((proj, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let build = state
        .engine
        .store
        .list_builds(&proj)
        .into_iter()
        .find(|b| b.status == BuildStatus::Promoted && b.name.as_deref() == Some(&name))
        .ok_or_else(|| ApiError::NotFound(format!("promoted build not found: {name}")))?;
    let base = public_base(&headers);
    Ok(ok(json!({ "build": promoted_json(&state, &base, &build)? })))
}
