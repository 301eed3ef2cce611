// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project CRUD. Creation and deletion are privileged.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use foreman_wire::ProjectSummary;
use serde::Deserialize;
use serde_json::json;

use super::{assert_signed, ok, AppState};
use crate::error::ApiError;

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<foreman_wire::Envelope<serde_json::Value>>, ApiError> {
    let projects: Vec<ProjectSummary> =
        state.engine.store.list_projects().iter().map(ProjectSummary::from).collect();
    Ok(ok(json!({ "projects": projects })))
}

#[derive(Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(rename = "synchronous-builds", default)]
    pub synchronous_builds: bool,
    #[serde(rename = "allowed-host-tags", default)]
    pub allowed_host_tags: Option<Vec<String>>,
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateProject>,
) -> Result<(StatusCode, Json<foreman_wire::Envelope<serde_json::Value>>), ApiError> {
    assert_signed(&state.engine, &headers, "POST", "/projects/")?;
    if body.name.is_empty() {
        return Err(ApiError::Validation("Missing required field(s): name".to_string()));
    }
    if let Some(re) = &state.engine.config.project_name_regex {
        if !re.is_match(&body.name) {
            return Err(ApiError::Validation(format!("Invalid project name: {}", body.name)));
        }
    }
    let project = state.engine.store.create_project(
        &body.name,
        body.synchronous_builds,
        body.allowed_host_tags,
        state.engine.now_ms(),
    )?;
    Ok((StatusCode::CREATED, ok(json!({ "project": ProjectSummary::from(&project) }))))
}

pub async fn get(
    State(state): State<AppState>,
    Path(proj): Path<String>,
) -> Result<Json<foreman_wire::Envelope<serde_json::Value>>, ApiError> {
    let project = state.engine.store.get_project(&proj)?;
    if project.deleted {
        return Err(ApiError::NotFound(format!("project not found: {proj}")));
    }
    Ok(ok(json!({ "project": ProjectSummary::from(&project) })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(proj): Path<String>,
    headers: HeaderMap,
) -> Result<Json<foreman_wire::Envelope<serde_json::Value>>, ApiError> {
    assert_signed(&state.engine, &headers, "DELETE", &format!("/projects/{proj}/"))?;
    state.engine.store.delete_project(&proj)?;
    Ok(ok(json!({})))
}
