// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stored project-trigger CRUD. All privileged; secrets are encrypted
//! before they touch the store and never serialized back out.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use foreman_core::TriggerType;
use foreman_wire::TriggerSummary;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;

use super::{assert_signed, ok, AppState};
use crate::error::ApiError;

pub async fn list(
    State(state): State<AppState>,
    Path(proj): Path<String>,
    headers: HeaderMap,
) -> Result<Json<foreman_wire::Envelope<serde_json::Value>>, ApiError> {
    assert_signed(&state.engine, &headers, "GET", &format!("/projects/{proj}/triggers/"))?;
    state.engine.store.get_project(&proj)?;
    let triggers: Vec<TriggerSummary> =
        state.engine.store.triggers_for(&proj).iter().map(TriggerSummary::from).collect();
    Ok(ok(json!({ "triggers": triggers })))
}

#[derive(Deserialize)]
pub struct CreateTrigger {
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default)]
    pub secrets: IndexMap<String, String>,
    #[serde(default)]
    pub definition_repo: Option<String>,
    #[serde(default)]
    pub definition_file: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Path(proj): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CreateTrigger>,
) -> Result<(StatusCode, Json<foreman_wire::Envelope<serde_json::Value>>), ApiError> {
    assert_signed(&state.engine, &headers, "POST", &format!("/projects/{proj}/triggers/"))?;
    let trigger_type: TriggerType = body
        .trigger_type
        .parse()
        .map_err(|_| ApiError::Validation(format!("invalid trigger type: {}", body.trigger_type)))?;
    let secrets_enc = state
        .engine
        .secrets
        .encrypt(&body.secrets)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let trigger = state.engine.store.create_trigger(
        &proj,
        trigger_type,
        secrets_enc,
        body.definition_repo,
        body.definition_file,
    )?;
    Ok((StatusCode::CREATED, ok(json!({ "id": trigger.id }))))
}

#[derive(Deserialize)]
pub struct UpdateTrigger {
    /// Merged into the stored secrets; an empty value deletes the key.
    #[serde(default)]
    pub secrets: Option<IndexMap<String, String>>,
    #[serde(default)]
    pub definition_repo: Option<String>,
    #[serde(default)]
    pub definition_file: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Path((proj, id)): Path<(String, u32)>,
    headers: HeaderMap,
    Json(body): Json<UpdateTrigger>,
) -> Result<Json<foreman_wire::Envelope<serde_json::Value>>, ApiError> {
    assert_signed(&state.engine, &headers, "PATCH", &format!("/projects/{proj}/triggers/{id}/"))?;
    let trigger = state.engine.store.get_trigger(id)?;
    if trigger.project != proj {
        return Err(ApiError::NotFound(format!("trigger not found: {id}")));
    }

    let secrets_enc = match body.secrets {
        None => None,
        Some(updates) => {
            let mut merged = state
                .engine
                .secrets
                .decrypt(&trigger.secrets_enc)
                .map_err(|e| ApiError::Validation(e.to_string()))?;
            for (k, v) in updates {
                if v.is_empty() {
                    merged.shift_remove(&k);
                } else {
                    merged.insert(k, v);
                }
            }
            Some(
                state
                    .engine
                    .secrets
                    .encrypt(&merged)
                    .map_err(|e| ApiError::Validation(e.to_string()))?,
            )
        }
    };

    state.engine.store.update_trigger(id, secrets_enc, body.definition_repo, body.definition_file)?;
    Ok(ok(json!({})))
}

pub async fn remove(
    State(state): State<AppState>,
    Path((proj, id)): Path<(String, u32)>,
    headers: HeaderMap,
) -> Result<Json<foreman_wire::Envelope<serde_json::Value>>, ApiError> {
    assert_signed(&state.engine, &headers, "DELETE", &format!("/projects/{proj}/triggers/{id}/"))?;
    let trigger = state.engine.store.get_trigger(id)?;
    if trigger.project != proj {
        return Err(ApiError::NotFound(format!("trigger not found: {id}")));
    }
    state.engine.store.delete_trigger(id)?;
    Ok(ok(json!({})))
}
