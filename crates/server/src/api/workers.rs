// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registration, check-in, and fleet bookkeeping endpoints.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use foreman_core::{parse_host_tags, Worker};
use foreman_storage::WorkerPatch;
use foreman_wire::{Envelope, WorkerDetail, WorkerSummary};
use serde::Deserialize;
use serde_json::json;

use super::{ok, public_base, AppState};
use crate::auth::{constant_time_eq, worker_credential, WorkerCredential};
use crate::error::ApiError;

/// Resolve the worker a request's credential proves. Token keys must match
/// the named row; bearer tokens may only name themselves, and auto-create
/// their row on first sight.
fn authenticate(state: &AppState, name: &str, headers: &HeaderMap) -> Result<Worker, ApiError> {
    match worker_credential(headers)? {
        WorkerCredential::Token(key) => {
            let worker = state.engine.store.get_worker(name)?;
            if worker.deleted {
                return Err(ApiError::NotFound(format!("worker not found: {name}")));
            }
            if !constant_time_eq(key.as_bytes(), worker.api_key.as_bytes()) {
                return Err(ApiError::AuthInvalid("Incorrect API key for host".to_string()));
            }
            Ok(worker)
        }
        WorkerCredential::Bearer(token) => {
            let jwt = state.engine.jwt_keys.worker_from_jwt(&token)?;
            if jwt.name != name {
                // A worker can only access itself.
                return Err(ApiError::NotFound("Not found".to_string()));
            }
            Ok(state.engine.store.ensure_jwt_worker(
                name,
                jwt.allowed_tags,
                state.engine.now_ms(),
            )?)
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let workers: Vec<WorkerSummary> =
        state.engine.store.list_workers().iter().map(WorkerSummary::from).collect();
    Ok(ok(json!({ "workers": workers })))
}

/// Worker check-in. Unauthenticated callers see the row; authenticated
/// enlisted workers are pinged and may be handed a run.
pub async fn checkin(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    match authenticate(&state, &name, &headers) {
        Ok(worker) => {
            let checkin =
                state.engine.worker_checkin(&worker, &query, &public_base(&headers))?;
            Ok(ok(json!({ "worker": checkin })))
        }
        Err(_) => {
            let worker = state.engine.store.get_worker(&name)?;
            Ok(ok(json!({ "worker": WorkerDetail::from(&worker) })))
        }
    }
}

#[derive(Deserialize)]
pub struct CreateWorker {
    pub api_key: Option<String>,
    pub distro: Option<String>,
    pub mem_total: Option<u64>,
    pub cpu_total: Option<u32>,
    pub cpu_type: Option<String>,
    pub concurrent_runs: Option<u32>,
    pub host_tags: Option<serde_json::Value>,
    #[serde(default)]
    pub surges_only: bool,
}

fn tags_from_value(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => parse_host_tags(s),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Workers self-register unenlisted; an operator flips `enlisted` later.
pub async fn create(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<CreateWorker>,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    let mut missing = Vec::new();
    let required: [(&str, bool); 7] = [
        ("api_key", body.api_key.is_some()),
        ("distro", body.distro.is_some()),
        ("mem_total", body.mem_total.is_some()),
        ("cpu_total", body.cpu_total.is_some()),
        ("cpu_type", body.cpu_type.is_some()),
        ("concurrent_runs", body.concurrent_runs.is_some()),
        ("host_tags", body.host_tags.is_some()),
    ];
    for (field, present) in required {
        if !present {
            missing.push(field);
        }
    }
    if !missing.is_empty() {
        return Err(ApiError::Validation(format!(
            "Missing required field(s): {}",
            missing.join(", ")
        )));
    }

    let worker = Worker {
        name,
        distro: body.distro.unwrap_or_default(),
        mem_total: body.mem_total.unwrap_or_default(),
        cpu_total: body.cpu_total.unwrap_or_default(),
        cpu_type: body.cpu_type.unwrap_or_default(),
        api_key: body.api_key.unwrap_or_default(),
        concurrent_runs: body.concurrent_runs.unwrap_or_default(),
        host_tags: body.host_tags.as_ref().map(tags_from_value).unwrap_or_default(),
        enlisted: false,
        online: false,
        surges_only: body.surges_only,
        deleted: false,
        allowed_tags: Vec::new(),
        last_ping_ms: None,
    };
    state.engine.store.create_worker(worker)?;
    Ok((StatusCode::CREATED, ok(json!({}))))
}

#[derive(Deserialize)]
pub struct UpdateWorker {
    pub distro: Option<String>,
    pub mem_total: Option<u64>,
    pub cpu_total: Option<u32>,
    pub cpu_type: Option<String>,
    pub concurrent_runs: Option<u32>,
    pub host_tags: Option<serde_json::Value>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateWorker>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let worker = authenticate(&state, &name, &headers)?;

    let host_tags = body.host_tags.as_ref().map(tags_from_value);
    if let Some(tags) = &host_tags {
        // A certificate-restricted worker may not advertise its way into
        // tags beyond its allowed set.
        if !worker.allowed_tags.is_empty() {
            let rejects: Vec<&str> = tags
                .iter()
                .map(String::as_str)
                .filter(|t| !worker.allowed_tags.iter().any(|a| a == t))
                .collect();
            if !rejects.is_empty() {
                return Err(ApiError::Forbidden(format!(
                    "Worker not allowed access to host_tags: {rejects:?}"
                )));
            }
        }
    }

    state.engine.store.update_worker(
        &name,
        WorkerPatch {
            distro: body.distro,
            mem_total: body.mem_total,
            cpu_total: body.cpu_total,
            cpu_type: body.cpu_type,
            concurrent_runs: body.concurrent_runs,
            host_tags,
            ..WorkerPatch::default()
        },
    )?;
    Ok(ok(json!({})))
}

pub async fn events(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Option<Json<serde_json::Value>>,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    let worker = authenticate(&state, &name, &headers)?;
    if !worker.enlisted {
        return Err(ApiError::Forbidden("worker is not enlisted".to_string()));
    }
    if let Some(Json(payload)) = body {
        state.engine.record_worker_event(&name, &payload)?;
    }
    Ok((StatusCode::CREATED, ok(json!({}))))
}

#[derive(Deserialize)]
pub struct VolumesQuery {
    pub directories: Option<Vec<String>>,
}

pub async fn volumes_deleted(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Option<Json<VolumesQuery>>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let worker = authenticate(&state, &name, &headers)?;
    if !worker.enlisted {
        return Err(ApiError::Forbidden("worker is not enlisted".to_string()));
    }
    let directories = body
        .and_then(|Json(b)| b.directories)
        .ok_or_else(|| ApiError::Validation("Missing required argument 'directories'".to_string()))?;
    let volumes = state.engine.deleted_volumes(&directories);
    Ok(ok(json!({ "volumes": volumes })))
}

/// Gzipped log upload; stored under the worker's logs directory until the
/// monitor's retention sweep.
pub async fn logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    authenticate(&state, &name, &headers)?;
    state.engine.store_worker_log(&name, &body)?;
    Ok(ok(json!({})))
}
