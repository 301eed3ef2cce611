// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run views, the worker-driven update endpoint, and artifact serving.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use foreman_wire::{Envelope, RunDetail, RunSummary};
use foreman_storage::BlobStore;
use serde_json::json;

use super::{ok, public_base, AppState};
use crate::auth::{worker_credential, WorkerCredential};
use crate::error::ApiError;

pub async fn list(
    State(state): State<AppState>,
    Path((proj, build)): Path<(String, u32)>,
    headers: HeaderMap,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    state.engine.store.get_build(&proj, build)?;
    let base = public_base(&headers);
    let runs: Vec<RunSummary> = state
        .engine
        .store
        .runs_for_build(&proj, build)
        .iter()
        .map(|r| {
            RunSummary::from_run(
                r,
                Some(format!("{base}/projects/{proj}/builds/{build}/runs/{}/", r.name)),
            )
        })
        .collect();
    Ok(ok(json!({ "runs": runs })))
}

pub async fn get(
    State(state): State<AppState>,
    Path((proj, build, run)): Path<(String, u32, String)>,
    headers: HeaderMap,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let run = state.engine.store.get_run(&proj, build, &run)?;
    let base = public_base(&headers);
    let url = format!("{base}/projects/{proj}/builds/{build}/runs/{}/", run.name);
    Ok(ok(json!({ "run": RunDetail::from_run(&run, Some(url)) })))
}

/// Worker update: `Authorization: Token <run api key>`, optional
/// `X-RUN-STATUS` transition, raw body streamed to the console log.
pub async fn update(
    State(state): State<AppState>,
    Path((proj, build, run_name)): Path<(String, u32, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let WorkerCredential::Token(token) = worker_credential(&headers)? else {
        return Err(ApiError::AuthInvalid("runs authenticate with Token keys".to_string()));
    };
    let run = state.engine.authenticate_run(&proj, build, &run_name, &token)?;
    let status = headers.get("X-RUN-STATUS").and_then(|v| v.to_str().ok());
    state.engine.update_run(&run, status, &body)?;
    Ok(ok(json!({})))
}

/// Serve a run artifact (console log included) from blob storage.
pub async fn artifact(
    State(state): State<AppState>,
    Path((proj, build, run, path)): Path<(String, u32, String, String)>,
) -> Result<Response, ApiError> {
    let run = state.engine.store.get_run(&proj, build, &run)?;
    if path == ".rundef.json" {
        // The rundef carries secrets; it is not an artifact.
        return Err(ApiError::NotFound(format!("Not found: {path}")));
    }
    let raw = state.engine.blobs.get(&format!("{}/{path}", run.storage_prefix()))?;
    let content_type = if path.ends_with(".log") || path.ends_with(".txt") {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], raw).into_response())
}
