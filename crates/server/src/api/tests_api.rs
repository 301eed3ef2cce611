// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test reporting under a run. Creation and updates authenticate with the
//! run's api key.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use foreman_core::Run;
use foreman_wire::{Envelope, TestDetail};
use serde::Deserialize;
use serde_json::json;

use super::{ok, AppState};
use crate::auth::{worker_credential, WorkerCredential};
use crate::engine::lifecycle::TestUpdate;
use crate::error::ApiError;

fn authed_run(
    state: &AppState,
    proj: &str,
    build: u32,
    run: &str,
    headers: &HeaderMap,
) -> Result<Run, ApiError> {
    let WorkerCredential::Token(token) = worker_credential(headers)? else {
        return Err(ApiError::AuthInvalid("tests authenticate with Token keys".to_string()));
    };
    state.engine.authenticate_run(proj, build, run, &token)
}

#[derive(Deserialize)]
pub struct ContextQuery {
    #[serde(default)]
    pub context: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Path((proj, build, run)): Path<(String, u32, String)>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let run = state.engine.store.get_run(&proj, build, &run)?;
    let tests: Vec<TestDetail> = run.tests.iter().map(TestDetail::from).collect();
    Ok(ok(json!({ "tests": tests })))
}

pub async fn get(
    State(state): State<AppState>,
    Path((proj, build, run, test)): Path<(String, u32, String, String)>,
    Query(q): Query<ContextQuery>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let run = state.engine.store.get_run(&proj, build, &run)?;
    let found = run
        .tests
        .iter()
        .find(|t| t.name == test && (q.context.is_none() || t.context == q.context))
        .ok_or_else(|| ApiError::NotFound(format!("test not found: {test}")))?;
    Ok(ok(json!({ "test": TestDetail::from(found) })))
}

#[derive(Deserialize, Default)]
pub struct CreateTest {
    #[serde(default)]
    pub context: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Path((proj, build, run, test)): Path<(String, u32, String, String)>,
    headers: HeaderMap,
    body: Option<Json<CreateTest>>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let run = authed_run(&state, &proj, build, &run, &headers)?;
    let context = body.and_then(|Json(b)| b.context);
    state.engine.create_test(&run, &test, context)?;
    Ok(ok(json!({})))
}

pub async fn update(
    State(state): State<AppState>,
    Path((proj, build, run, test)): Path<(String, u32, String, String)>,
    Query(q): Query<ContextQuery>,
    headers: HeaderMap,
    Json(body): Json<TestUpdate>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let run = authed_run(&state, &proj, build, &run, &headers)?;
    let complete = state.engine.update_test(&run, &test, q.context, body)?;
    Ok(ok(json!({ "complete": complete })))
}
