// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distributables workers download: the runner bundle, the worker script,
//! and the simulator.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

fn serve_file(path: Option<&std::path::Path>, content_type: &'static str) -> Result<Response, ApiError> {
    let path = path.ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;
    let raw = std::fs::read(path)
        .map_err(|_| ApiError::NotFound(format!("Not found: {}", path.display())))?;
    Ok(([(header::CONTENT_TYPE, content_type)], raw).into_response())
}

pub async fn runner(State(state): State<AppState>) -> Result<Response, ApiError> {
    serve_file(state.engine.config.runner_path.as_deref(), "application/zip")
}

pub async fn worker(State(state): State<AppState>) -> Result<Response, ApiError> {
    serve_file(state.engine.config.worker_script_path.as_deref(), "text/plain")
}

#[derive(Deserialize)]
pub struct SimulatorQuery {
    #[serde(default)]
    pub version: Option<String>,
}

/// 304 when the caller already runs the current simulator.
pub async fn simulator(
    State(state): State<AppState>,
    Query(q): Query<SimulatorQuery>,
) -> Result<Response, ApiError> {
    if q.version.is_some() && q.version == state.engine.simulator_version {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }
    serve_file(state.engine.config.simulator_path.as_deref(), "text/plain")
}
