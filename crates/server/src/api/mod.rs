// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP tier: routing, correlation ids, request hygiene. Handlers stay thin
//! and delegate to the engine.

mod builds;
mod projects;
mod runs;
mod statics;
mod tests_api;
mod triggers;
mod webhooks;
mod workers;

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use foreman_core::SystemClock;
use foreman_wire::Envelope;
use uuid::Uuid;

use crate::engine::forge::ForgeApi;
use crate::engine::Engine;
use crate::error::ApiError;

/// The engine type the HTTP tier serves.
pub type ServerEngine = Engine<SystemClock>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ServerEngine>,
    pub forge: Arc<dyn ForgeApi>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        // Projects
        .route("/projects/", get(projects::list).post(projects::create))
        .route("/projects/{proj}/", get(projects::get).delete(projects::remove))
        // Stored triggers
        .route(
            "/projects/{proj}/triggers/",
            get(triggers::list).post(triggers::create),
        )
        .route(
            "/projects/{proj}/triggers/{id}/",
            patch(triggers::update).delete(triggers::remove),
        )
        // Builds
        .route("/projects/{proj}/builds/", get(builds::list).post(builds::create))
        .route("/projects/{proj}/builds/latest/", get(builds::latest))
        .route(
            "/projects/{proj}/builds/{build}/",
            get(builds::get).patch(builds::annotate),
        )
        .route("/projects/{proj}/builds/{build}/cancel", post(builds::cancel))
        .route("/projects/{proj}/builds/{build}/promote", post(builds::promote))
        .route("/projects/{proj}/builds/{build}/project.yml", get(builds::definition))
        .route("/projects/{proj}/external-builds/", post(builds::external))
        .route("/projects/{proj}/promoted-builds/", get(builds::promoted_list))
        .route("/projects/{proj}/promoted-builds/{name}/", get(builds::promoted_get))
        // Runs
        .route("/projects/{proj}/builds/{build}/runs/", get(runs::list))
        .route(
            "/projects/{proj}/builds/{build}/runs/{run}/",
            get(runs::get).post(runs::update),
        )
        .route(
            "/projects/{proj}/builds/{build}/runs/{run}/tests/",
            get(tests_api::list),
        )
        .route(
            "/projects/{proj}/builds/{build}/runs/{run}/tests/{test}/",
            get(tests_api::get).post(tests_api::create).put(tests_api::update),
        )
        .route(
            "/projects/{proj}/builds/{build}/runs/{run}/{*path}",
            get(runs::artifact),
        )
        // Workers
        .route("/workers/", get(workers::list))
        .route(
            "/workers/{name}/",
            get(workers::checkin).post(workers::create).patch(workers::update),
        )
        .route("/workers/{name}/events/", post(workers::events))
        .route("/workers/{name}/volumes-deleted/", get(workers::volumes_deleted))
        .route("/workers/{name}/logs/", put(workers::logs))
        // Webhooks
        .route("/github/{proj}/", post(webhooks::github))
        .route("/gitlab/{proj}/", post(webhooks::gitlab))
        // Distributables
        .route("/runner", get(statics::runner))
        .route("/worker", get(statics::worker))
        .route("/simulator", get(statics::simulator))
        .layer(middleware::from_fn(request_hygiene))
        .layer(middleware::from_fn(correlation_id))
        .with_state(state)
}

async fn healthz() -> &'static str {
    ""
}

/// Stamp every response with an `x-correlation-id` and run the request in a
/// span keyed by it.
async fn correlation_id(request: Request, next: Next) -> Response {
    use tracing::Instrument;

    let corid = Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", %corid, path = %request.uri().path());
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&corid) {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}

/// Load balancers disagree about path normalization; reject traversal
/// before any handler sees it.
async fn request_hygiene(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let decoded = percent_decode(path);
    if decoded.contains("..") {
        let body: Envelope<()> = Envelope::error(format!("Invalid path specified: {path}"));
        return (axum::http::StatusCode::BAD_REQUEST, Json(body)).into_response();
    }
    next.run(request).await
}

fn percent_decode(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(path.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(v) = u8::from_str_radix(&path[i + 1..i + 3], 16) {
                out.push(v as char);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// `scheme://host` the client reached us on, for rewriting callback URLs
/// and verifying signatures.
pub(crate) fn public_base(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{proto}://{host}")
}

/// Verify the internal HMAC on a privileged call.
pub(crate) fn assert_signed(
    engine: &ServerEngine,
    headers: &HeaderMap,
    method: &str,
    path: &str,
) -> Result<(), ApiError> {
    let base_url = format!("{}{path}", public_base(headers));
    crate::auth::assert_internal(&engine.config.internal_api_key, headers, method, &base_url)
}

/// Success envelope around a JSON body.
pub(crate) fn ok(data: serde_json::Value) -> Json<Envelope<serde_json::Value>> {
    Json(Envelope::success(data))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
