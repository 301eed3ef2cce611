// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! foremand: the Foreman coordinator daemon.

use std::sync::Arc;

use foreman_core::SystemClock;
use foreman_server::api::{self, AppState};
use foreman_server::engine::forge::HttpForge;
use foreman_server::{Config, Engine};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let bind = config.bind;
    tracing::info!(?bind, state_dir = %config.state_dir.display(), "starting foremand");

    let engine = Arc::new(Engine::new(config, SystemClock)?);

    // The monitor shares only the store and filesystem with the HTTP tier.
    tokio::spawn(Arc::clone(&engine).run_monitor());

    let state = AppState { engine: Arc::clone(&engine), forge: Arc::new(HttpForge::new()) };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    // Snapshot on the way out so restart replays a short WAL.
    engine.store.compact()?;
    Ok(())
}
