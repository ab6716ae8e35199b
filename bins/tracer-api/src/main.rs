mod coordinator;
mod diagnostics;
mod engine;
mod error;
mod handlers;
mod metrics;
mod response;
mod routes;

use anyhow::Context;
use axum::Router;
use coordinator::Coordinator;
use engine::RedisEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracer_common::config::Config;
use tracer_common::profiles::LanguageRegistry;
use tracer_common::types::OutputMode;
use tracing::{info, warn};

pub struct AppState {
    pub registry: LanguageRegistry,
    pub coordinator: Coordinator,
    pub mode: OutputMode,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.json_logs);

    info!("Tracer API booting...");

    let registry = if config.languages_config.exists() {
        LanguageRegistry::load(&config.languages_config)?
    } else {
        warn!(
            path = %config.languages_config.display(),
            "Language config not found, using built-in profiles"
        );
        LanguageRegistry::builtin()
    };

    info!(
        languages = ?registry.names(),
        mode = %config.output_mode,
        "Loaded language profiles"
    );

    let engine = RedisEngine::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis: {}", config.redis_url);

    let state = Arc::new(AppState {
        registry,
        coordinator: Coordinator::new(Arc::new(engine)),
        mode: config.output_mode,
    });

    // Build router
    let app = Router::new()
        .merge(routes::routes())
        .with_state(state);

    // Start server
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
