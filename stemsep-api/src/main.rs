//! stemsep-api - Stem separation service
//!
//! Accepts an uploaded audio file, runs the external separation engine on it
//! and returns URLs of the produced stems.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stemsep_api::config::{Args, ServiceConfig};
use stemsep_api::services::{OutputResolver, ProcessEngine, SeparationService, SessionManager};
use stemsep_api::{build_router, AppState};
use stemsep_common::FfmpegWriter;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml = stemsep_common::config::load_or_default(args.config.as_deref(), "stemsep-api")
        .context("Failed to load config file")?;
    let config = ServiceConfig::resolve(&args, &toml).context("Invalid configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "stemsep_api={0},stemsep_common={0},tower_http={0}",
                    config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting stemsep-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Upload root: {}", config.upload_root.display());
    info!("Output root: {}", config.output_root.display());

    let sessions = SessionManager::new(config.upload_root.clone(), config.output_root.clone());
    sessions
        .ensure_directories()
        .await
        .context("Failed to create data folders")?;

    // The engine writes its stems through this encoder
    let encoder = FfmpegWriter::with_binary(&config.encoder);
    match encoder.verify().await {
        Ok(()) => info!("Encoder: {}", encoder.binary().display()),
        Err(e) => warn!("Encoder unavailable, stem writing will fail: {}", e),
    }

    if let Some(script) = config.engine_script.as_ref().filter(|s| !s.exists()) {
        warn!(
            "Engine script {} not found; configure --engine-script or place it there",
            script.display()
        );
    }

    let engine = ProcessEngine::new(config.engine_interpreter.clone(), config.engine_script.clone())
        .with_env(config.engine_env.clone())
        .with_encoder(&config.encoder);
    info!(
        "Engine: {} {}",
        config.engine_interpreter.display(),
        config
            .engine_script
            .as_ref()
            .map(|s| s.display().to_string())
            .unwrap_or_default()
    );

    let mut service = SeparationService::new(
        sessions,
        Arc::new(engine),
        OutputResolver::new(config.output_extension.clone()),
    );
    if let Some(limit) = config.max_concurrent_jobs {
        info!("Admission control: at most {} concurrent jobs", limit);
        service = service.with_max_concurrent_jobs(limit);
    }
    if let Some(deadline) = config.job_timeout {
        info!("Job deadline: {}s", deadline.as_secs());
        service = service.with_deadline(deadline);
    }

    let state = AppState::new(service, config.default_model.clone())
        .with_max_upload_bytes(config.max_upload_bytes);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", config.bind_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
