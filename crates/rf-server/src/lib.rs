//! rf-server: HTTP API and process wiring.
//!
//! Ties the other rf-* crates into a running service:
//!
//! - axum API for export submission, status, cancellation, download and
//!   media upload
//! - background TTL pruner
//! - graceful shutdown via signal handling, which also terminates every
//!   in-flight encode

pub mod context;
pub mod error;
pub mod router;
pub mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use rf_av::{EncoderOptions, FfmpegEncoder, ToolRegistry};
use rf_core::config::Config;
use rf_jobs::{JobManager, ManagerConfig};
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Build the application context with the ffmpeg encoder.
///
/// A missing ffmpeg is not fatal: the service starts and renders fail with
/// an encoder error until it is installed.
pub async fn build_context(config: Config) -> AppContext {
    let tools = ToolRegistry::discover(&config.tools);
    for info in tools.check_all().await {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let options = EncoderOptions::from(&config.render);
    let encoder = match FfmpegEncoder::from_registry(&tools, options.clone()) {
        Ok(encoder) => encoder,
        Err(e) => {
            tracing::warn!("{e}; renders will fail until ffmpeg is available");
            FfmpegEncoder::new(PathBuf::from("ffmpeg"), options)
        }
    };

    let jobs = JobManager::new(ManagerConfig::from_config(&config), Arc::new(encoder));
    AppContext::new(config, jobs, tools)
}

fn ensure_dir(path: &std::path::Path) -> rf_core::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        tracing::info!("Created directory {}", path.display());
    }
    Ok(())
}

/// Start the renderforge server.
///
/// Returns after a shutdown signal once background tasks have stopped.
pub async fn start(config: Config) -> rf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    ensure_dir(&config.storage.media_dir)?;
    ensure_dir(&config.storage.output_dir)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| rf_core::Error::Internal(format!("Invalid server address: {e}")))?;
    let prune_interval = config.queue.prune_interval();

    let ctx = build_context(config).await;

    let cancel = CancellationToken::new();

    let pruner_handle = tokio::spawn(rf_jobs::run_pruner(
        ctx.jobs.clone(),
        prune_interval,
        cancel.clone(),
    ));

    let app = router::build_router(ctx.clone());

    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| rf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    // Stop background work and every in-flight encode.
    cancel.cancel();
    ctx.jobs.shutdown();
    let _ = pruner_handle.await;

    served?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
