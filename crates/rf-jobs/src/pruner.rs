//! Background TTL eviction.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::manager::JobManager;

/// Prune expired jobs every `interval` until cancelled.
pub async fn run_pruner(manager: JobManager, interval: Duration, cancel: CancellationToken) {
    tracing::info!("Job pruner started (every {}s)", interval.as_secs());

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => break,
        }
        manager.prune(Utc::now());
    }

    tracing::info!("Job pruner stopped");
}
