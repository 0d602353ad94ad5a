//! Scheduled cleanup of expired login state and idle rate-limit entries.

use crate::db::Database;
use crate::rate_limit::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database, rate_limits: &RateLimitConfig) {
    match db.oauth_states().cleanup_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired OAuth states", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up OAuth states: {}", e),
    }

    let tracked = rate_limits.retain_recent();
    tracing::debug!(tracked, "Pruned idle rate limit entries");
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    db: Database,
    rate_limits: Arc<RateLimitConfig>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db, &rate_limits).await;
        }
    })
}
