//! Background tasks for the yomi server.
//!
//! Includes:
//! - Purging expired key-value entries (cache clips and stale leases).

use std::sync::Arc;
use tokio::time::{sleep, Duration};
use yomi_db::KvStore;

pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Starts the expired-entry purge task.
///
/// This task runs indefinitely. Expired rows are already hidden from reads;
/// purging only reclaims space.
pub async fn start_kv_purge_task(store: Arc<dyn KvStore>, interval: Duration) {
    tracing::info!(
        interval_seconds = interval.as_secs(),
        "starting expired entry purge task"
    );

    loop {
        sleep(interval).await;

        match store.purge_expired().await {
            Ok(0) => tracing::debug!("no expired entries to purge"),
            Ok(count) => tracing::info!(count, "purged expired entries"),
            Err(e) => tracing::error!(error = %e, "failed to purge expired entries"),
        }
    }
}
