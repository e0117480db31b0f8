use std::sync::Arc;
use std::time::Duration;

use crate::SessionStore;

/// Spawns the periodic retention sweep. The interval is injectable so tests
/// can drive it with a short tick instead of the production hour.
pub fn spawn_cleanup_task(
    store: Arc<SessionStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup is not a sweep.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.cleanup();
            if !removed.is_empty() {
                tracing::info!(count = removed.len(), "session retention sweep complete");
            }
        }
    })
}
