use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{PolicySnapshot, PolicyStore};
use crate::shutdown::Shutdown;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Start the config hot-reload task.
///
/// Every two seconds the task polls the backing file's mtime; when it
/// changes, the store reloads and `on_change` runs exactly once with the
/// newly published snapshot. A failed reload keeps the current snapshot.
/// The task stops at its next wake after shutdown is initiated.
pub fn spawn_watcher<F>(
    store: Arc<PolicyStore>,
    shutdown: Shutdown,
    on_change: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<PolicySnapshot>) + Send + Sync + 'static,
{
    let mut rx = shutdown.subscribe();
    tokio::spawn(async move {
        let mut tick = interval(POLL_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Started watching config file: {}",
            store.config_path().display()
        );

        loop {
            tokio::select! {
                _ = rx.recv() => break,
                _ = tick.tick() => {
                    if !store.poll_changed().await {
                        continue;
                    }
                    match store.load().await {
                        Ok(snapshot) => {
                            info!("Configuration reloaded");
                            on_change(snapshot);
                        }
                        Err(e) => {
                            warn!("Failed to reload configuration (keeping current): {}", e);
                        }
                    }
                }
            }
        }
        debug!("Config watcher stopped");
    })
}
