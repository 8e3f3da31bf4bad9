use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::manager::PluginManager;

/// Handle for the background reaping loop. Abort it on shutdown; dropping
/// the handle aborts too, so the loop never outlives the scope that spawned
/// it.
pub struct ReaperHandle {
    task: JoinHandle<()>,
}

impl ReaperHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Periodically remove registry entries for workers that exited on their own.
///
/// Runs [`PluginManager::reap`] on the configured interval, under the same
/// registry lock as every foreground operation, so a background sweep can
/// never race a `start` or `stop`.
pub fn spawn_reaper(manager: &Arc<PluginManager>) -> ReaperHandle {
    let manager = manager.clone();
    let task = tokio::spawn(async move {
        let mut ticker = interval(manager.config().reap_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            debug!("reaping plugins");
            manager.reap().await;
        }
    });
    ReaperHandle { task }
}
