//! Periodic background cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::manager::{CleanupOutcome, ImageCacheManager};

/// Handle to the maintenance loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct MaintenanceTask {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceTask {
    /// Run [`ImageCacheManager::run_maintenance`] every `period`.
    ///
    /// The first pass happens one period after spawning. Ticks missed while a
    /// pass is running are skipped rather than bunched up.
    pub fn spawn(manager: Arc<ImageCacheManager>, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let (tx, mut rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => match manager.run_maintenance().await {
                        Ok(CleanupOutcome::Evicted { removed, freed_bytes }) => {
                            tracing::info!(removed, freed_bytes, "maintenance cleanup ran");
                        }
                        Ok(outcome) => tracing::trace!(?outcome, "maintenance tick"),
                        Err(err) => tracing::warn!(error = %err, "maintenance cleanup failed"),
                    },
                }
            }
            tracing::debug!("maintenance loop stopped");
        });

        Self { shutdown: Some(tx), handle: Some(handle) }
    }

    /// Stop the loop, waiting for an in-flight pass to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "maintenance task ended abnormally");
        }
    }
}

impl Drop for MaintenanceTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
