//! OS signal hooks.
//!
//! SIGUSR1 is treated as a low-memory warning from the host process.

use std::sync::Arc;

use imgcache_core::{CleanupOutcome, ImageCacheManager};
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;

/// Run the memory-pressure path every time SIGUSR1 arrives.
pub fn spawn_memory_pressure_listener(manager: Arc<ImageCacheManager>) -> std::io::Result<JoinHandle<()>> {
    let mut stream = signal(SignalKind::user_defined1())?;

    Ok(tokio::spawn(async move {
        while stream.recv().await.is_some() {
            match manager.handle_memory_pressure().await {
                Ok(CleanupOutcome::Evicted { removed, freed_bytes }) => {
                    tracing::info!(removed, freed_bytes, "memory pressure handled");
                }
                Ok(outcome) => tracing::debug!(?outcome, "memory pressure signal, nothing evicted"),
                Err(err) => tracing::warn!(error = %err, "memory pressure eviction failed"),
            }
        }
    }))
}
