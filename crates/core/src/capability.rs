//! Collaborators the cache manager depends on but does not implement.

use std::path::Path;

use async_trait::async_trait;

use crate::Error;

/// Fetches a remote image and materializes it at a local path.
///
/// Timeouts and retries belong to the implementation; the cache only records
/// whether the call succeeded.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download `url` and leave the image readable at `dest`.
    ///
    /// On error nothing must be left at `dest`.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), Error>;
}

/// Short-lived in-process image cache owned by the rendering layer.
pub trait TransientCache: Send + Sync {
    /// Drop everything held in memory.
    fn release(&self);
}

/// Used when no rendering layer holds decoded images in memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransientCache;

impl TransientCache for NoTransientCache {
    fn release(&self) {}
}
