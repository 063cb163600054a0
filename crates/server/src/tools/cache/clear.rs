//! cache_clear tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use imgcache_core::ImageCacheManager;

use crate::tools::json_result;

/// Output from the cache_clear tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearOutput {
    /// Number of entries tracked before the clear.
    pub cleared: usize,
    pub freed_bytes: u64,
}

/// Implementation of the cache_clear tool.
///
/// Counts are best-effort: if measuring fails the clear still runs.
pub async fn clear_impl(manager: &ImageCacheManager) -> Result<CallToolResult, McpError> {
    let before = match manager.measure_footprint().await {
        Ok(footprint) => footprint,
        Err(err) => {
            tracing::warn!(error = %err, "could not measure cache before clearing");
            Default::default()
        }
    };

    manager.clear_cache().await;

    json_result(&CacheClearOutput { cleared: before.entry_count, freed_bytes: before.total_size })
}
