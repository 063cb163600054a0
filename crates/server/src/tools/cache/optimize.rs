//! cache_optimize and cache_memory_pressure tool implementations.
//!
//! Both release in-memory images first. cache_optimize then runs the normal
//! bounded cleanup; cache_memory_pressure runs the aggressive pass.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use imgcache_core::{CleanupOutcome, ImageCacheManager};

use crate::tools::json_result;

/// Output from the cleanup tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CleanupOutput {
    /// One of "evicted", "below_threshold", "cooling_down" or "busy".
    pub status: String,
    pub removed: usize,
    pub freed_bytes: u64,
}

impl From<CleanupOutcome> for CleanupOutput {
    fn from(outcome: CleanupOutcome) -> Self {
        let (status, removed, freed_bytes) = match outcome {
            CleanupOutcome::Evicted { removed, freed_bytes } => ("evicted", removed, freed_bytes),
            CleanupOutcome::BelowThreshold => ("below_threshold", 0, 0),
            CleanupOutcome::CoolingDown => ("cooling_down", 0, 0),
            CleanupOutcome::Busy => ("busy", 0, 0),
        };
        Self { status: status.to_string(), removed, freed_bytes }
    }
}

/// Implementation of the cache_optimize tool.
pub async fn optimize_impl(manager: &ImageCacheManager) -> Result<CallToolResult, McpError> {
    let outcome = manager.optimize_memory_usage().await?;
    json_result(&CleanupOutput::from(outcome))
}

/// Implementation of the cache_memory_pressure tool.
pub async fn memory_pressure_impl(manager: &ImageCacheManager) -> Result<CallToolResult, McpError> {
    let outcome = manager.handle_memory_pressure().await?;
    json_result(&CleanupOutput::from(outcome))
}
