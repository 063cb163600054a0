//! image_prefetch, image_preload and image_prefetch_critical tool implementations.
//!
//! Preloads run in the background by default and report only that they were
//! accepted; pass `wait: true` to get the per-batch totals back.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use imgcache_core::{Error, ImageCacheManager, PreloadSummary, Priority};

use super::json_result;

/// Input parameters for the image_prefetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImagePrefetchParams {
    /// The remote image URL.
    pub url: String,

    /// Retention priority: "low", "normal" (default), "high" or "critical".
    #[serde(default)]
    pub priority: Priority,
}

/// Output structure for the image_prefetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImagePrefetchOutput {
    pub url: String,
    pub priority: Priority,
    /// Whether the image was downloaded and recorded.
    pub success: bool,
}

/// Input parameters for the image_preload tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImagePreloadParams {
    /// Image URLs to fetch. Lists longer than the priority's cap are truncated.
    pub urls: Vec<String>,

    /// Retention priority: "low", "normal" (default), "high" or "critical".
    #[serde(default)]
    pub priority: Priority,

    /// Wait for the preload to finish and return its totals (default: false).
    #[serde(default)]
    pub wait: bool,
}

/// Input parameters for the image_prefetch_critical tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImagePrefetchCriticalParams {
    /// Image URLs to fetch at critical priority.
    pub urls: Vec<String>,

    /// Wait for the preload to finish and return its totals (default: false).
    #[serde(default)]
    pub wait: bool,
}

/// Output structure for the preload tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImagePreloadOutput {
    pub priority: Priority,
    /// Number of URLs received.
    pub requested: usize,
    /// Number of URLs the priority allows; the rest were dropped.
    pub cap: usize,
    /// True if the preload was started in the background.
    pub background: bool,
    /// Totals, when the call waited for completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<PreloadTotals>,
}

/// Counts from a completed preload.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PreloadTotals {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Already-cached URLs moved up to the requested priority without a refetch.
    pub promoted: usize,
}

impl From<PreloadSummary> for PreloadTotals {
    fn from(summary: PreloadSummary) -> Self {
        Self {
            attempted: summary.attempted,
            succeeded: summary.succeeded,
            failed: summary.failed,
            promoted: summary.promoted,
        }
    }
}

/// Implementation of the image_prefetch tool.
pub async fn prefetch_impl(manager: &ImageCacheManager, params: ImagePrefetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let success = manager.prefetch(&params.url, params.priority).await;

    json_result(&ImagePrefetchOutput { url: params.url, priority: params.priority, success })
}

/// Implementation of the image_preload tool.
pub async fn preload_impl(
    manager: &Arc<ImageCacheManager>, params: ImagePreloadParams,
) -> Result<CallToolResult, McpError> {
    if params.urls.is_empty() {
        return Err(Error::InvalidInput("urls cannot be empty".into()).into());
    }

    let priority = params.priority;
    let output = ImagePreloadOutput {
        priority,
        requested: params.urls.len(),
        cap: priority.preload_cap(),
        background: !params.wait,
        summary: None,
    };

    if params.wait {
        let summary = manager.preload(params.urls, priority).await;
        return json_result(&ImagePreloadOutput { summary: Some(summary.into()), ..output });
    }

    let manager = Arc::clone(manager);
    let urls = params.urls;
    tokio::spawn(async move {
        manager.preload(urls, priority).await;
    });

    json_result(&output)
}

/// Implementation of the image_prefetch_critical tool.
pub async fn prefetch_critical_impl(
    manager: &Arc<ImageCacheManager>, params: ImagePrefetchCriticalParams,
) -> Result<CallToolResult, McpError> {
    let params = ImagePreloadParams { urls: params.urls, priority: Priority::Critical, wait: params.wait };
    preload_impl(manager, params).await
}
