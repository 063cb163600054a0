//! MCP server handler.
//!
//! Owns the shared cache manager and routes each tool call to its `*_impl`
//! function in [`crate::tools`].
use std::sync::Arc;

use imgcache_core::ImageCacheManager;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::cache::{clear_impl, memory_pressure_impl, optimize_impl, stats_impl};
use crate::tools::image_lookup::{ImageUrlParams, is_cached_impl, lookup_impl};
use crate::tools::image_prefetch::{
    ImagePrefetchCriticalParams, ImagePrefetchParams, ImagePreloadParams, prefetch_critical_impl, prefetch_impl,
    preload_impl,
};

/// The main MCP server handler for imgcache.
#[derive(Clone)]
pub struct ImageCacheServer {
    manager: Arc<ImageCacheManager>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ImageCacheServer {
    /// Create a new server handler over a shared cache manager.
    pub fn new(manager: Arc<ImageCacheManager>) -> Self {
        Self { manager, tool_router: Self::tool_router() }
    }

    #[tool(description = "Return the local file path of a cached image, or hit=false if it is not available offline.")]
    async fn image_lookup(&self, params: Parameters<ImageUrlParams>) -> Result<CallToolResult, McpError> {
        lookup_impl(&self.manager, params.0).await
    }

    #[tool(description = "Download one image into the cache with a retention priority (low, normal, high, critical).")]
    async fn image_prefetch(&self, params: Parameters<ImagePrefetchParams>) -> Result<CallToolResult, McpError> {
        prefetch_impl(&self.manager, params.0).await
    }

    #[tool(
        description = "Download a list of images in batches of 10. Runs in the background unless wait=true. Lists are capped per priority: critical 500, high 200, normal 100, low 50."
    )]
    async fn image_preload(&self, params: Parameters<ImagePreloadParams>) -> Result<CallToolResult, McpError> {
        preload_impl(&self.manager, params.0).await
    }

    #[tool(description = "Preload images at critical priority. Critical images are the last to be evicted.")]
    async fn image_prefetch_critical(
        &self, params: Parameters<ImagePrefetchCriticalParams>,
    ) -> Result<CallToolResult, McpError> {
        prefetch_critical_impl(&self.manager, params.0).await
    }

    #[tool(description = "Check whether a URL is tracked by the cache. Does not verify the file on disk.")]
    async fn image_is_cached(&self, params: Parameters<ImageUrlParams>) -> Result<CallToolResult, McpError> {
        is_cached_impl(&self.manager, params.0).await
    }

    #[tool(description = "Report total size, entry count and every cached image.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(&self.manager).await
    }

    #[tool(description = "Delete every cached image and its metadata.")]
    async fn cache_clear(&self) -> Result<CallToolResult, McpError> {
        clear_impl(&self.manager).await
    }

    #[tool(description = "Release in-memory images and evict cached images if the cache is over its bounds.")]
    async fn cache_optimize(&self) -> Result<CallToolResult, McpError> {
        optimize_impl(&self.manager).await
    }

    #[tool(
        description = "Simulate a low-memory signal: release in-memory images and evict most non-critical images if the cache is above the pressure threshold."
    )]
    async fn cache_memory_pressure(&self) -> Result<CallToolResult, McpError> {
        memory_pressure_impl(&self.manager).await
    }
}

impl ServerHandler for ImageCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "imgcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Offline image cache. Prefetch or preload image URLs, then resolve them to local files with \
                 image_lookup. Critical images survive ordinary eviction."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
