//! image_lookup and image_is_cached tool implementations.
//!
//! Read-side queries against the cache. Neither makes a network request.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use imgcache_core::{Error, ImageCacheManager};

use super::json_result;

/// Input parameters for the image_lookup and image_is_cached tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageUrlParams {
    /// The remote image URL, exactly as it was prefetched.
    pub url: String,
}

impl ImageUrlParams {
    fn validated(self) -> Result<String, Error> {
        if self.url.trim().is_empty() {
            return Err(Error::InvalidInput("url cannot be empty".into()));
        }
        Ok(self.url)
    }
}

/// Output structure for the image_lookup tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageLookupOutput {
    pub url: String,
    /// Whether a usable local copy exists.
    pub hit: bool,
    /// Local file path of the cached image, on a hit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Output structure for the image_is_cached tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageIsCachedOutput {
    pub url: String,
    /// Whether the URL is tracked by the cache.
    pub cached: bool,
}

/// Implementation of the image_lookup tool.
pub async fn lookup_impl(manager: &ImageCacheManager, params: ImageUrlParams) -> Result<CallToolResult, McpError> {
    let url = params.validated()?;
    let path = manager.lookup(&url).await.map(|p| p.to_string_lossy().into_owned());

    json_result(&ImageLookupOutput { hit: path.is_some(), url, path })
}

/// Implementation of the image_is_cached tool.
pub async fn is_cached_impl(manager: &ImageCacheManager, params: ImageUrlParams) -> Result<CallToolResult, McpError> {
    let url = params.validated()?;
    let cached = manager.is_cached(&url).await;

    json_result(&ImageIsCachedOutput { url, cached })
}
