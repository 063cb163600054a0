//! MCP tool implementations.
//!
//! This module contains all tools exposed by the imgcache server.

pub mod cache;
pub mod image_lookup;
pub mod image_prefetch;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use imgcache_core::Error;

/// Serialize a tool output as the pretty-printed JSON text result.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
