//! cache_stats tool implementation.
//!
//! Reports every tracked image with its size measured from disk.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use imgcache_core::{CacheEntry, ImageCacheManager, Priority};

use crate::tools::json_result;

/// One tracked image.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatsEntry {
    pub url: String,
    pub local_path: String,
    pub priority: Priority,
    /// RFC 3339 time the image was cached.
    pub cached_at: String,
    /// RFC 3339 time of the last lookup hit.
    pub last_accessed: String,
    /// Size on disk in bytes; 0 if the file is missing.
    pub size: u64,
}

impl From<CacheEntry> for CacheStatsEntry {
    fn from(entry: CacheEntry) -> Self {
        Self {
            local_path: entry.local_path.to_string_lossy().into_owned(),
            url: entry.url,
            priority: entry.priority,
            cached_at: entry.cached_at.to_rfc3339(),
            last_accessed: entry.last_accessed.to_rfc3339(),
            size: entry.size,
        }
    }
}

/// Output from the cache_stats tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatsOutput {
    pub total_size: u64,
    pub entry_count: usize,
    pub max_cache_size: u64,
    pub max_cache_entries: usize,
    pub entries: Vec<CacheStatsEntry>,
}

/// Implementation of the cache_stats tool.
pub async fn stats_impl(manager: &ImageCacheManager) -> Result<CallToolResult, McpError> {
    let stats = manager.cache_stats().await?;
    let limits = manager.limits();

    let output = CacheStatsOutput {
        total_size: stats.total_size,
        entry_count: stats.entry_count,
        max_cache_size: limits.max_cache_size,
        max_cache_entries: limits.max_cache_entries,
        entries: stats.entries.into_iter().map(CacheStatsEntry::from).collect(),
    };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{manager, output_json};

    #[tokio::test]
    async fn test_stats_empty() {
        let (manager, _dir) = manager(&[]).await;
        let json = output_json(&stats_impl(&manager).await.unwrap());

        assert_eq!(json["entry_count"], 0);
        assert_eq!(json["total_size"], 0);
        assert_eq!(json["max_cache_entries"], 1000);
        assert!(json["entries"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_counts_phantom_entries_at_zero_bytes() {
        let (manager, _dir) = manager(&["gone"]).await;
        manager.preload(vec!["ok".into(), "gone".into()], Priority::High).await;

        let json = output_json(&stats_impl(&manager).await.unwrap());
        assert_eq!(json["entry_count"], 2);
        // the stub fetcher writes six bytes
        assert_eq!(json["total_size"], 6);

        let entries = json["entries"].as_array().unwrap();
        let gone = entries.iter().find(|e| e["url"] == "gone").unwrap();
        assert_eq!(gone["size"], 0);
        assert_eq!(gone["priority"], "high");
    }
}
