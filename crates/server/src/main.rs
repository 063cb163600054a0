//! imgcache server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use imgcache_client::{FetchConfig, HttpImageFetcher};
use imgcache_core::{AppConfig, ImageCacheManager, MaintenanceTask, NoTransientCache};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
#[cfg(unix)]
mod signals;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        cache_dir = %config.cache_dir.display(),
        db_path = %config.db_path.display(),
        max_cache_size = config.max_cache_size,
        max_cache_entries = config.max_cache_entries,
        "Starting imgcache server on stdio transport"
    );

    let fetcher = HttpImageFetcher::new(FetchConfig::from_app_config(&config))?;
    let manager = Arc::new(ImageCacheManager::open(&config, Arc::new(fetcher), Arc::new(NoTransientCache)).await?);

    let maintenance = MaintenanceTask::spawn(Arc::clone(&manager), config.maintenance_interval());

    #[cfg(unix)]
    let _pressure = signals::spawn_memory_pressure_listener(Arc::clone(&manager))?;

    let handler = handler::ImageCacheServer::new(manager);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    maintenance.shutdown().await;

    Ok(())
}
