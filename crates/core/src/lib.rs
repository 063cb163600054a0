//! Core of the persistent image cache.
//!
//! This crate provides:
//! - SQLite metadata store with one record per cached URL
//! - Content directory addressed by URL hash
//! - Priority-aware prefetching and preloading
//! - Eviction passes and the background maintenance loop
//! - Unified error types and layered configuration

pub mod cache;
pub mod capability;
pub mod config;
pub mod content;
pub mod error;
pub mod eviction;
pub mod maintenance;
pub mod manager;
pub mod priority;

pub use cache::{CacheDb, CacheEntry};
pub use capability::{ImageFetcher, NoTransientCache, TransientCache};
pub use config::{AppConfig, ConfigError};
pub use content::ContentStore;
pub use error::Error;
pub use eviction::{CacheLimits, Footprint};
pub use maintenance::MaintenanceTask;
pub use manager::{CacheStats, CleanupOutcome, ImageCacheManager, PreloadSummary};
pub use priority::Priority;
