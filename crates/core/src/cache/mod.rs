//! SQLite-backed metadata store for cached images.
//!
//! Maps source URL to [`CacheEntry`], one row per URL, with async access via
//! tokio-rusqlite. It provides:
//!
//! - Deterministic content file names (non-cryptographic hash + extension)
//! - Automatic schema migrations
//! - Transactional batch writes for preload batches and eviction passes
//! - Recovery from an unreadable store by starting empty

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheEntry;
