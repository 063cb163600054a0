//! Application configuration with layered loading.
//!
//! Configuration is loaded with figment from, in increasing precedence:
//!
//! 1. Built-in defaults
//! 2. TOML config file (if IMGCACHE_CONFIG_FILE set)
//! 3. Environment variables (IMGCACHE_*)

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::eviction::CacheLimits;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the cached image files.
    ///
    /// Set via IMGCACHE_CACHE_DIR.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Path to the SQLite metadata database.
    ///
    /// Set via IMGCACHE_DB_PATH.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Upper bound on the total size of cached files, in bytes.
    ///
    /// Set via IMGCACHE_MAX_CACHE_SIZE.
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: u64,

    /// Upper bound on the number of cached images.
    ///
    /// Set via IMGCACHE_MAX_CACHE_ENTRIES.
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,

    /// Footprint above which a memory-pressure signal evicts aggressively.
    ///
    /// Set via IMGCACHE_PRESSURE_THRESHOLD_BYTES.
    #[serde(default = "default_pressure_threshold_bytes")]
    pub pressure_threshold_bytes: u64,

    /// Period of the maintenance timer, in seconds.
    ///
    /// Set via IMGCACHE_MAINTENANCE_INTERVAL_SECS.
    #[serde(default = "default_ten_minutes")]
    pub maintenance_interval_secs: u64,

    /// Minimum time between two cleanups for the maintenance path, in seconds.
    ///
    /// Set via IMGCACHE_CLEANUP_COOLDOWN_SECS.
    #[serde(default = "default_ten_minutes")]
    pub cleanup_cooldown_secs: u64,

    /// User-Agent string for image requests.
    ///
    /// Set via IMGCACHE_USER_AGENT.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes downloaded for a single image.
    ///
    /// Set via IMGCACHE_MAX_IMAGE_BYTES.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via IMGCACHE_TIMEOUT_MS.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Allow image hosts that resolve to private or loopback addresses.
    ///
    /// Set via IMGCACHE_ALLOW_PRIVATE_HOSTS.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./imgcache")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./imgcache-meta.sqlite")
}

fn default_max_cache_size() -> u64 {
    CacheLimits::default().max_cache_size
}

fn default_max_cache_entries() -> usize {
    CacheLimits::default().max_cache_entries
}

fn default_pressure_threshold_bytes() -> u64 {
    CacheLimits::default().pressure_threshold_bytes
}

fn default_ten_minutes() -> u64 {
    600
}

fn default_user_agent() -> String {
    "imgcache/0.1".into()
}

fn default_max_image_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            db_path: default_db_path(),
            max_cache_size: default_max_cache_size(),
            max_cache_entries: default_max_cache_entries(),
            pressure_threshold_bytes: default_pressure_threshold_bytes(),
            maintenance_interval_secs: default_ten_minutes(),
            cleanup_cooldown_secs: default_ten_minutes(),
            user_agent: default_user_agent(),
            max_image_bytes: default_max_image_bytes(),
            timeout_ms: default_timeout_ms(),
            allow_private_hosts: false,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn cleanup_cooldown(&self) -> Duration {
        Duration::from_secs(self.cleanup_cooldown_secs)
    }

    /// Eviction bounds for the cache manager.
    pub fn limits(&self) -> CacheLimits {
        CacheLimits {
            max_cache_size: self.max_cache_size,
            max_cache_entries: self.max_cache_entries,
            pressure_threshold_bytes: self.pressure_threshold_bytes,
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// The layered provider stack used by [`AppConfig::load`].
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("IMGCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(Env::prefixed("IMGCACHE_"))
    }

    /// Extract and validate a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
