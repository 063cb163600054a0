//! Configuration validation rules.
//!
//! Checked once after loading, before the cache manager is constructed.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_cache_size`, `max_cache_entries` or `max_image_bytes` is 0
    /// - `maintenance_interval_secs` is 0
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cache_size == 0 {
            return Err(invalid("max_cache_size", "must be greater than 0"));
        }
        if self.max_cache_entries == 0 {
            return Err(invalid("max_cache_entries", "must be greater than 0"));
        }
        if self.max_image_bytes == 0 {
            return Err(invalid("max_image_bytes", "must be greater than 0"));
        }

        if self.maintenance_interval_secs == 0 {
            return Err(invalid("maintenance_interval_secs", "must be at least 1 second"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.pressure_threshold_bytes > self.max_cache_size {
            tracing::warn!(
                pressure_threshold_bytes = self.pressure_threshold_bytes,
                max_cache_size = self.max_cache_size,
                "pressure threshold is above the cache size bound; \
                 memory-pressure eviction will rarely trigger"
            );
        }

        Ok(())
    }
}
