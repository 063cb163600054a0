//! Eviction priority levels.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Ordinal protection level of a cache entry.
///
/// Governs eviction order only; it has no effect on the order in which
/// members of a preload batch are fetched.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Maximum number of URLs a single preload call at this priority will consider.
    pub fn preload_cap(self) -> usize {
        match self {
            Priority::Critical => 500,
            Priority::High => 200,
            Priority::Normal => 100,
            Priority::Low => 50,
        }
    }

    /// Integer form stored in the metadata table.
    pub fn as_i64(self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    /// Inverse of [`Priority::as_i64`]; unknown values yield `None`.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Priority::Low),
            1 => Some(Priority::Normal),
            2 => Some(Priority::High),
            3 => Some(Priority::Critical),
            _ => None,
        }
    }

    pub fn is_critical(self) -> bool {
        self == Priority::Critical
    }
}
