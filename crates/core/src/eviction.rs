//! Eviction planning.
//!
//! Pure functions deciding which entries to drop. Deleting files and
//! committing the metadata change is the manager's job; everything here works
//! on in-memory entry lists so the policy can be tested without I/O.
//!
//! ### Full cleanup pass
//! - Order: non-Critical before Critical, then least recently accessed first.
//! - Quota: `max(count - max_entries, ceil(count * 0.2))`.
//! - Critical entries are only taken while fewer than 80% of the quota has
//!   been removed.
//!
//! ### Pressure pass
//! - Critical entries are kept.
//! - `floor(n * 0.8)` of the `n` non-Critical entries are removed, least
//!   recently accessed first.

use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;

/// Bounds the cache is kept under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLimits {
    /// Upper bound on the summed size of cached files, in bytes.
    pub max_cache_size: u64,
    /// Upper bound on the number of tracked URLs.
    pub max_cache_entries: usize,
    /// Footprint above which a memory-pressure signal triggers eviction.
    pub pressure_threshold_bytes: u64,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self { max_cache_size: 500 * 1024 * 1024, max_cache_entries: 1000, pressure_threshold_bytes: 50 * 1024 * 1024 }
    }
}

/// Measured size of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    pub total_size: u64,
    pub entry_count: usize,
}

impl Footprint {
    /// True if size or count is strictly above `fraction` of its bound.
    pub fn exceeds(&self, limits: &CacheLimits, fraction: f64) -> bool {
        self.total_size as f64 > limits.max_cache_size as f64 * fraction
            || self.entry_count as f64 > limits.max_cache_entries as f64 * fraction
    }
}

/// Entries split into those to delete and those to keep.
#[derive(Debug, Default, Clone)]
pub struct EvictionPlan {
    pub remove: Vec<CacheEntry>,
    pub keep: Vec<CacheEntry>,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty()
    }

    /// Bytes the removals free, going by measured sizes.
    pub fn freed_bytes(&self) -> u64 {
        self.remove.iter().map(|e| e.size).sum()
    }
}

/// Sort so that the first entries are the first to go.
///
/// The sort is stable: entries with equal keys keep their storage order.
pub fn order_for_eviction(entries: &mut [CacheEntry]) {
    entries.sort_by_key(|e| (e.priority.is_critical(), e.last_accessed));
}

/// Number of entries a full pass removes.
///
/// Always at least a fifth of the cache, even when barely over the count bound.
pub fn removal_quota(count: usize, max_entries: usize) -> usize {
    let over = count.saturating_sub(max_entries);
    let fifth = count.div_ceil(5);
    over.max(fifth)
}

/// Plan a full cleanup pass over every tracked entry.
pub fn plan_cleanup(mut entries: Vec<CacheEntry>, max_entries: usize) -> EvictionPlan {
    let quota = removal_quota(entries.len(), max_entries).min(entries.len());
    order_for_eviction(&mut entries);

    let mut plan = EvictionPlan::default();
    for entry in entries {
        let removed = plan.remove.len();
        // removed >= quota * 0.8, in integers
        let protect_critical = removed * 5 >= quota * 4;

        if removed >= quota || (entry.priority.is_critical() && protect_critical) {
            plan.keep.push(entry);
        } else {
            plan.remove.push(entry);
        }
    }
    plan
}

/// Plan the aggressive pass run under memory pressure.
pub fn plan_pressure_eviction(entries: Vec<CacheEntry>) -> EvictionPlan {
    let (critical, mut others): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| e.priority.is_critical());
    others.sort_by_key(|e| e.last_accessed);

    let cut = others.len() * 4 / 5;
    let keep_others = others.split_off(cut);

    let mut keep = critical;
    keep.extend(keep_others);
    EvictionPlan { remove: others, keep }
}
