//! The image cache manager.
//!
//! Ties the metadata store, the content directory and the fetch capability
//! together and implements the caller-facing operations. Construct one per
//! process and share it behind an `Arc`.
//!
//! ### Expected misses are not errors
//! `lookup`, `prefetch`, `preload`, `is_cached` and `clear_cache` never hand
//! an error back: store and fetch failures are logged and reported as a miss,
//! `false`, or a failed count. `try_lookup`, the eviction passes and
//! `cache_stats` return `Result` for callers that need to tell them apart.
//!
//! ### Attempted implies tracked
//! `preload` writes a record for every URL it attempted, including failed
//! fetches. Such records point at a file that does not exist, so `lookup`
//! treats them as misses while `is_cached` (metadata only) reports them as
//! present. A later preload of the same URL skips the fetch, but raises the
//! record's priority if the new call asked for a higher one. The records are
//! reclaimed by the next eviction pass that selects them.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::cache::{CacheDb, CacheEntry};
use crate::capability::{ImageFetcher, TransientCache};
use crate::config::AppConfig;
use crate::content::ContentStore;
use crate::eviction::{self, CacheLimits, EvictionPlan, Footprint};
use crate::{Error, Priority};

/// Number of URLs fetched concurrently by one preload batch.
pub const PRELOAD_BATCH_SIZE: usize = 10;

/// Fraction of either bound above which the maintenance path cleans up.
pub const MAINTENANCE_THRESHOLD: f64 = 0.7;

/// Default minimum spacing between maintenance cleanups.
pub const DEFAULT_CLEANUP_COOLDOWN: Duration = Duration::from_secs(10 * 60);

/// Result of one eviction trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// Another cleanup held the guard; nothing was done.
    Busy,
    /// The maintenance cooldown has not elapsed yet.
    CoolingDown,
    /// The cache is within the trigger's threshold.
    BelowThreshold,
    /// A pass ran.
    Evicted { removed: usize, freed_bytes: u64 },
}

/// Counts from one preload call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadSummary {
    /// URLs passed in, before the priority cap.
    pub requested: usize,
    /// URLs a fetch was issued for.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Already-tracked URLs whose priority was raised instead of refetched.
    pub promoted: usize,
}

/// Snapshot of the cache contents with sizes measured from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_size: u64,
    pub entry_count: usize,
    pub entries: Vec<CacheEntry>,
}

#[derive(Debug, Default)]
struct CleanupState {
    last_cleanup: Option<Instant>,
}

/// Persistent, priority-aware image cache.
pub struct ImageCacheManager {
    db: CacheDb,
    content: ContentStore,
    fetcher: Arc<dyn ImageFetcher>,
    transient: Arc<dyn TransientCache>,
    limits: CacheLimits,
    cleanup_cooldown: Duration,
    cleanup: Mutex<CleanupState>,
}

impl std::fmt::Debug for ImageCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCacheManager")
            .field("content", &self.content)
            .field("limits", &self.limits)
            .field("cleanup_cooldown", &self.cleanup_cooldown)
            .finish_non_exhaustive()
    }
}

impl ImageCacheManager {
    pub fn new(
        db: CacheDb, content: ContentStore, fetcher: Arc<dyn ImageFetcher>, transient: Arc<dyn TransientCache>,
        limits: CacheLimits,
    ) -> Self {
        Self {
            db,
            content,
            fetcher,
            transient,
            limits,
            cleanup_cooldown: DEFAULT_CLEANUP_COOLDOWN,
            cleanup: Mutex::new(CleanupState::default()),
        }
    }

    /// Open the stores named by `config` and build a manager over them.
    ///
    /// An unreadable metadata database is replaced by an empty one.
    pub async fn open(
        config: &AppConfig, fetcher: Arc<dyn ImageFetcher>, transient: Arc<dyn TransientCache>,
    ) -> Result<Self, Error> {
        let content = ContentStore::open(&config.cache_dir).await?;
        let db = CacheDb::open_or_reset(&config.db_path).await?;

        Ok(Self::new(db, content, fetcher, transient, config.limits()).with_cleanup_cooldown(config.cleanup_cooldown()))
    }

    pub fn with_cleanup_cooldown(mut self, cooldown: Duration) -> Self {
        self.cleanup_cooldown = cooldown;
        self
    }

    pub fn limits(&self) -> &CacheLimits {
        &self.limits
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Local path of a cached image, if both its record and its file exist.
    ///
    /// A hit refreshes the entry's last-access time.
    pub async fn lookup(&self, url: &str) -> Option<PathBuf> {
        match self.try_lookup(url).await {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(url, error = %err, "lookup failed, treating as miss");
                None
            }
        }
    }

    /// [`lookup`](Self::lookup) that reports store failures instead of logging them.
    pub async fn try_lookup(&self, url: &str) -> Result<Option<PathBuf>, Error> {
        let Some(entry) = self.db.get_entry(url).await? else {
            tracing::debug!(url, "cache miss");
            return Ok(None);
        };

        if !self.content.exists(&entry.local_path).await {
            tracing::debug!(url, path = %entry.local_path.display(), "record without file, treating as miss");
            return Ok(None);
        }

        if !self.db.touch_entry(url, Utc::now()).await? {
            tracing::debug!(url, "record removed during lookup, treating as miss");
            return Ok(None);
        }
        tracing::debug!(url, "cache hit");
        Ok(Some(entry.local_path))
    }

    /// Whether a record exists for `url`.
    ///
    /// Only consults metadata: a record left by a failed preload fetch counts
    /// as cached even though [`lookup`](Self::lookup) will miss.
    pub async fn is_cached(&self, url: &str) -> bool {
        match self.db.contains_entry(url).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(url, error = %err, "metadata check failed");
                false
            }
        }
    }

    /// Fetch one image and record it. Returns false if either step failed.
    ///
    /// A failed fetch leaves any existing record untouched.
    pub async fn prefetch(&self, url: &str, priority: Priority) -> bool {
        let dest = self.content.path_for(url);
        if let Err(err) = self.fetcher.fetch(url, &dest).await {
            if err.is_fetch_failure() {
                tracing::debug!(url, error = %err, "prefetch failed");
            } else {
                tracing::warn!(url, error = %err, "prefetch failed locally");
            }
            return false;
        }

        let entry = CacheEntry::new(url, dest, priority, Utc::now());
        match self.db.upsert_entry(&entry).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(url, error = %err, "prefetched image could not be recorded");
                false
            }
        }
    }

    /// Fetch a list of images in sequential batches.
    ///
    /// The list is first cut to the priority's preload cap. URLs already
    /// tracked are not fetched again; their priority is raised to `priority`
    /// if it was lower. Within a batch all fetches run concurrently, and
    /// a batch's records are written before the next batch starts.
    pub async fn preload(&self, urls: Vec<String>, priority: Priority) -> PreloadSummary {
        let mut summary = PreloadSummary { requested: urls.len(), ..Default::default() };

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for url in urls.into_iter().take(priority.preload_cap()) {
            if !seen.insert(url.clone()) {
                continue;
            }
            match self.db.contains_entry(&url).await {
                Ok(true) => match self.db.raise_priority(&url, priority).await {
                    Ok(true) => summary.promoted += 1,
                    Ok(false) => {}
                    Err(err) => tracing::warn!(url, error = %err, "failed to raise priority of tracked image"),
                },
                Ok(false) => pending.push(url),
                Err(err) => {
                    tracing::warn!(url, error = %err, "metadata check failed, fetching anyway");
                    pending.push(url);
                }
            }
        }

        for batch in pending.chunks(PRELOAD_BATCH_SIZE) {
            let (succeeded, failed) = self.fetch_batch(batch).await;
            summary.attempted += batch.len();
            summary.succeeded += succeeded;
            summary.failed += failed;

            let now = Utc::now();
            let records = batch
                .iter()
                .map(|url| CacheEntry::new(url.clone(), self.content.path_for(url), priority, now))
                .collect();
            if let Err(err) = self.db.upsert_entries(records).await {
                tracing::warn!(batch = batch.len(), error = %err, "failed to record preload batch");
            }
        }

        tracing::info!(
            priority = ?priority,
            requested = summary.requested,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            promoted = summary.promoted,
            "preload finished"
        );
        summary
    }

    /// [`preload`](Self::preload) at [`Priority::Critical`].
    pub async fn prefetch_critical(&self, urls: Vec<String>) -> PreloadSummary {
        self.preload(urls, Priority::Critical).await
    }

    /// Run one batch concurrently; returns (succeeded, failed).
    async fn fetch_batch(&self, urls: &[String]) -> (usize, usize) {
        let mut join_set = JoinSet::new();
        for url in urls {
            let fetcher = Arc::clone(&self.fetcher);
            let dest = self.content.path_for(url);
            let url = url.clone();
            join_set.spawn(async move {
                let result = fetcher.fetch(&url, &dest).await;
                (url, result)
            });
        }

        let (mut succeeded, mut failed) = (0, 0);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((url, Ok(()))) => {
                    tracing::debug!(url, "preloaded");
                    succeeded += 1;
                }
                Ok((url, Err(err))) => {
                    if err.is_fetch_failure() {
                        tracing::debug!(url, error = %err, "preload fetch failed");
                    } else {
                        tracing::warn!(url, error = %err, "preload failed locally");
                    }
                    failed += 1;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "preload task aborted");
                    failed += 1;
                }
            }
        }
        (succeeded, failed)
    }

    /// Release in-memory images, wipe the content directory and every record.
    ///
    /// Failures are logged; calling it again on an empty cache is a no-op.
    pub async fn clear_cache(&self) {
        self.transient.release();

        if let Err(err) = self.content.reset().await {
            tracing::warn!(root = %self.content.root().display(), error = %err, "failed to reset content directory");
        }

        match self.db.clear_entries().await {
            Ok(removed) => tracing::info!(removed, "cache cleared"),
            Err(err) => tracing::warn!(error = %err, "failed to clear cache metadata"),
        }
    }

    /// Every entry with its size measured from disk.
    pub async fn cache_stats(&self) -> Result<CacheStats, Error> {
        let (entries, footprint) = self.measure().await?;
        Ok(CacheStats { total_size: footprint.total_size, entry_count: footprint.entry_count, entries })
    }

    /// Current total size and entry count.
    pub async fn measure_footprint(&self) -> Result<Footprint, Error> {
        Ok(self.measure().await?.1)
    }

    /// Full cleanup pass if the cache is over either bound.
    pub async fn cleanup_if_needed(&self) -> Result<CleanupOutcome, Error> {
        let Ok(mut state) = self.cleanup.try_lock() else {
            return Ok(CleanupOutcome::Busy);
        };

        let (entries, footprint) = self.measure().await?;
        if !footprint.exceeds(&self.limits, 1.0) {
            return Ok(CleanupOutcome::BelowThreshold);
        }

        let plan = eviction::plan_cleanup(entries, self.limits.max_cache_entries);
        let outcome = self.apply(plan).await?;
        state.last_cleanup = Some(Instant::now());
        Ok(outcome)
    }

    /// Timer-driven cleanup: cooldown-gated, triggers at 70% of either bound.
    pub async fn run_maintenance(&self) -> Result<CleanupOutcome, Error> {
        let Ok(mut state) = self.cleanup.try_lock() else {
            return Ok(CleanupOutcome::Busy);
        };

        if let Some(last) = state.last_cleanup
            && last.elapsed() < self.cleanup_cooldown
        {
            return Ok(CleanupOutcome::CoolingDown);
        }

        let (entries, footprint) = self.measure().await?;
        if !footprint.exceeds(&self.limits, MAINTENANCE_THRESHOLD) {
            tracing::debug!(
                total_size = footprint.total_size,
                entry_count = footprint.entry_count,
                "maintenance: cache below soft threshold"
            );
            return Ok(CleanupOutcome::BelowThreshold);
        }

        let plan = eviction::plan_cleanup(entries, self.limits.max_cache_entries);
        let outcome = self.apply(plan).await?;
        state.last_cleanup = Some(Instant::now());
        Ok(outcome)
    }

    /// React to a low-memory signal.
    ///
    /// Releases the transient cache unconditionally. Then, ignoring the
    /// maintenance cooldown, drops 80% of the non-Critical entries if the
    /// cache is above the pressure threshold.
    pub async fn handle_memory_pressure(&self) -> Result<CleanupOutcome, Error> {
        self.transient.release();

        let Ok(mut state) = self.cleanup.try_lock() else {
            return Ok(CleanupOutcome::Busy);
        };

        let (entries, footprint) = self.measure().await?;
        if footprint.total_size <= self.limits.pressure_threshold_bytes {
            return Ok(CleanupOutcome::BelowThreshold);
        }

        tracing::warn!(total_size = footprint.total_size, "memory pressure, evicting non-critical images");
        let outcome = self.apply(eviction::plan_pressure_eviction(entries)).await?;
        state.last_cleanup = Some(Instant::now());
        Ok(outcome)
    }

    /// Manual trigger: release the transient cache, then clean up if over bounds.
    pub async fn optimize_memory_usage(&self) -> Result<CleanupOutcome, Error> {
        self.transient.release();
        self.cleanup_if_needed().await
    }

    async fn measure(&self) -> Result<(Vec<CacheEntry>, Footprint), Error> {
        let mut entries = self.db.list_entries().await?;
        let mut total_size = 0u64;
        for entry in &mut entries {
            entry.size = self.content.size_of(&entry.local_path).await;
            total_size += entry.size;
        }
        let footprint = Footprint { total_size, entry_count: entries.len() };
        Ok((entries, footprint))
    }

    /// Delete the planned files, then commit the metadata change once.
    ///
    /// An entry whose file could not be deleted keeps its record, so the file
    /// is not orphaned.
    async fn apply(&self, plan: EvictionPlan) -> Result<CleanupOutcome, Error> {
        if plan.is_empty() {
            tracing::debug!(kept = plan.keep.len(), "eviction pass selected nothing");
        }

        let mut removed = Vec::with_capacity(plan.remove.len());
        let mut freed_bytes = plan.freed_bytes();
        let mut measured: Vec<(String, u64)> = plan.keep.iter().map(|e| (e.url.clone(), e.size)).collect();

        for entry in plan.remove {
            match self.content.remove(&entry.local_path).await {
                Ok(()) => removed.push(entry.url),
                Err(err) => {
                    tracing::warn!(url = %entry.url, error = %err, "failed to delete cached file");
                    freed_bytes -= entry.size;
                    measured.push((entry.url, entry.size));
                }
            }
        }

        let count = removed.len();
        self.db.commit_eviction(removed, measured).await?;
        tracing::info!(removed = count, freed_bytes, "eviction pass complete");
        Ok(CleanupOutcome::Evicted { removed: count, freed_bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use tempfile::TempDir;

    /// Writes `bytes` zeroes for every URL not listed in `failing`.
    #[derive(Default)]
    struct ScriptedFetcher {
        failing: HashSet<String>,
        bytes: usize,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn failing(urls: &[&str]) -> Self {
            Self { failing: urls.iter().map(|u| u.to_string()).collect(), bytes: 16, ..Default::default() }
        }
    }

    #[async_trait]
    impl ImageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str, dest: &Path) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(url) {
                return Err(Error::HttpStatus(404));
            }
            tokio::fs::write(dest, vec![0u8; self.bytes]).await?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingTransient {
        releases: AtomicUsize,
    }

    impl TransientCache for CountingTransient {
        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        manager: ImageCacheManager,
        fetcher: Arc<ScriptedFetcher>,
        transient: Arc<CountingTransient>,
        _dir: TempDir,
    }

    async fn harness(limits: CacheLimits, fetcher: ScriptedFetcher) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::open(dir.path().join("images")).await.unwrap();
        let db = CacheDb::open_in_memory().await.unwrap();
        let fetcher = Arc::new(fetcher);
        let transient = Arc::new(CountingTransient::default());
        let manager = ImageCacheManager::new(db, content, fetcher.clone(), transient.clone(), limits);
        Harness { manager, fetcher, transient, _dir: dir }
    }

    fn limits(max_entries: usize) -> CacheLimits {
        CacheLimits { max_cache_entries: max_entries, ..Default::default() }
    }

    fn minute(n: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + ChronoDuration::minutes(n)
    }

    /// Track `url` with a file of `len` bytes, last accessed at `minute(accessed)`.
    async fn seed(manager: &ImageCacheManager, url: &str, priority: Priority, accessed: i64, len: u64) {
        let path = manager.content().path_for(url);
        let file = tokio::fs::File::create(&path).await.unwrap();
        file.set_len(len).await.unwrap();

        let mut entry = CacheEntry::new(url, path, priority, minute(0));
        entry.last_accessed = minute(accessed);
        manager.db.upsert_entry(&entry).await.unwrap();
    }

    async fn tracked_urls(manager: &ImageCacheManager) -> Vec<String> {
        let mut urls: Vec<_> = manager.db.list_entries().await.unwrap().into_iter().map(|e| e.url).collect();
        urls.sort();
        urls
    }

    #[tokio::test]
    async fn test_lookup_hit_refreshes_access_time() {
        let h = harness(limits(100), ScriptedFetcher::default()).await;
        seed(&h.manager, "https://img.example.com/a.png", Priority::Normal, 0, 10).await;

        let path = h.manager.lookup("https://img.example.com/a.png").await.unwrap();
        assert_eq!(path, h.manager.content().path_for("https://img.example.com/a.png"));

        let entry = h.manager.db.get_entry("https://img.example.com/a.png").await.unwrap().unwrap();
        assert!(entry.last_accessed > minute(0));
    }

    #[tokio::test]
    async fn test_lookup_unknown_url_is_absent() {
        let h = harness(limits(100), ScriptedFetcher::default()).await;
        assert!(h.manager.lookup("https://img.example.com/none.png").await.is_none());
        assert!(h.manager.try_lookup("https://img.example.com/none.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_after_record_removed_is_absent() {
        let h = harness(limits(100), ScriptedFetcher::default()).await;
        let url = "https://img.example.com/evicted.png";
        seed(&h.manager, url, Priority::Normal, 0, 10).await;
        h.manager.db.commit_eviction(vec![url.to_string()], Vec::new()).await.unwrap();

        // the file outlived its record, which is no longer a hit
        assert!(h.manager.content().exists(&h.manager.content().path_for(url)).await);
        assert!(h.manager.try_lookup(url).await.unwrap().is_none());
        assert!(!h.manager.db.touch_entry(url, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_lookup_record_without_file_is_absent() {
        let h = harness(limits(100), ScriptedFetcher::default()).await;
        let url = "https://img.example.com/deleted.png";
        seed(&h.manager, url, Priority::High, 3, 10).await;
        tokio::fs::remove_file(h.manager.content().path_for(url)).await.unwrap();

        assert!(h.manager.lookup(url).await.is_none());
        // the stale record is not refreshed
        let entry = h.manager.db.get_entry(url).await.unwrap().unwrap();
        assert_eq!(entry.last_accessed, minute(3));
    }

    #[tokio::test]
    async fn test_prefetch_success_records_entry() {
        let h = harness(limits(100), ScriptedFetcher::failing(&[])).await;
        let url = "https://img.example.com/gen/42.webp";

        assert!(h.manager.prefetch(url, Priority::High).await);

        let entry = h.manager.db.get_entry(url).await.unwrap().unwrap();
        assert_eq!(entry.priority, Priority::High);
        assert_eq!(entry.size, 0);
        assert_eq!(entry.cached_at, entry.last_accessed);
        assert_eq!(h.manager.lookup(url).await, Some(entry.local_path));
    }

    #[tokio::test]
    async fn test_prefetch_failure_leaves_existing_entry() {
        let url = "https://img.example.com/flaky.png";
        let h = harness(limits(100), ScriptedFetcher::failing(&[url])).await;
        seed(&h.manager, url, Priority::Low, 7, 10).await;

        assert!(!h.manager.prefetch(url, Priority::Critical).await);

        let entry = h.manager.db.get_entry(url).await.unwrap().unwrap();
        assert_eq!(entry.priority, Priority::Low);
        assert_eq!(entry.last_accessed, minute(7));
    }

    #[tokio::test]
    async fn test_prefetch_failure_creates_nothing() {
        let url = "https://img.example.com/missing.png";
        let h = harness(limits(100), ScriptedFetcher::failing(&[url])).await;

        assert!(!h.manager.prefetch(url, Priority::Normal).await);
        assert!(!h.manager.is_cached(url).await);
    }

    #[tokio::test]
    async fn test_preload_tracks_failed_attempts() {
        let h = harness(limits(100), ScriptedFetcher::failing(&["b"])).await;

        let summary = h.manager.preload(vec!["a".into(), "b".into()], Priority::Normal).await;
        assert_eq!(summary, PreloadSummary { requested: 2, attempted: 2, succeeded: 1, failed: 1, promoted: 0 });

        assert!(h.manager.is_cached("a").await);
        assert!(h.manager.is_cached("b").await);
        assert!(h.manager.lookup("a").await.is_some());
        assert!(h.manager.lookup("b").await.is_none());
    }

    #[tokio::test]
    async fn test_preload_does_not_refetch_tracked_urls() {
        let h = harness(limits(100), ScriptedFetcher::failing(&["b"])).await;
        h.manager.preload(vec!["a".into(), "b".into()], Priority::Normal).await;

        let again = h.manager.preload(vec!["a".into(), "b".into(), "c".into()], Priority::Normal).await;
        assert_eq!(again.attempted, 1);
        assert_eq!(again.promoted, 0);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_preload_raises_priority_of_tracked_url() {
        let h = harness(limits(100), ScriptedFetcher::failing(&[])).await;
        h.manager.preload(vec!["hero".into()], Priority::Normal).await;
        let before = h.manager.db.get_entry("hero").await.unwrap().unwrap();

        let summary = h.manager.prefetch_critical(vec!["hero".into()]).await;
        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.promoted, 1);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);

        let after = h.manager.db.get_entry("hero").await.unwrap().unwrap();
        assert_eq!(after.priority, Priority::Critical);
        assert_eq!(after.cached_at, before.cached_at);
        assert_eq!(after.last_accessed, before.last_accessed);

        // a lower-priority preload does not demote it
        let summary = h.manager.preload(vec!["hero".into()], Priority::Low).await;
        assert_eq!(summary.promoted, 0);
        assert_eq!(h.manager.db.get_entry("hero").await.unwrap().unwrap().priority, Priority::Critical);
    }

    #[tokio::test]
    async fn test_preload_applies_priority_cap() {
        let h = harness(limits(10_000), ScriptedFetcher::failing(&[])).await;
        let urls: Vec<String> = (0..120).map(|i| format!("https://img.example.com/{i}.png")).collect();

        let summary = h.manager.preload(urls, Priority::Low).await;
        assert_eq!(summary.requested, 120);
        assert_eq!(summary.attempted, 50);
        assert_eq!(h.manager.db.count_entries().await.unwrap(), 50);
        assert!(h.manager.is_cached("https://img.example.com/49.png").await);
        assert!(!h.manager.is_cached("https://img.example.com/50.png").await);
    }

    #[tokio::test]
    async fn test_preload_bounds_concurrency_to_batch() {
        let h = harness(limits(10_000), ScriptedFetcher::failing(&[])).await;
        let urls: Vec<String> = (0..25).map(|i| format!("u{i}")).collect();

        let summary = h.manager.prefetch_critical(urls).await;
        assert_eq!(summary.succeeded, 25);
        assert!(h.fetcher.max_in_flight.load(Ordering::SeqCst) <= PRELOAD_BATCH_SIZE);

        let entries = h.manager.db.list_entries().await.unwrap();
        assert!(entries.iter().all(|e| e.priority == Priority::Critical));
    }

    #[tokio::test]
    async fn test_preload_deduplicates() {
        let h = harness(limits(100), ScriptedFetcher::failing(&[])).await;
        let summary = h.manager.preload(vec!["x".into(), "x".into(), "y".into()], Priority::High).await;
        assert_eq!(summary.attempted, 2);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cleanup_removes_oldest_over_count_bound() {
        let h = harness(limits(10), ScriptedFetcher::default()).await;
        for i in 0..12 {
            seed(&h.manager, &format!("u{i:02}"), Priority::Normal, 100 - i, 8).await;
        }

        let outcome = h.manager.cleanup_if_needed().await.unwrap();
        assert_eq!(outcome, CleanupOutcome::Evicted { removed: 3, freed_bytes: 24 });

        let remaining = tracked_urls(&h.manager).await;
        assert_eq!(remaining.len(), 9);
        for gone in ["u09", "u10", "u11"] {
            assert!(!remaining.contains(&gone.to_string()));
            assert!(!h.manager.content().exists(&h.manager.content().path_for(gone)).await);
        }
    }

    #[tokio::test]
    async fn test_cleanup_spares_critical() {
        let h = harness(limits(8), ScriptedFetcher::default()).await;
        for i in 0..5 {
            seed(&h.manager, &format!("crit{i}"), Priority::Critical, i, 8).await;
            seed(&h.manager, &format!("norm{i}"), Priority::Normal, 10 + i, 8).await;
        }

        let outcome = h.manager.cleanup_if_needed().await.unwrap();
        assert!(matches!(outcome, CleanupOutcome::Evicted { removed: 2, .. }));

        let remaining = tracked_urls(&h.manager).await;
        assert!((0..5).all(|i| remaining.contains(&format!("crit{i}"))));
        assert!(!remaining.contains(&"norm0".to_string()));
        assert!(!remaining.contains(&"norm1".to_string()));
    }

    #[tokio::test]
    async fn test_cleanup_below_bounds_is_noop() {
        let h = harness(limits(10), ScriptedFetcher::default()).await;
        for i in 0..10 {
            seed(&h.manager, &format!("u{i}"), Priority::Normal, i, 8).await;
        }
        assert_eq!(h.manager.cleanup_if_needed().await.unwrap(), CleanupOutcome::BelowThreshold);
        assert_eq!(h.manager.db.count_entries().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_cleanup_triggers_on_size_bound() {
        let limits = CacheLimits { max_cache_size: 100, max_cache_entries: 1000, pressure_threshold_bytes: 50 };
        let h = harness(limits, ScriptedFetcher::default()).await;
        for i in 0..5 {
            seed(&h.manager, &format!("u{i}"), Priority::Normal, i, 30).await;
        }

        let outcome = h.manager.cleanup_if_needed().await.unwrap();
        assert_eq!(outcome, CleanupOutcome::Evicted { removed: 1, freed_bytes: 30 });
        assert_eq!(tracked_urls(&h.manager).await, vec!["u1", "u2", "u3", "u4"]);
    }

    #[tokio::test]
    async fn test_cleanup_reclaims_phantom_records() {
        let h = harness(limits(3), ScriptedFetcher::failing(&["p0", "p1"])).await;
        h.manager
            .preload(vec!["p0".into(), "p1".into(), "a".into(), "b".into(), "c".into()], Priority::Normal)
            .await;
        // make the real images look recently used
        for url in ["a", "b", "c"] {
            h.manager.lookup(url).await.unwrap();
        }

        h.manager.cleanup_if_needed().await.unwrap();
        assert_eq!(tracked_urls(&h.manager).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_record_when_delete_fails() {
        let h = harness(limits(1), ScriptedFetcher::default()).await;
        for (i, url) in ["a", "b", "c"].into_iter().enumerate() {
            seed(&h.manager, url, Priority::Normal, i as i64, 8).await;
        }
        // a directory where the file should be cannot be removed as a file
        let stuck = h.manager.content().path_for("a");
        tokio::fs::remove_file(&stuck).await.unwrap();
        tokio::fs::create_dir(&stuck).await.unwrap();

        let outcome = h.manager.cleanup_if_needed().await.unwrap();
        assert_eq!(outcome, CleanupOutcome::Evicted { removed: 1, freed_bytes: 8 });
        assert_eq!(tracked_urls(&h.manager).await, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_cleanup_persists_measured_sizes() {
        let h = harness(limits(1), ScriptedFetcher::default()).await;
        seed(&h.manager, "old", Priority::Normal, 0, 64).await;
        seed(&h.manager, "new", Priority::Critical, 5, 128).await;

        h.manager.cleanup_if_needed().await.unwrap();

        let survivor = h.manager.db.get_entry("new").await.unwrap().unwrap();
        assert_eq!(survivor.size, 128);
        assert!(h.manager.db.get_entry("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_trigger_observes_guard() {
        let h = harness(limits(1), ScriptedFetcher::default()).await;
        seed(&h.manager, "a", Priority::Normal, 0, 8).await;
        seed(&h.manager, "b", Priority::Normal, 1, 8).await;

        let guard = h.manager.cleanup.lock().await;
        assert_eq!(h.manager.cleanup_if_needed().await.unwrap(), CleanupOutcome::Busy);
        assert_eq!(h.manager.run_maintenance().await.unwrap(), CleanupOutcome::Busy);
        assert_eq!(h.manager.handle_memory_pressure().await.unwrap(), CleanupOutcome::Busy);
        drop(guard);

        assert_eq!(h.manager.db.count_entries().await.unwrap(), 2);
        assert!(matches!(h.manager.cleanup_if_needed().await.unwrap(), CleanupOutcome::Evicted { .. }));
    }

    #[tokio::test]
    async fn test_maintenance_soft_threshold() {
        let h = harness(limits(10), ScriptedFetcher::default()).await;
        for i in 0..7 {
            seed(&h.manager, &format!("u{i}"), Priority::Normal, i, 8).await;
        }
        assert_eq!(h.manager.run_maintenance().await.unwrap(), CleanupOutcome::BelowThreshold);

        seed(&h.manager, "u7", Priority::Normal, 7, 8).await;
        // 8 entries > 70% of 10: a full pass removes ceil(8 * 0.2) = 2
        assert!(matches!(h.manager.run_maintenance().await.unwrap(), CleanupOutcome::Evicted { removed: 2, .. }));
        assert_eq!(h.manager.db.count_entries().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_maintenance_cooldown() {
        let mut h = harness(limits(10), ScriptedFetcher::default()).await;
        h.manager = h.manager.with_cleanup_cooldown(Duration::from_secs(3600));
        for i in 0..20 {
            seed(&h.manager, &format!("u{i}"), Priority::Normal, i, 8).await;
        }

        assert!(matches!(h.manager.run_maintenance().await.unwrap(), CleanupOutcome::Evicted { .. }));
        assert_eq!(h.manager.run_maintenance().await.unwrap(), CleanupOutcome::CoolingDown);
    }

    #[tokio::test]
    async fn test_memory_pressure_ignores_cooldown() {
        let limits = CacheLimits { pressure_threshold_bytes: 50, ..limits(10) };
        let mut h = harness(limits, ScriptedFetcher::default()).await;
        h.manager = h.manager.with_cleanup_cooldown(Duration::from_secs(3600));
        for i in 0..20 {
            seed(&h.manager, &format!("u{i:02}"), Priority::Normal, i, 8).await;
        }

        // removes max(20 - 10, ceil(20 / 5)) = 10, leaving 80 bytes
        let outcome = h.manager.run_maintenance().await.unwrap();
        assert_eq!(outcome, CleanupOutcome::Evicted { removed: 10, freed_bytes: 80 });
        assert_eq!(h.manager.run_maintenance().await.unwrap(), CleanupOutcome::CoolingDown);

        // 80 bytes > 50: floor(10 * 4 / 5) = 8 go despite the cooldown
        let pressure = h.manager.handle_memory_pressure().await.unwrap();
        assert_eq!(pressure, CleanupOutcome::Evicted { removed: 8, freed_bytes: 64 });
        assert_eq!(tracked_urls(&h.manager).await, vec!["u18", "u19"]);
        assert_eq!(h.manager.run_maintenance().await.unwrap(), CleanupOutcome::CoolingDown);
    }

    #[tokio::test]
    async fn test_maintenance_cooldown_elapses() {
        let mut h = harness(limits(10), ScriptedFetcher::default()).await;
        h.manager = h.manager.with_cleanup_cooldown(Duration::ZERO);
        for i in 0..20 {
            seed(&h.manager, &format!("u{i}"), Priority::Normal, i, 8).await;
        }

        assert!(matches!(h.manager.run_maintenance().await.unwrap(), CleanupOutcome::Evicted { .. }));
        assert!(matches!(h.manager.run_maintenance().await.unwrap(), CleanupOutcome::Evicted { .. }));
    }

    #[tokio::test]
    async fn test_memory_pressure_evicts_eighty_percent() {
        let h = harness(limits(1000), ScriptedFetcher::default()).await;
        // ten 6 MB files: 60 MB against the 50 MB default threshold
        for i in 0..10 {
            seed(&h.manager, &format!("u{i}"), Priority::Normal, i, 6 * 1024 * 1024).await;
        }

        let outcome = h.manager.handle_memory_pressure().await.unwrap();
        assert_eq!(outcome, CleanupOutcome::Evicted { removed: 8, freed_bytes: 48 * 1024 * 1024 });
        assert_eq!(h.manager.db.count_entries().await.unwrap(), 2);
        assert_eq!(h.transient.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memory_pressure_keeps_critical() {
        let limits = CacheLimits { pressure_threshold_bytes: 100, ..limits(1000) };
        let h = harness(limits, ScriptedFetcher::default()).await;
        for i in 0..4 {
            seed(&h.manager, &format!("crit{i}"), Priority::Critical, i, 50).await;
        }
        for i in 0..5 {
            seed(&h.manager, &format!("norm{i}"), Priority::Normal, i, 50).await;
        }

        let outcome = h.manager.handle_memory_pressure().await.unwrap();
        assert!(matches!(outcome, CleanupOutcome::Evicted { removed: 4, .. }));
        assert_eq!(tracked_urls(&h.manager).await, vec!["crit0", "crit1", "crit2", "crit3", "norm4"]);
    }

    #[tokio::test]
    async fn test_memory_pressure_below_threshold_only_releases() {
        let h = harness(limits(1000), ScriptedFetcher::default()).await;
        seed(&h.manager, "small", Priority::Normal, 0, 1024).await;

        assert_eq!(h.manager.handle_memory_pressure().await.unwrap(), CleanupOutcome::BelowThreshold);
        assert_eq!(h.transient.releases.load(Ordering::SeqCst), 1);
        assert!(h.manager.is_cached("small").await);
    }

    #[tokio::test]
    async fn test_clear_cache_twice() {
        let h = harness(limits(100), ScriptedFetcher::failing(&[])).await;
        h.manager.preload(vec!["a".into(), "b".into()], Priority::Normal).await;

        h.manager.clear_cache().await;
        h.manager.clear_cache().await;

        let stats = h.manager.cache_stats().await.unwrap();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.total_size, 0);
        assert!(h.manager.content().root().is_dir());
        assert!(!h.manager.is_cached("a").await);
        assert_eq!(h.transient.releases.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_stats_measure_disk() {
        let h = harness(limits(100), ScriptedFetcher::default()).await;
        seed(&h.manager, "a", Priority::Normal, 0, 100).await;
        seed(&h.manager, "b", Priority::High, 1, 300).await;

        let stats = h.manager.cache_stats().await.unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_size, 400);
        assert_eq!(stats.entries.iter().map(|e| e.size).sum::<u64>(), 400);
    }

    #[tokio::test]
    async fn test_optimize_memory_usage() {
        let h = harness(limits(2), ScriptedFetcher::default()).await;
        for i in 0..3 {
            seed(&h.manager, &format!("u{i}"), Priority::Normal, i, 8).await;
        }

        let outcome = h.manager.optimize_memory_usage().await.unwrap();
        assert!(matches!(outcome, CleanupOutcome::Evicted { removed: 1, .. }));
        assert_eq!(h.transient.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            cache_dir: dir.path().join("images"),
            db_path: dir.path().join("meta.sqlite"),
            ..Default::default()
        };
        let manager = ImageCacheManager::open(
            &config,
            Arc::new(ScriptedFetcher::default()),
            Arc::new(crate::capability::NoTransientCache),
        )
        .await
        .unwrap();

        assert!(config.cache_dir.is_dir());
        assert_eq!(manager.limits(), &config.limits());
        assert_eq!(manager.cleanup_cooldown, config.cleanup_cooldown());
    }
}
