//! Cache entry records.
//!
//! One row per source URL. Multi-row writes run in a single transaction so a
//! preload batch or an eviction pass lands all-or-nothing.

use std::path::PathBuf;

use super::connection::CacheDb;
use crate::{Error, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

const SELECT_COLUMNS: &str = "SELECT url, local_path, priority, cached_at, last_accessed, size FROM cache_entries";

const UPSERT: &str = "INSERT INTO cache_entries (url, local_path, priority, cached_at, last_accessed, size)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(url) DO UPDATE SET
        local_path = excluded.local_path,
        priority = excluded.priority,
        cached_at = excluded.cached_at,
        last_accessed = excluded.last_accessed,
        size = excluded.size";

/// A tracked URL-to-local-file mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub local_path: PathBuf,
    pub priority: Priority,
    pub cached_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Best-effort byte size, refreshed from disk by eviction passes.
    pub size: u64,
}

impl CacheEntry {
    /// A fresh record: both timestamps set to `now`, size not yet measured.
    pub fn new(url: impl Into<String>, local_path: PathBuf, priority: Priority, now: DateTime<Utc>) -> Self {
        Self { url: url.into(), local_path, priority, cached_at: now, last_accessed: now, size: 0 }
    }
}

/// Raw column values, before validation.
struct EntryRow {
    url: String,
    local_path: String,
    priority: i64,
    cached_at: i64,
    last_accessed: i64,
    size: i64,
}

impl EntryRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            local_path: row.get(1)?,
            priority: row.get(2)?,
            cached_at: row.get(3)?,
            last_accessed: row.get(4)?,
            size: row.get(5)?,
        })
    }

    /// Rows with out-of-range values are treated as absent.
    fn into_entry(self) -> Option<CacheEntry> {
        let priority = Priority::from_i64(self.priority);
        let cached_at = DateTime::<Utc>::from_timestamp_millis(self.cached_at);
        let last_accessed = DateTime::<Utc>::from_timestamp_millis(self.last_accessed);

        match (priority, cached_at, last_accessed) {
            (Some(priority), Some(cached_at), Some(last_accessed)) => Some(CacheEntry {
                url: self.url,
                local_path: PathBuf::from(self.local_path),
                priority,
                cached_at,
                last_accessed,
                size: u64::try_from(self.size).unwrap_or(0),
            }),
            _ => {
                tracing::warn!(url = %self.url, priority = self.priority, "skipping malformed cache entry row");
                None
            }
        }
    }
}

fn upsert_with(conn: &rusqlite::Connection, entry: &CacheEntry) -> rusqlite::Result<usize> {
    conn.execute(
        UPSERT,
        params![
            &entry.url,
            entry.local_path.to_string_lossy().into_owned(),
            entry.priority.as_i64(),
            entry.cached_at.timestamp_millis(),
            entry.last_accessed.timestamp_millis(),
            i64::try_from(entry.size).unwrap_or(i64::MAX),
        ],
    )
}

impl CacheDb {
    /// Get the entry for a URL.
    ///
    /// Returns None if the URL is not tracked (or its row is malformed).
    pub async fn get_entry(&self, url: &str) -> Result<Option<CacheEntry>, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE url = ?1"))?;
                match stmt.query_row(params![url], EntryRow::read) {
                    Ok(row) => Ok(row.into_entry()),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a record exists for the URL. Does not look at the filesystem.
    pub async fn contains_entry(&self, url: &str) -> Result<bool, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM cache_entries WHERE url = ?1)", params![url], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace the record for `entry.url`.
    pub async fn upsert_entry(&self, entry: &CacheEntry) -> Result<(), Error> {
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                upsert_with(conn, &entry)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace many records in one transaction.
    pub async fn upsert_entries(&self, entries: Vec<CacheEntry>) -> Result<(), Error> {
        if entries.is_empty() {
            return Ok(());
        }
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for entry in &entries {
                    upsert_with(&tx, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Record an access. Returns false if the URL is not tracked.
    pub async fn touch_entry(&self, url: &str, at: DateTime<Utc>) -> Result<bool, Error> {
        let url = url.to_string();
        let at = at.timestamp_millis();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let updated =
                    conn.execute("UPDATE cache_entries SET last_accessed = ?2 WHERE url = ?1", params![url, at])?;
                Ok(updated > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Raise the stored priority to `priority` if it is currently lower.
    ///
    /// Timestamps and size are left alone. Returns true if the row changed.
    pub async fn raise_priority(&self, url: &str, priority: Priority) -> Result<bool, Error> {
        let url = url.to_string();
        let priority = priority.as_i64();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let updated = conn.execute(
                    "UPDATE cache_entries SET priority = ?2 WHERE url = ?1 AND priority < ?2",
                    params![url, priority],
                )?;
                Ok(updated > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// All entries, in storage (insertion) order.
    pub async fn list_entries(&self) -> Result<Vec<CacheEntry>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<CacheEntry>, Error> {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid ASC"))?;
                let rows = stmt.query_map([], EntryRow::read)?;

                let mut entries = Vec::new();
                for row in rows {
                    if let Some(entry) = row?.into_entry() {
                        entries.push(entry);
                    }
                }
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of tracked URLs.
    pub async fn count_entries(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Apply the outcome of an eviction pass atomically.
    ///
    /// Deletes the `removed` URLs and stores freshly measured sizes for the
    /// survivors. Returns the number of deleted rows.
    pub async fn commit_eviction(&self, removed: Vec<String>, measured: Vec<(String, u64)>) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut deleted = 0u64;
                {
                    let mut delete = tx.prepare("DELETE FROM cache_entries WHERE url = ?1")?;
                    for url in &removed {
                        deleted += delete.execute(params![url])? as u64;
                    }

                    let mut resize = tx.prepare("UPDATE cache_entries SET size = ?2 WHERE url = ?1")?;
                    for (url, size) in &measured {
                        resize.execute(params![url, i64::try_from(*size).unwrap_or(i64::MAX)])?;
                    }
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop every record. Returns the number of deleted rows.
    pub async fn clear_entries(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
