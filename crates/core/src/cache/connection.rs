//! Metadata database connection management.
//!
//! Opens the SQLite file, applies the pragmas the cache relies on (WAL,
//! relaxed sync) and runs migrations. A store that cannot be opened is
//! discarded and recreated empty: losing cache metadata only costs refetches.

use super::migrations;
use crate::Error;
use std::path::{Path, PathBuf};
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

/// Metadata store handle.
///
/// Wraps a tokio-rusqlite Connection; every call runs on the connection's
/// background thread, so metadata mutations are serialized.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open a database at the specified path, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Store(e.into()))?;
        Self::prepare(conn).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Store(e.into()))?;
        Self::prepare(conn).await
    }

    /// Open the database, or wipe and recreate it if the existing file is unusable.
    ///
    /// Only the second attempt's error is returned.
    pub async fn open_or_reset(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        match Self::open(path).await {
            Ok(db) => Ok(db),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "metadata store unreadable, starting empty");
                for file in store_files(path) {
                    match tokio::fs::remove_file(&file).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Self::open(path).await
            }
        }
    }

    async fn prepare(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(Error::Store)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }
}

/// The database file plus the WAL sidecars SQLite may leave next to it.
fn store_files(path: &Path) -> [PathBuf; 3] {
    let sidecar = |suffix: &str| {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), sidecar("-wal"), sidecar("-shm")]
}
