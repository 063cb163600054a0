//! Metadata schema migrations.
//!
//! Applied versions are recorded in `_migrations`; on open every migration
//! newer than the recorded maximum is applied inside one transaction.

use super::Error;
use tokio_rusqlite::{Connection, params, rusqlite};

/// A single schema step.
#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered schema history. Versions must be strictly increasing.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "cache_entries",
    sql: include_str!("../../migrations/001_cache_entries.sql"),
}];

/// Highest schema version this build knows about.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Bring the schema up to [`latest_version`].
///
/// # Errors
///
/// Returns `Error::Schema` if the database already carries a newer
/// schema than this build, or the underlying SQL error if a step fails.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current = current_version(conn)?;
        if current > latest_version() {
            return Err(Error::Schema(format!(
                "metadata schema version {current} is newer than supported version {}",
                latest_version()
            )));
        }

        let tx = conn.transaction()?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            tx.execute_batch(migration.sql)
                .map_err(|e| Error::Schema(format!("{} (v{}): {e}", migration.name, migration.version)))?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, chrono::Utc::now().to_rfc3339()],
            )?;
            tracing::debug!(version = migration.version, name = migration.name, "applied metadata migration");
        }
        tx.commit()?;

        Ok(())
    })
    .await
    .map_err(Error::from)
}

fn current_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;
    Ok(version)
}
