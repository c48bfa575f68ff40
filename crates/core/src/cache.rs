//! SQLite-backed git cache store.
//!
//! Backs the [`CacheManager`] collaborator with the `git_caches` table:
//! expensive git command output keyed by repository and command line. The
//! reconciler touches it two ways — a threshold purge when the cache max-age
//! setting changes, and a wholesale truncate on an explicit flush request.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::errors::CacheError;
use crate::resync::CacheManager;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS git_caches (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_identifier TEXT NOT NULL,
    command         TEXT NOT NULL,
    command_output  TEXT,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_git_caches_repo
    ON git_caches (repo_identifier, command);
";

/// Git command cache over a SQLite database.
pub struct GitCacheStore {
    conn: Mutex<Connection>,
}

impl GitCacheStore {
    /// Open (or create) the cache database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening git cache database");

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Store one command output for a repository, replacing any previous
    /// entry for the same (repository, command) pair.
    pub fn store(
        &self,
        repo_identifier: &str,
        command: &str,
        output: &str,
    ) -> Result<(), CacheError> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM git_caches WHERE repo_identifier = ?1 AND command = ?2",
            params![repo_identifier, command],
        )?;
        conn.execute(
            "INSERT INTO git_caches (repo_identifier, command, command_output, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![repo_identifier, command, output, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Look up a cached command output, ignoring entry age.
    pub fn lookup(&self, repo_identifier: &str, command: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn();
        let output = conn
            .query_row(
                "SELECT command_output FROM git_caches
                 WHERE repo_identifier = ?1 AND command = ?2",
                params![repo_identifier, command],
                |row| row.get(0),
            )
            .optional()?;
        Ok(output)
    }

    /// Number of cached entries.
    pub fn len(&self) -> Result<usize, CacheError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM git_caches", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

impl CacheManager for GitCacheStore {
    fn purge_stale(&self, max_age: Duration) -> Result<usize, CacheError> {
        let cutoff: DateTime<Utc> = Utc::now()
            - chrono::Duration::from_std(max_age)
                .map_err(|e| CacheError::Corrupt(format!("max age out of range: {e}")))?;

        let conn = self.conn();
        let purged = conn.execute(
            "DELETE FROM git_caches WHERE created_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        debug!(purged, "purged stale git cache entries");
        Ok(purged)
    }

    fn truncate_all(&self) -> Result<(), CacheError> {
        let conn = self.conn();
        let removed = conn.execute("DELETE FROM git_caches", [])?;
        info!(removed, "truncated git cache");
        Ok(())
    }
}
