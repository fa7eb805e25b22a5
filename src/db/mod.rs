// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Durable summary cache keyed by file path and validated by content fingerprint

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::{Result, WizardError};

/// One cached summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: String,
    pub content_fingerprint: String,
    pub summary: Option<String>,
}

/// SQLite-backed summary cache (thread-safe wrapper).
///
/// Every statement goes through one connection behind a mutex, so writes are
/// serialized and a read never sees a half-applied write.
#[derive(Clone)]
pub struct SummaryCache {
    conn: Arc<Mutex<Connection>>,
}

impl SummaryCache {
    /// Open or create the cache database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        cache.initialize()?;
        Ok(cache)
    }

    /// Open an in-memory cache (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        cache.initialize()?;
        Ok(cache)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| WizardError::CacheWrite("cache lock poisoned".to_string()))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files_summary (
                file_path TEXT PRIMARY KEY,
                file_hash TEXT NOT NULL,
                summary TEXT
            );
        "#,
        )?;
        Ok(())
    }

    /// Cached summary for `path`, only if it was computed from content with `fingerprint`
    pub fn lookup(&self, path: &str, fingerprint: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let summary: Option<Option<String>> = conn
            .query_row(
                "SELECT summary FROM files_summary WHERE file_path = ?1 AND file_hash = ?2",
                params![path, fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(summary.flatten())
    }

    /// Full row for `path` regardless of freshness
    pub fn get(&self, path: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT file_path, file_hash, summary FROM files_summary WHERE file_path = ?1",
            params![path],
            |row| {
                Ok(CacheEntry {
                    path: row.get(0)?,
                    content_fingerprint: row.get(1)?,
                    summary: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// Insert the row for `path` or replace its fingerprint and summary
    pub fn upsert(&self, path: &str, fingerprint: &str, summary: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"INSERT INTO files_summary (file_path, file_hash, summary) VALUES (?1, ?2, ?3)
               ON CONFLICT(file_path) DO UPDATE SET file_hash = excluded.file_hash, summary = excluded.summary"#,
            params![path, fingerprint, summary],
        )
        .map_err(cache_write)?;
        debug!("Cached summary for {}", path);
        Ok(())
    }

    /// Move the row for `old_path` to `new_path`.
    ///
    /// Returns whether a row was moved; a missing source row is left alone.
    pub fn rename(&self, old_path: &str, new_path: &str, new_fingerprint: &str) -> Result<bool> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction().map_err(cache_write)?;

        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM files_summary WHERE file_path = ?1)",
                params![old_path],
                |row| row.get(0),
            )
            .map_err(cache_write)?;
        if !exists {
            return Ok(false);
        }

        if old_path != new_path {
            tx.execute("DELETE FROM files_summary WHERE file_path = ?1", params![new_path])
                .map_err(cache_write)?;
        }
        tx.execute(
            "UPDATE files_summary SET file_path = ?1, file_hash = ?2 WHERE file_path = ?3",
            params![new_path, new_fingerprint, old_path],
        )
        .map_err(cache_write)?;
        tx.commit().map_err(cache_write)?;

        debug!("Re-keyed cache row {} -> {}", old_path, new_path);
        Ok(true)
    }

    /// Delete every row whose path is not in `existing_paths`, returning the removed paths
    pub fn prune(&self, existing_paths: &HashSet<String>) -> Result<Vec<String>> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction().map_err(cache_write)?;

        let stale: Vec<String> = {
            let mut stmt = tx.prepare("SELECT file_path FROM files_summary").map_err(cache_write)?;
            let paths = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(cache_write)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(cache_write)?;
            paths.into_iter().filter(|p| !existing_paths.contains(p)).collect()
        };

        {
            let mut delete = tx
                .prepare("DELETE FROM files_summary WHERE file_path = ?1")
                .map_err(cache_write)?;
            for path in &stale {
                delete.execute(params![path]).map_err(cache_write)?;
            }
        }
        tx.commit().map_err(cache_write)?;

        Ok(stale)
    }

    /// Delete rows for `candidates` whose file is still missing, returning the removed paths.
    ///
    /// Disk is re-checked while the connection is held, so a row written after
    /// the candidate list was taken, or for a file that came back, survives.
    pub fn remove_missing(&self, candidates: &[String]) -> Result<Vec<String>> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction().map_err(cache_write)?;

        let mut removed = Vec::new();
        {
            let mut delete = tx
                .prepare("DELETE FROM files_summary WHERE file_path = ?1")
                .map_err(cache_write)?;
            for path in candidates {
                if Path::new(path).is_file() {
                    continue;
                }
                if delete.execute(params![path]).map_err(cache_write)? > 0 {
                    removed.push(path.clone());
                }
            }
        }
        tx.commit().map_err(cache_write)?;

        Ok(removed)
    }

    /// Every cached path
    pub fn all_paths(&self) -> Result<HashSet<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT file_path FROM files_summary")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(paths)
    }

    /// Number of cached rows
    pub fn len(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files_summary", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Vacuum database
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("VACUUM", [])?;
        Ok(())
    }
}

fn cache_write(e: rusqlite::Error) -> WizardError {
    WizardError::CacheWrite(e.to_string())
}
