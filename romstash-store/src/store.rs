//! The `Store` handle: one owned SQLite connection behind a mutex.

use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::StoreError;
use crate::schema;

/// Lightweight hit/miss/error counters for observability.
#[derive(Debug, Default)]
pub(crate) struct StoreStats {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    last_access: AtomicI64,
}

impl StoreStats {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn touch(&self) {
        self.last_access
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }
}

/// Snapshot of the store's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub last_access: Option<DateTime<Utc>>,
}

/// One artwork metadata row.
#[derive(Debug, Clone)]
pub struct ArtworkEntry {
    pub platform_fs_slug: String,
    pub game_id: i64,
    pub file_path: String,
    pub file_size_bytes: i64,
}

/// Durable, queryable persistence with single-writer discipline.
///
/// SQLite is single-writer, so the store owns exactly one connection and
/// serializes every call through its mutex. Store calls are fast and
/// in-process; they never block on network I/O.
pub struct Store {
    conn: Mutex<Option<Connection>>,
    pub(crate) stats: StoreStats,
}

impl Store {
    /// Open or create the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::op("init", "store", path.display().to_string(), e))?;
        }
        let conn = schema::open_database(path)?;
        log::info!("Cache store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            stats: StoreStats::default(),
        })
    }

    /// Open an in-memory store with the full schema. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Mutex::new(Some(schema::open_memory()?)),
            stats: StoreStats::default(),
        })
    }

    /// Tear down the connection. Subsequent calls fail with
    /// [`StoreError::Closed`].
    pub fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            *guard = None;
        }
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Closed)
    }

    /// Run `f` with the open connection.
    pub(crate) fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }

    /// Run `f` with mutable access (needed to start a transaction).
    pub(crate) fn with_conn_mut<R>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut guard = self.lock()?;
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        f(conn)
    }

    /// True when no games are cached (the cache needs population).
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(!self.has_games()?)
    }

    pub fn has_games(&self) -> Result<bool, StoreError> {
        self.count_rows("games").map(|n| n > 0)
    }

    pub fn has_collections(&self) -> Result<bool, StoreError> {
        self.count_rows("collections").map(|n| n > 0)
    }

    pub fn platform_count(&self) -> Result<i64, StoreError> {
        self.count_rows("platforms")
    }

    pub fn game_count(&self) -> Result<i64, StoreError> {
        self.count_rows("games")
    }

    pub fn collection_count(&self) -> Result<i64, StoreError> {
        self.count_rows("collections")
    }

    fn count_rows(&self, table: &'static str) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .map_err(|e| StoreError::op("count", table, "", e))
        })
    }

    /// Remove all cached data but keep the database structure.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        self.clear_tables(
            "clear",
            &[
                "games",
                "game_collections",
                "collections",
                "platforms",
                "filename_index",
                "artwork_metadata",
                "bios_availability",
            ],
        )?;
        log::info!("Cache cleared");
        Ok(())
    }

    /// Remove games, their collection mappings, and their filename index.
    pub fn clear_games(&self) -> Result<(), StoreError> {
        self.clear_tables(
            "clear_games",
            &["game_collections", "filename_index", "games"],
        )
    }

    /// Remove collections and their game mappings.
    pub fn clear_collections(&self) -> Result<(), StoreError> {
        self.clear_tables("clear_collections", &["game_collections", "collections"])
    }

    /// Remove artwork metadata. The caller owns removing files from disk.
    pub fn clear_artwork(&self) -> Result<(), StoreError> {
        self.clear_tables("clear_artwork", &["artwork_metadata"])
    }

    /// Remove the filename lookup index.
    pub fn clear_filename_index(&self) -> Result<(), StoreError> {
        self.clear_tables("clear_filename_index", &["filename_index"])
    }

    fn clear_tables(&self, op: &'static str, tables: &[&'static str]) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::op(op, "store", "", e))?;
            for table in tables {
                tx.execute(&format!("DELETE FROM {table}"), [])
                    .map_err(|e| StoreError::op(op, table, "", e))?;
            }
            tx.commit().map_err(|e| StoreError::op(op, "store", "", e))
        })
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        let last = self.stats.last_access.load(Ordering::Relaxed);
        StatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            last_access: (last != 0)
                .then(|| DateTime::<Utc>::from_timestamp(last, 0))
                .flatten(),
        }
    }
}
