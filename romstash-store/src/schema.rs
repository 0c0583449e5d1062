//! SQLite schema creation.

use rusqlite::Connection;

use crate::error::StoreError;

/// Current schema version, stamped into `cache_metadata`.
pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables and indexes if they don't exist.
///
/// This is idempotent — safe to call on an existing database.
pub fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR REPLACE INTO cache_metadata (key, value, updated_at)
         VALUES ('schema_version', ?1, datetime('now'))",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

/// Open or create a cache database at the given path.
pub fn open_database(path: &std::path::Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
    )?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Open an in-memory database with the full schema. Useful for testing.
pub fn open_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

const SCHEMA_SQL: &str = r#"
-- Generic key/value cache facts: schema version, per-domain refresh stamps
CREATE TABLE IF NOT EXISTS cache_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached platform rows; data_json preserves the full remote payload
CREATE TABLE IF NOT EXISTS platforms (
    id INTEGER PRIMARY KEY,
    slug TEXT NOT NULL,
    fs_slug TEXT NOT NULL,
    name TEXT NOT NULL,
    custom_name TEXT NOT NULL DEFAULT '',
    rom_count INTEGER NOT NULL DEFAULT 0,
    has_bios INTEGER NOT NULL DEFAULT 0,
    data_json TEXT NOT NULL,
    updated_at TEXT,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_platforms_fs_slug ON platforms(fs_slug);

-- Cached games; replaced wholesale per platform
CREATE TABLE IF NOT EXISTS games (
    id INTEGER PRIMARY KEY,
    platform_id INTEGER NOT NULL,
    platform_fs_slug TEXT NOT NULL,
    name TEXT NOT NULL,
    fs_name TEXT NOT NULL DEFAULT '',
    data_json TEXT NOT NULL,
    updated_at TEXT,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_games_platform_id ON games(platform_id);
CREATE INDEX IF NOT EXISTS idx_games_platform_fs_slug ON games(platform_fs_slug);

-- Collections across all three identity schemes
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id INTEGER,
    virtual_id TEXT,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    rom_count INTEGER NOT NULL DEFAULT 0,
    data_json TEXT NOT NULL,
    updated_at TEXT,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(remote_id, kind),
    UNIQUE(virtual_id)
);
CREATE INDEX IF NOT EXISTS idx_collections_kind ON collections(kind);

-- Game <-> collection membership
CREATE TABLE IF NOT EXISTS game_collections (
    game_id INTEGER NOT NULL,
    collection_id INTEGER NOT NULL,
    PRIMARY KEY (game_id, collection_id)
);

-- Filename -> game id lookup, keyed by extension-stripped name
CREATE TABLE IF NOT EXISTS filename_index (
    platform_fs_slug TEXT NOT NULL,
    filename_key TEXT NOT NULL,
    game_id INTEGER NOT NULL,
    game_name TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(platform_fs_slug, filename_key)
);

-- Tracks artwork files on disk
CREATE TABLE IF NOT EXISTS artwork_metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform_fs_slug TEXT NOT NULL,
    game_id INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    file_size_bytes INTEGER NOT NULL DEFAULT 0,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    validated_at TEXT,
    UNIQUE(platform_fs_slug, game_id)
);

-- Firmware availability per platform, last-write-wins
CREATE TABLE IF NOT EXISTS bios_availability (
    platform_id INTEGER PRIMARY KEY,
    has_bios INTEGER NOT NULL DEFAULT 0,
    checked_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
