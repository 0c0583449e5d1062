//! Artwork metadata rows. The image bytes live on disk; these rows record
//! where, and when each file was last validated.

use rusqlite::params;

use crate::error::StoreError;
use crate::store::{ArtworkEntry, Store};

impl Store {
    /// Record a downloaded artwork file, replacing any prior row for the
    /// same game.
    pub fn mark_artwork_cached(&self, entry: &ArtworkEntry) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO artwork_metadata
                 (platform_fs_slug, game_id, file_path, file_size_bytes, cached_at, validated_at)
                 VALUES (?1, ?2, ?3, ?4, datetime('now'), datetime('now'))",
                params![
                    entry.platform_fs_slug,
                    entry.game_id,
                    entry.file_path,
                    entry.file_size_bytes,
                ],
            )
            .map_err(|e| {
                StoreError::op("save", "artwork", entry.game_id.to_string(), e)
            })?;
            Ok(())
        })
    }

    /// Drop the metadata row for a game's artwork. The caller owns removing
    /// the file itself.
    pub fn remove_artwork(&self, platform_fs_slug: &str, game_id: i64) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM artwork_metadata WHERE platform_fs_slug = ?1 AND game_id = ?2",
                params![platform_fs_slug, game_id],
            )
            .map_err(|e| StoreError::op("delete", "artwork", game_id.to_string(), e))?;
            Ok(())
        })
    }

    /// Whether a metadata row exists for a game's artwork.
    pub fn is_artwork_cached(
        &self,
        platform_fs_slug: &str,
        game_id: i64,
    ) -> Result<bool, StoreError> {
        let result = self.with_conn(|conn| {
            conn.query_row(
                "SELECT 1 FROM artwork_metadata WHERE platform_fs_slug = ?1 AND game_id = ?2",
                params![platform_fs_slug, game_id],
                |_| Ok(()),
            )
            .map(|()| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                e => Err(StoreError::op("get", "artwork", game_id.to_string(), e)),
            })
        });

        match &result {
            Ok(true) => self.stats.hit(),
            Ok(false) => self.stats.miss(),
            Err(_) => self.stats.error(),
        }
        result
    }

    /// All artwork rows, optionally scoped to one platform.
    pub fn artwork_entries(
        &self,
        platform_fs_slug: Option<&str>,
    ) -> Result<Vec<ArtworkEntry>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT platform_fs_slug, game_id, file_path, file_size_bytes
                     FROM artwork_metadata
                     WHERE ?1 IS NULL OR platform_fs_slug = ?1
                     ORDER BY platform_fs_slug, game_id",
                )
                .map_err(|e| StoreError::op("get", "artwork", "", e))?;
            let rows = stmt
                .query_map([platform_fs_slug], |row| {
                    Ok(ArtworkEntry {
                        platform_fs_slug: row.get(0)?,
                        game_id: row.get(1)?,
                        file_path: row.get(2)?,
                        file_size_bytes: row.get(3)?,
                    })
                })
                .map_err(|e| StoreError::op("get", "artwork", "", e))?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(row.map_err(|e| StoreError::op("get", "artwork", "", e))?);
            }
            Ok(entries)
        })
    }

    /// Number of artwork rows across all platforms.
    pub fn artwork_count(&self) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM artwork_metadata", [], |row| {
                row.get(0)
            })
            .map_err(|e| StoreError::op("count", "artwork", "", e))
        })
    }

    /// Whether any artwork is recorded for a platform.
    pub fn has_platform_artwork(&self, platform_fs_slug: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM artwork_metadata WHERE platform_fs_slug = ?1",
                [platform_fs_slug],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .map_err(|e| StoreError::op("count", "artwork", platform_fs_slug, e))
        })
    }

    /// Stamp a validation pass over a game's artwork row.
    pub fn touch_artwork_validated(
        &self,
        platform_fs_slug: &str,
        game_id: i64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE artwork_metadata SET validated_at = datetime('now')
                 WHERE platform_fs_slug = ?1 AND game_id = ?2",
                params![platform_fs_slug, game_id],
            )
            .map_err(|e| StoreError::op("save", "artwork", game_id.to_string(), e))?;
            Ok(())
        })
    }
}
