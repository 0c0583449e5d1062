//! Key/value metadata: refresh stamps and other cache-wide facts.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::error::StoreError;
use crate::store::Store;

/// Stamp key for the last successful full games refresh.
pub const META_GAMES_REFRESHED_AT: &str = "games_refreshed_at";
/// Stamp key for the last successful collections refresh.
pub const META_COLLECTIONS_REFRESHED_AT: &str = "collections_refreshed_at";
/// Stamp key for the last artwork download pass.
pub const META_ARTWORK_REFRESHED_AT: &str = "artwork_refreshed_at";

impl Store {
    /// Set a metadata value, overwriting any prior value for the key.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache_metadata (key, value, updated_at)
                 VALUES (?1, ?2, datetime('now'))",
                params![key, value],
            )
            .map_err(|e| StoreError::op("save", "metadata", key, e))?;
            Ok(())
        })
    }

    /// Look up a metadata value, `None` when the key was never set.
    pub fn meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM cache_metadata WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(StoreError::op("get", "metadata", key, e)),
            })
        })
    }

    /// Stamp a refresh key with the current time.
    pub fn record_refresh(&self, key: &str) -> Result<(), StoreError> {
        self.set_meta(key, &Utc::now().to_rfc3339())
    }

    /// When a refresh key was last stamped, `None` when never (or when the
    /// stored value does not parse).
    pub fn last_refresh(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.meta(key)?.and_then(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|t| t.with_timezone(&Utc))
                .ok()
        }))
    }

    /// All refresh stamps, in the fixed key order games, collections,
    /// artwork.
    pub fn all_refresh_times(
        &self,
    ) -> Result<Vec<(&'static str, Option<DateTime<Utc>>)>, StoreError> {
        let keys = [
            META_GAMES_REFRESHED_AT,
            META_COLLECTIONS_REFRESHED_AT,
            META_ARTWORK_REFRESHED_AT,
        ];
        let mut times = Vec::with_capacity(keys.len());
        for key in keys {
            times.push((key, self.last_refresh(key)?));
        }
        Ok(times)
    }
}
