//! Platform rows and firmware availability flags.

use chrono::{DateTime, Utc};
use rusqlite::params;

use romstash_remote::Platform;

use crate::error::StoreError;
use crate::store::Store;

impl Store {
    /// Retrieve all cached platforms, ordered by name.
    pub fn platforms(&self) -> Result<Vec<Platform>, StoreError> {
        let platforms = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT data_json FROM platforms ORDER BY name")
                .map_err(|e| StoreError::op("get", "platforms", "", e))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| StoreError::op("get", "platforms", "", e))?;

            let mut platforms = Vec::new();
            for row in rows {
                let json = row.map_err(|e| StoreError::op("get", "platforms", "", e))?;
                platforms.push(
                    serde_json::from_str(&json)
                        .map_err(|e| StoreError::op("get", "platforms", "", e))?,
                );
            }
            Ok(platforms)
        });

        match &platforms {
            Ok(p) if p.is_empty() => self.stats.miss(),
            Ok(_) => self.stats.hit(),
            Err(_) => self.stats.error(),
        }
        platforms
    }

    /// Retrieve a single platform by id, `None` when not cached.
    pub fn platform_by_id(&self, platform_id: i64) -> Result<Option<Platform>, StoreError> {
        let result = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT data_json FROM platforms WHERE id = ?1",
                    [platform_id],
                    |row| row.get::<_, String>(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    e => Err(StoreError::op(
                        "get",
                        "platforms",
                        platform_id.to_string(),
                        e,
                    )),
                })?;
            match row {
                Some(json) => Ok(Some(serde_json::from_str(&json).map_err(|e| {
                    StoreError::op("get", "platforms", platform_id.to_string(), e)
                })?)),
                None => Ok(None),
            }
        });

        match &result {
            Ok(Some(_)) => self.stats.hit(),
            Ok(None) => self.stats.miss(),
            Err(_) => self.stats.error(),
        }
        result
    }

    /// Upsert all platform rows in one transaction.
    pub fn save_platforms(&self, platforms: &[Platform]) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::op("save", "platforms", "", e))?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT OR REPLACE INTO platforms
                         (id, slug, fs_slug, name, custom_name, rom_count, has_bios, data_json, updated_at, cached_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))",
                    )
                    .map_err(|e| StoreError::op("save", "platforms", "", e))?;

                for platform in platforms {
                    let json = serde_json::to_string(platform)
                        .map_err(|e| StoreError::op("save", "platforms", &platform.slug, e))?;
                    stmt.execute(params![
                        platform.id,
                        platform.slug,
                        platform.fs_slug,
                        platform.name,
                        platform.custom_name,
                        platform.rom_count,
                        platform.has_bios as i64,
                        json,
                        platform.updated_at.map(|t| t.to_rfc3339()),
                    ])
                    .map_err(|e| StoreError::op("save", "platforms", &platform.slug, e))?;
                }
            }
            tx.commit()
                .map_err(|e| StoreError::op("save", "platforms", "", e))
        })?;

        log::debug!("Saved {} platforms to cache", platforms.len());
        Ok(())
    }

    /// Last known firmware availability for a platform, with its check time.
    /// `None` when never checked.
    pub fn bios_availability(
        &self,
        platform_id: i64,
    ) -> Result<Option<(bool, Option<DateTime<Utc>>)>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT has_bios, checked_at FROM bios_availability WHERE platform_id = ?1",
                [platform_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? == 1,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .map(|(has_bios, checked_at)| {
                let checked_at = checked_at
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|t| t.with_timezone(&Utc));
                Some((has_bios, checked_at))
            })
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(StoreError::op("get", "bios", platform_id.to_string(), e)),
            })
        })
    }

    /// Record firmware availability for a platform; last write wins.
    pub fn set_bios_availability(
        &self,
        platform_id: i64,
        has_bios: bool,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO bios_availability (platform_id, has_bios, checked_at)
                 VALUES (?1, ?2, ?3)",
                params![platform_id, has_bios as i64, Utc::now().to_rfc3339()],
            )
            .map_err(|e| StoreError::op("save", "bios", platform_id.to_string(), e))?;
            Ok(())
        })
    }
}
