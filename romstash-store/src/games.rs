//! Game rows, per-platform replacement, and the filename lookup index.

use rusqlite::params;

use romstash_remote::Game;

use crate::error::StoreError;
use crate::store::Store;

/// Strip the final extension from a filename for index keys.
fn filename_key(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    }
}

fn read_games(
    stmt: &mut rusqlite::Statement<'_>,
    params: impl rusqlite::Params,
    op_key: &str,
) -> Result<Vec<Game>, StoreError> {
    let rows = stmt
        .query_map(params, |row| row.get::<_, String>(0))
        .map_err(|e| StoreError::op("get", "games", op_key, e))?;

    let mut games = Vec::new();
    for row in rows {
        let json = row.map_err(|e| StoreError::op("get", "games", op_key, e))?;
        games.push(
            serde_json::from_str(&json).map_err(|e| StoreError::op("get", "games", op_key, e))?,
        );
    }
    Ok(games)
}

impl Store {
    /// Replace a platform's games in one transaction: readers never observe
    /// a half-replaced set. The filename index is rebuilt alongside.
    pub fn save_platform_games(
        &self,
        platform_id: i64,
        games: &[Game],
    ) -> Result<(), StoreError> {
        let key = platform_id.to_string();
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::op("save", "games", &key, e))?;

            tx.execute(
                "DELETE FROM filename_index WHERE game_id IN
                     (SELECT id FROM games WHERE platform_id = ?1)",
                [platform_id],
            )
            .map_err(|e| StoreError::op("save", "filename_index", &key, e))?;
            tx.execute("DELETE FROM games WHERE platform_id = ?1", [platform_id])
                .map_err(|e| StoreError::op("save", "games", &key, e))?;

            {
                let mut insert_game = tx
                    .prepare(
                        "INSERT INTO games
                         (id, platform_id, platform_fs_slug, name, fs_name, data_json, updated_at, cached_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))",
                    )
                    .map_err(|e| StoreError::op("save", "games", &key, e))?;
                let mut insert_index = tx
                    .prepare(
                        "INSERT OR REPLACE INTO filename_index
                         (platform_fs_slug, filename_key, game_id, game_name)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(|e| StoreError::op("save", "filename_index", &key, e))?;

                for game in games {
                    let json = serde_json::to_string(game)
                        .map_err(|e| StoreError::op("save", "games", &key, e))?;
                    insert_game
                        .execute(params![
                            game.id,
                            game.platform_id,
                            game.platform_fs_slug,
                            game.name,
                            game.fs_name,
                            json,
                            game.updated_at.map(|t| t.to_rfc3339()),
                        ])
                        .map_err(|e| StoreError::op("save", "games", &key, e))?;

                    if !game.fs_name.is_empty() {
                        insert_index
                            .execute(params![
                                game.platform_fs_slug,
                                game.fs_name_no_ext(),
                                game.id,
                                game.name,
                            ])
                            .map_err(|e| StoreError::op("save", "filename_index", &key, e))?;
                    }
                }
            }
            tx.commit()
                .map_err(|e| StoreError::op("save", "games", &key, e))
        })?;

        log::debug!("Saved {} games for platform {platform_id}", games.len());
        Ok(())
    }

    /// Upsert individual game rows without disturbing the rest of their
    /// platforms. Used by collection-scoped refreshes, where the fetched
    /// games span platforms.
    pub fn upsert_games(&self, games: &[Game]) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::op("save", "games", "batch", e))?;
            {
                let mut upsert_game = tx
                    .prepare(
                        "INSERT OR REPLACE INTO games
                         (id, platform_id, platform_fs_slug, name, fs_name, data_json, updated_at, cached_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))",
                    )
                    .map_err(|e| StoreError::op("save", "games", "batch", e))?;
                let mut upsert_index = tx
                    .prepare(
                        "INSERT OR REPLACE INTO filename_index
                         (platform_fs_slug, filename_key, game_id, game_name)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(|e| StoreError::op("save", "filename_index", "batch", e))?;

                for game in games {
                    let json = serde_json::to_string(game)
                        .map_err(|e| StoreError::op("save", "games", "batch", e))?;
                    upsert_game
                        .execute(params![
                            game.id,
                            game.platform_id,
                            game.platform_fs_slug,
                            game.name,
                            game.fs_name,
                            json,
                            game.updated_at.map(|t| t.to_rfc3339()),
                        ])
                        .map_err(|e| StoreError::op("save", "games", "batch", e))?;
                    if !game.fs_name.is_empty() {
                        upsert_index
                            .execute(params![
                                game.platform_fs_slug,
                                game.fs_name_no_ext(),
                                game.id,
                                game.name,
                            ])
                            .map_err(|e| {
                                StoreError::op("save", "filename_index", "batch", e)
                            })?;
                    }
                }
            }
            tx.commit()
                .map_err(|e| StoreError::op("save", "games", "batch", e))
        })
    }

    /// All games for a platform, ordered by name.
    pub fn platform_games(&self, platform_id: i64) -> Result<Vec<Game>, StoreError> {
        let key = platform_id.to_string();
        let result = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT data_json FROM games WHERE platform_id = ?1 ORDER BY name")
                .map_err(|e| StoreError::op("get", "games", &key, e))?;
            read_games(&mut stmt, [platform_id], &key)
        });

        match &result {
            Ok(games) if games.is_empty() => self.stats.miss(),
            Ok(_) => self.stats.hit(),
            Err(_) => self.stats.error(),
        }
        result
    }

    /// A single game by id, `None` when not cached.
    pub fn game_by_id(&self, game_id: i64) -> Result<Option<Game>, StoreError> {
        let key = game_id.to_string();
        let result = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT data_json FROM games WHERE id = ?1",
                    [game_id],
                    |row| row.get::<_, String>(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    e => Err(StoreError::op("get", "games", &key, e)),
                })?;
            match row {
                Some(json) => Ok(Some(
                    serde_json::from_str(&json)
                        .map_err(|e| StoreError::op("get", "games", &key, e))?,
                )),
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

    /// Multiple games by id, ordered by name. Unknown ids are silently
    /// absent from the result.
    pub fn games_by_ids(&self, game_ids: &[i64]) -> Result<Vec<Game>, StoreError> {
        if game_ids.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.with_conn(|conn| {
            let placeholders = vec!["?"; game_ids.len()].join(",");
            let sql = format!(
                "SELECT data_json FROM games WHERE id IN ({placeholders}) ORDER BY name"
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| StoreError::op("get", "games", "batch", e))?;
            read_games(
                &mut stmt,
                rusqlite::params_from_iter(game_ids.iter()),
                "batch",
            )
        });

        match &result {
            Ok(games) if games.is_empty() => self.stats.miss(),
            Ok(_) => self.stats.hit(),
            Err(_) => self.stats.error(),
        }
        result
    }

    pub fn has_platform_games(&self, platform_id: i64) -> Result<bool, StoreError> {
        self.platform_game_count(platform_id).map(|n| n > 0)
    }

    /// Cached row count for a platform; the freshness probe compares this
    /// against the remote declared total.
    pub fn platform_game_count(&self, platform_id: i64) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM games WHERE platform_id = ?1",
                [platform_id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::op("count", "games", platform_id.to_string(), e))
        })
    }

    /// Resolve a local filename to its catalog identity without a table
    /// scan. The lookup key is the extension-stripped filename.
    pub fn game_id_by_filename(
        &self,
        fs_slug: &str,
        filename: &str,
    ) -> Result<Option<(i64, String)>, StoreError> {
        let key = filename_key(filename);
        let result = self.with_conn(|conn| {
            conn.query_row(
                "SELECT game_id, game_name FROM filename_index
                 WHERE platform_fs_slug = ?1 AND filename_key = ?2",
                params![fs_slug, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(StoreError::op("get", "filename_index", key, e)),
            })
        });

        match &result {
            Ok(Some(_)) => self.stats.hit(),
            Ok(None) => self.stats.miss(),
            Err(_) => self.stats.error(),
        }
        result
    }

    /// Point insert into the filename index, used when a scan resolves a
    /// file out-of-band.
    pub fn index_filename(
        &self,
        fs_slug: &str,
        filename: &str,
        game_id: i64,
        game_name: &str,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO filename_index
                 (platform_fs_slug, filename_key, game_id, game_name)
                 VALUES (?1, ?2, ?3, ?4)",
                params![fs_slug, filename_key(filename), game_id, game_name],
            )
            .map_err(|e| StoreError::op("save", "filename_index", filename, e))?;
            Ok(())
        })
    }
}
