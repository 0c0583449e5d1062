//! Collection rows and game/collection membership mappings.

use rusqlite::{Transaction, params};

use romstash_remote::{Collection, CollectionKind, Game};

use crate::error::StoreError;
use crate::store::Store;

/// Membership rows are inserted in chunks to stay well under SQLite's
/// bound-parameter limit.
const INSERT_CHUNK: usize = 400;

/// Resolve a collection's internal row id from its remote identity.
fn internal_id(tx: &Transaction<'_>, collection: &Collection) -> Result<Option<i64>, StoreError> {
    let row = match (&collection.virtual_id, collection.remote_id) {
        (Some(vid), _) => tx.query_row(
            "SELECT id FROM collections WHERE virtual_id = ?1",
            [vid],
            |row| row.get(0),
        ),
        (None, Some(rid)) => tx.query_row(
            "SELECT id FROM collections WHERE remote_id = ?1 AND kind = ?2",
            params![rid, collection.kind.as_str()],
            |row| row.get(0),
        ),
        (None, None) => return Ok(None),
    };
    row.map(Some).or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        e => Err(StoreError::op("get", "collections", &collection.name, e)),
    })
}

fn insert_mappings(
    tx: &Transaction<'_>,
    collection_id: i64,
    game_ids: &[i64],
) -> Result<(), StoreError> {
    for chunk in game_ids.chunks(INSERT_CHUNK) {
        // ?1 is the collection id; each row binds its own game id after it.
        let values = (0..chunk.len())
            .map(|i| format!("(?{}, ?1)", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO game_collections (game_id, collection_id) VALUES {values}"
        );
        let mut bound: Vec<i64> = Vec::with_capacity(chunk.len() + 1);
        bound.push(collection_id);
        bound.extend_from_slice(chunk);
        tx.execute(&sql, rusqlite::params_from_iter(bound))
            .map_err(|e| {
                StoreError::op("save", "game_collections", collection_id.to_string(), e)
            })?;
    }
    Ok(())
}

fn read_collections(
    stmt: &mut rusqlite::Statement<'_>,
    params: impl rusqlite::Params,
) -> Result<Vec<Collection>, StoreError> {
    let rows = stmt
        .query_map(params, |row| row.get::<_, String>(0))
        .map_err(|e| StoreError::op("get", "collections", "", e))?;

    let mut collections = Vec::new();
    for row in rows {
        let json = row.map_err(|e| StoreError::op("get", "collections", "", e))?;
        collections.push(
            serde_json::from_str(&json)
                .map_err(|e| StoreError::op("get", "collections", "", e))?,
        );
    }
    Ok(collections)
}

impl Store {
    /// Upsert collection rows of every kind in one transaction. Existing
    /// rows keep their internal ids through the unique constraints on
    /// `(remote_id, kind)` and `virtual_id`.
    pub fn save_collections(&self, collections: &[Collection]) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::op("save", "collections", "", e))?;
            {
                let mut update = tx
                    .prepare(
                        "UPDATE collections
                         SET name = ?1, rom_count = ?2, data_json = ?3, updated_at = ?4,
                             cached_at = datetime('now')
                         WHERE id = ?5",
                    )
                    .map_err(|e| StoreError::op("save", "collections", "", e))?;
                let mut insert = tx
                    .prepare(
                        "INSERT INTO collections
                         (remote_id, virtual_id, kind, name, rom_count, data_json, updated_at, cached_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))",
                    )
                    .map_err(|e| StoreError::op("save", "collections", "", e))?;

                for collection in collections {
                    let json = serde_json::to_string(collection)
                        .map_err(|e| StoreError::op("save", "collections", &collection.name, e))?;
                    let updated = collection.updated_at.map(|t| t.to_rfc3339());
                    match internal_id(&tx, collection)? {
                        Some(id) => {
                            update
                                .execute(params![
                                    collection.name,
                                    collection.rom_count,
                                    json,
                                    updated,
                                    id,
                                ])
                                .map_err(|e| {
                                    StoreError::op("save", "collections", &collection.name, e)
                                })?;
                        }
                        None => {
                            insert
                                .execute(params![
                                    collection.remote_id,
                                    collection.virtual_id,
                                    collection.kind.as_str(),
                                    collection.name,
                                    collection.rom_count,
                                    json,
                                    updated,
                                ])
                                .map_err(|e| {
                                    StoreError::op("save", "collections", &collection.name, e)
                                })?;
                        }
                    }
                }
            }
            tx.commit()
                .map_err(|e| StoreError::op("save", "collections", "", e))
        })?;

        log::debug!("Saved {} collections to cache", collections.len());
        Ok(())
    }

    /// All cached collections, ordered by name.
    pub fn collections(&self) -> Result<Vec<Collection>, StoreError> {
        let result = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT data_json FROM collections ORDER BY name")
                .map_err(|e| StoreError::op("get", "collections", "", e))?;
            read_collections(&mut stmt, [])
        });

        match &result {
            Ok(c) if c.is_empty() => self.stats.miss(),
            Ok(_) => self.stats.hit(),
            Err(_) => self.stats.error(),
        }
        result
    }

    /// Cached collections of a single kind, ordered by name.
    pub fn collections_by_kind(
        &self,
        kind: CollectionKind,
    ) -> Result<Vec<Collection>, StoreError> {
        let result = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT data_json FROM collections WHERE kind = ?1 ORDER BY name")
                .map_err(|e| StoreError::op("get", "collections", kind.as_str(), e))?;
            read_collections(&mut stmt, [kind.as_str()])
        });

        match &result {
            Ok(c) if c.is_empty() => self.stats.miss(),
            Ok(_) => self.stats.hit(),
            Err(_) => self.stats.error(),
        }
        result
    }

    /// A single remote-identified collection, `None` when not cached.
    pub fn collection_by_remote_id(
        &self,
        kind: CollectionKind,
        remote_id: i64,
    ) -> Result<Option<Collection>, StoreError> {
        self.collection_row(
            "SELECT data_json FROM collections WHERE remote_id = ?1 AND kind = ?2",
            params![remote_id, kind.as_str()],
            &remote_id.to_string(),
        )
    }

    /// A single virtual collection, `None` when not cached.
    pub fn collection_by_virtual_id(
        &self,
        virtual_id: &str,
    ) -> Result<Option<Collection>, StoreError> {
        self.collection_row(
            "SELECT data_json FROM collections WHERE virtual_id = ?1",
            params![virtual_id],
            virtual_id,
        )
    }

    fn collection_row(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        key: &str,
    ) -> Result<Option<Collection>, StoreError> {
        let result = self.with_conn(|conn| {
            let row = conn
                .query_row(sql, params, |row| row.get::<_, String>(0))
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    e => Err(StoreError::op("get", "collections", key, e)),
                })?;
            match row {
                Some(json) => Ok(Some(
                    serde_json::from_str(&json)
                        .map_err(|e| StoreError::op("get", "collections", key, e))?,
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

    /// Games belonging to a collection, ordered by name. Only games already
    /// cached appear; membership rows pointing at absent games are skipped.
    pub fn collection_games(&self, collection: &Collection) -> Result<Vec<Game>, StoreError> {
        let result = self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::op("get", "game_collections", &collection.name, e))?;
            let Some(id) = internal_id(&tx, collection)? else {
                return Ok(Vec::new());
            };
            let mut stmt = tx
                .prepare(
                    "SELECT g.data_json FROM games g
                     JOIN game_collections gc ON gc.game_id = g.id
                     WHERE gc.collection_id = ?1
                     ORDER BY g.name",
                )
                .map_err(|e| StoreError::op("get", "game_collections", &collection.name, e))?;
            let rows = stmt
                .query_map([id], |row| row.get::<_, String>(0))
                .map_err(|e| StoreError::op("get", "game_collections", &collection.name, e))?;

            let mut games = Vec::new();
            for row in rows {
                let json = row
                    .map_err(|e| StoreError::op("get", "game_collections", &collection.name, e))?;
                games.push(serde_json::from_str(&json).map_err(|e| {
                    StoreError::op("get", "game_collections", &collection.name, e)
                })?);
            }
            Ok(games)
        });

        match &result {
            Ok(games) if games.is_empty() => self.stats.miss(),
            Ok(_) => self.stats.hit(),
            Err(_) => self.stats.error(),
        }
        result
    }

    /// Rebuild one collection's membership rows.
    pub fn save_collection_games(
        &self,
        collection: &Collection,
        game_ids: &[i64],
    ) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::op("save", "game_collections", &collection.name, e))?;
            let Some(id) = internal_id(&tx, collection)? else {
                return Err(StoreError::op(
                    "save",
                    "game_collections",
                    &collection.name,
                    "collection row not cached",
                ));
            };
            tx.execute(
                "DELETE FROM game_collections WHERE collection_id = ?1",
                [id],
            )
            .map_err(|e| StoreError::op("save", "game_collections", &collection.name, e))?;
            insert_mappings(&tx, id, game_ids)?;
            tx.commit()
                .map_err(|e| StoreError::op("save", "game_collections", &collection.name, e))
        })
    }

    /// Rebuild the entire membership table from the collections' member
    /// lists in a single transaction. Duplicate pairs across collections of
    /// different kinds collapse through `INSERT OR IGNORE`.
    pub fn save_all_collection_mappings(
        &self,
        collections: &[Collection],
    ) -> Result<(), StoreError> {
        let mut mapped = 0usize;
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::op("save", "game_collections", "", e))?;
            tx.execute("DELETE FROM game_collections", [])
                .map_err(|e| StoreError::op("save", "game_collections", "", e))?;
            for collection in collections {
                if collection.rom_ids.is_empty() {
                    continue;
                }
                let Some(id) = internal_id(&tx, collection)? else {
                    log::warn!(
                        "Skipping mappings for uncached collection {:?}",
                        collection.name
                    );
                    continue;
                };
                insert_mappings(&tx, id, &collection.rom_ids)?;
                mapped += collection.rom_ids.len();
            }
            tx.commit()
                .map_err(|e| StoreError::op("save", "game_collections", "", e))
        })?;

        log::debug!(
            "Rebuilt {mapped} collection mappings across {} collections",
            collections.len()
        );
        Ok(())
    }

    pub fn has_collection_games(&self, collection: &Collection) -> Result<bool, StoreError> {
        self.collection_game_count(collection).map(|n| n > 0)
    }

    /// Number of membership rows for a collection.
    pub fn collection_game_count(&self, collection: &Collection) -> Result<i64, StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::op("count", "game_collections", &collection.name, e))?;
            let Some(id) = internal_id(&tx, collection)? else {
                return Ok(0);
            };
            tx.query_row(
                "SELECT COUNT(*) FROM game_collections WHERE collection_id = ?1",
                [id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::op("count", "game_collections", &collection.name, e))
        })
    }
}
