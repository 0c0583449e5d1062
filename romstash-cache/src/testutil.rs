//! In-memory catalog fake shared across this crate's tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::time::Duration;

use romstash_remote::{
    CatalogApi, Collection, CollectionKind, FetchError, Firmware, Game, GameQuery, Page, Platform,
    RemoteSave,
};

pub(crate) fn platform(id: i64, fs_slug: &str, rom_count: i64) -> Platform {
    Platform {
        id,
        slug: fs_slug.into(),
        fs_slug: fs_slug.into(),
        name: fs_slug.to_uppercase(),
        custom_name: String::new(),
        rom_count,
        has_bios: false,
        updated_at: None,
        extra: Default::default(),
    }
}

pub(crate) fn game(id: i64, platform_id: i64, fs_slug: &str) -> Game {
    Game {
        id,
        platform_id,
        platform_fs_slug: fs_slug.into(),
        name: format!("Game {id}"),
        fs_name: format!("Game {id}.bin"),
        url_cover: None,
        updated_at: None,
        extra: Default::default(),
    }
}

pub(crate) fn collection(kind: CollectionKind, remote_id: i64, name: &str) -> Collection {
    Collection {
        remote_id: Some(remote_id),
        virtual_id: None,
        kind,
        name: name.into(),
        rom_count: 0,
        rom_ids: vec![],
        updated_at: None,
        extra: Default::default(),
    }
}

/// Scope label for a game query, used as the fake's lookup key.
fn scope(query: &GameQuery) -> String {
    if let Some(id) = query.platform_id {
        format!("platform_{id}")
    } else if let Some(id) = query.collection_id {
        format!("collection_{id}")
    } else if let Some(id) = query.smart_collection_id {
        format!("smart_collection_{id}")
    } else if let Some(ref id) = query.virtual_collection_id {
        format!("virtual_collection_{id}")
    } else {
        "all".to_string()
    }
}

#[derive(Default)]
pub(crate) struct FakeCatalog {
    pub platforms: Vec<Platform>,
    /// Games per scope label, paginated by the fake.
    pub games: HashMap<String, Vec<Game>>,
    pub collections: Vec<Collection>,
    pub smart: Vec<Collection>,
    pub virtuals: Vec<Collection>,
    pub firmware: HashMap<i64, Vec<Firmware>>,
    /// Scopes whose game listing fails.
    pub fail_scopes: Vec<String>,
    /// When set, every page reports this total instead of the real count.
    pub lie_total: Option<i64>,
    /// Artificial latency per game request, for dedup tests.
    pub request_delay: Option<Duration>,
    pub game_requests: AtomicUsize,
    pub downloads: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeCatalog {
    pub fn add_platform_games(&mut self, platform: Platform, games: Vec<Game>) {
        self.games.insert(format!("platform_{}", platform.id), games);
        self.platforms.push(platform);
    }

    pub fn requests(&self) -> usize {
        self.game_requests.load(Ordering::SeqCst)
    }
}

impl CatalogApi for FakeCatalog {
    async fn platforms(&self) -> Result<Vec<Platform>, FetchError> {
        Ok(self.platforms.clone())
    }

    async fn games(&self, query: &GameQuery) -> Result<Page<Game>, FetchError> {
        self.game_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.request_delay {
            tokio::time::sleep(delay).await;
        }

        let scope = scope(query);
        if self.fail_scopes.contains(&scope) {
            return Err(FetchError::Api(format!("listing failed for {scope}")));
        }
        let all = self.games.get(&scope).cloned().unwrap_or_default();
        let start = (query.offset.max(0) as usize).min(all.len());
        let end = (start + query.limit.max(0) as usize).min(all.len());
        Ok(Page {
            items: all[start..end].to_vec(),
            total: self.lie_total.unwrap_or(all.len() as i64),
        })
    }

    async fn collections(&self) -> Result<Vec<Collection>, FetchError> {
        Ok(self.collections.clone())
    }

    async fn smart_collections(&self) -> Result<Vec<Collection>, FetchError> {
        Ok(self.smart.clone())
    }

    async fn virtual_collections(&self) -> Result<Vec<Collection>, FetchError> {
        Ok(self.virtuals.clone())
    }

    async fn firmware(&self, platform_id: i64) -> Result<Vec<Firmware>, FetchError> {
        Ok(self.firmware.get(&platform_id).cloned().unwrap_or_default())
    }

    async fn saves(&self, _rom_id: i64) -> Result<Vec<RemoteSave>, FetchError> {
        Ok(vec![])
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let downloads = self
            .downloads
            .lock()
            .map_err(|_| FetchError::Api("downloads lock poisoned".into()))?;
        downloads.get(path).cloned().ok_or(FetchError::ServerError {
            status: 404,
            message: format!("no such file: {path}"),
        })
    }

    async fn download_save(&self, save: &RemoteSave) -> Result<Vec<u8>, FetchError> {
        self.download(&save.download_path).await
    }

    async fn upload_save(
        &self,
        _rom_id: i64,
        _file_name: &str,
        _bytes: Vec<u8>,
    ) -> Result<(), FetchError> {
        Ok(())
    }
}
