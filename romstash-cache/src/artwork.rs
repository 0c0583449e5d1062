//! On-disk artwork cache with metadata rows in the store.
//!
//! Files live at `<root>/<platform_fs_slug>/<game_id>.png`. The store's
//! metadata rows are an index over the directory tree; either side can go
//! missing independently, so lookups check both and heal the index.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;

use romstash_remote::{CatalogApi, Game};
use romstash_store::{ArtworkEntry, META_ARTWORK_REFRESHED_AT, Store};

use crate::error::CacheError;
use crate::populate::MAX_CONCURRENT_FETCHES;
use crate::task::TaskHandle;

/// Outcome of a bulk artwork download pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtworkStats {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Outcome of a validation sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidateStats {
    pub valid: usize,
    pub removed: usize,
}

fn check_bytes(bytes: &[u8]) -> Result<(), String> {
    let reader = Cursor::new(bytes);
    let reader = image::ImageReader::new(reader)
        .with_guessed_format()
        .map_err(|e| e.to_string())?;
    if reader.format().is_none() {
        return Err("unrecognized image format".to_string());
    }
    // Header-only decode: dimensions come from the header, not the pixels.
    reader.into_dimensions().map(|_| ()).map_err(|e| e.to_string())
}

fn check_file(path: &Path) -> bool {
    image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .ok()
        .and_then(|r| r.into_dimensions().ok())
        .is_some()
}

/// Artwork files on disk plus their index in the store.
pub struct ArtworkCache {
    store: Arc<Store>,
    root: PathBuf,
}

impl ArtworkCache {
    pub fn new(store: Arc<Store>, root: PathBuf) -> Self {
        Self { store, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a game's artwork lives (whether or not it is cached yet).
    pub fn path_for(&self, platform_fs_slug: &str, game_id: i64) -> PathBuf {
        self.root
            .join(platform_fs_slug)
            .join(format!("{game_id}.png"))
    }

    /// Whether a game's artwork is cached, consulting the index first and
    /// the filesystem second. A file present without an index row is
    /// re-indexed; a row whose file vanished is dropped.
    pub fn exists(&self, platform_fs_slug: &str, game_id: i64) -> Result<bool, CacheError> {
        let path = self.path_for(platform_fs_slug, game_id);
        if self.store.is_artwork_cached(platform_fs_slug, game_id)? {
            if path.is_file() {
                return Ok(true);
            }
            log::debug!("Artwork file vanished for game {game_id}; dropping index row");
            self.store.remove_artwork(platform_fs_slug, game_id)?;
            return Ok(false);
        }
        if path.is_file() {
            let size = std::fs::metadata(&path)?.len() as i64;
            self.store.mark_artwork_cached(&ArtworkEntry {
                platform_fs_slug: platform_fs_slug.to_string(),
                game_id,
                file_path: path.to_string_lossy().into_owned(),
                file_size_bytes: size,
            })?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Persist downloaded artwork bytes, rejecting anything that is not a
    /// decodable image. Nothing is written for rejected bytes.
    pub fn store_bytes(
        &self,
        platform_fs_slug: &str,
        game_id: i64,
        bytes: &[u8],
    ) -> Result<PathBuf, CacheError> {
        check_bytes(bytes).map_err(|reason| CacheError::InvalidImage { game_id, reason })?;

        let path = self.path_for(platform_fs_slug, game_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        self.store.mark_artwork_cached(&ArtworkEntry {
            platform_fs_slug: platform_fs_slug.to_string(),
            game_id,
            file_path: path.to_string_lossy().into_owned(),
            file_size_bytes: bytes.len() as i64,
        })?;
        Ok(path)
    }

    /// Games that have a cover URL but no cached artwork yet.
    pub fn missing(&self, games: &[Game]) -> Result<Vec<Game>, CacheError> {
        let mut out = Vec::new();
        for game in games {
            if game.has_cover() && !self.exists(&game.platform_fs_slug, game.id)? {
                out.push(game.clone());
            }
        }
        Ok(out)
    }

    /// Games whose artwork is already cached.
    pub fn with_artwork(&self, games: &[Game]) -> Result<Vec<Game>, CacheError> {
        let mut out = Vec::new();
        for game in games {
            if self.exists(&game.platform_fs_slug, game.id)? {
                out.push(game.clone());
            }
        }
        Ok(out)
    }

    /// Download one game's cover if it has one and it is not cached yet.
    /// Returns whether a download happened.
    pub async fn fetch<C: CatalogApi>(&self, api: &C, game: &Game) -> Result<bool, CacheError> {
        if !game.has_cover() || self.exists(&game.platform_fs_slug, game.id)? {
            return Ok(false);
        }
        let Some(url) = game.url_cover.as_deref() else {
            return Ok(false);
        };
        let bytes = api.download(url).await?;
        self.store_bytes(&game.platform_fs_slug, game.id, &bytes)?;
        Ok(true)
    }

    /// Download covers for every game that has one, a few at a time.
    /// Individual failures are logged and counted, never fatal.
    pub async fn download_all<C: CatalogApi>(
        &self,
        api: &C,
        games: &[Game],
    ) -> Result<ArtworkStats, CacheError> {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let downloaded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        stream::iter(games)
            .for_each_concurrent(MAX_CONCURRENT_FETCHES, |game| {
                let downloaded = &downloaded;
                let failed = &failed;
                async move {
                    match self.fetch(api, game).await {
                        Ok(true) => {
                            downloaded.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(false) => {}
                        Err(e) => {
                            log::warn!("Artwork download failed for game {}: {e}", game.id);
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
            .await;

        let stats = ArtworkStats {
            downloaded: downloaded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            skipped: games.len()
                - downloaded.load(Ordering::Relaxed)
                - failed.load(Ordering::Relaxed),
        };
        self.store.record_refresh(META_ARTWORK_REFRESHED_AT)?;
        log::info!(
            "Artwork pass: {} downloaded, {} skipped, {} failed",
            stats.downloaded,
            stats.skipped,
            stats.failed
        );
        Ok(stats)
    }

    /// Sweep every indexed file: drop rows (and files) whose bytes are
    /// missing or not a decodable image.
    pub fn validate(&self) -> Result<ValidateStats, CacheError> {
        let mut stats = ValidateStats::default();
        for entry in self.store.artwork_entries(None)? {
            let path = Path::new(&entry.file_path);
            if path.is_file() && check_file(path) {
                self.store
                    .touch_artwork_validated(&entry.platform_fs_slug, entry.game_id)?;
                stats.valid += 1;
                continue;
            }

            log::debug!(
                "Removing invalid artwork for game {} at {}",
                entry.game_id,
                entry.file_path
            );
            self.store
                .remove_artwork(&entry.platform_fs_slug, entry.game_id)?;
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
            stats.removed += 1;
        }
        log::info!(
            "Artwork validation: {} valid, {} removed",
            stats.valid,
            stats.removed
        );
        Ok(stats)
    }

    /// Rebuild index rows from files already on disk. Returns how many
    /// rows were added.
    pub fn index_from_disk(&self) -> Result<usize, CacheError> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        let mut added = 0;
        for platform_dir in std::fs::read_dir(&self.root)? {
            let platform_dir = platform_dir?;
            if !platform_dir.file_type()?.is_dir() {
                continue;
            }
            let slug = platform_dir.file_name().to_string_lossy().into_owned();
            for file in std::fs::read_dir(platform_dir.path())? {
                let file = file?;
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("png") {
                    continue;
                }
                let Some(game_id) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<i64>().ok())
                else {
                    continue;
                };
                if self.store.is_artwork_cached(&slug, game_id)? {
                    continue;
                }
                self.store.mark_artwork_cached(&ArtworkEntry {
                    platform_fs_slug: slug.clone(),
                    game_id,
                    file_path: path.to_string_lossy().into_owned(),
                    file_size_bytes: file.metadata()?.len() as i64,
                })?;
                added += 1;
            }
        }
        if added > 0 {
            log::info!("Re-indexed {added} artwork files from disk");
        }
        Ok(added)
    }

    /// Run the validation sweep off the caller's path.
    pub fn spawn_validate(self: &Arc<Self>) -> TaskHandle {
        let cache = Arc::clone(self);
        TaskHandle::spawn("artwork-validate", async move {
            cache.validate().map(|_| ())
        })
    }
}
