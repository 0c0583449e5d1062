//! Freshness tracking and deduplicated prefetching.
//!
//! Each cache key carries an in-memory freshness mark with a TTL. Stale
//! keys are re-fetched on demand; concurrent requests for the same key
//! collapse onto a single in-flight fetch.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::StreamExt;
use futures::stream;
use tokio::sync::watch;
use tokio::time::Duration;

use romstash_remote::{CatalogApi, Collection, Platform};
use romstash_store::{Store, StoreError};

use crate::error::CacheError;
use crate::key::CacheKey;
use crate::populate;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Ticket {
    Leader(watch::Sender<bool>),
    Follower(watch::Receiver<bool>),
}

enum Mark {
    Fresh(Instant),
    Stale,
}

/// Tracks which cache scopes are fresh and deduplicates their refreshes.
pub struct Freshness {
    ttl: Duration,
    marks: Mutex<HashMap<CacheKey, Mark>>,
    bios: Mutex<HashMap<i64, bool>>,
    inflight: Mutex<HashMap<CacheKey, watch::Receiver<bool>>>,
    collections: Mutex<Option<Vec<Collection>>>,
}

impl Freshness {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            marks: Mutex::new(HashMap::new()),
            bios: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            collections: Mutex::new(None),
        }
    }

    /// Current freshness for a key: `None` when it was never evaluated,
    /// `Some(false)` when it was marked stale or its mark expired.
    pub fn is_fresh(&self, key: &CacheKey) -> Option<bool> {
        match lock(&self.marks).get(key) {
            None => None,
            Some(Mark::Stale) => Some(false),
            Some(Mark::Fresh(marked)) => Some(marked.elapsed() < self.ttl),
        }
    }

    pub fn mark_fresh(&self, key: &CacheKey) {
        lock(&self.marks).insert(key.clone(), Mark::Fresh(Instant::now()));
    }

    pub fn mark_stale(&self, key: &CacheKey) {
        lock(&self.marks).insert(key.clone(), Mark::Stale);
    }

    /// Forget every mark, forcing re-probes across the board.
    pub fn mark_all_stale(&self) {
        lock(&self.marks).clear();
    }

    /// Firmware availability for a platform, memoized over the store's
    /// persisted flag. `None` when never checked. The background sweep
    /// writes fresh remote state through this map on every run.
    pub fn has_bios(&self, store: &Store, platform_id: i64) -> Result<Option<bool>, CacheError> {
        if let Some(&known) = lock(&self.bios).get(&platform_id) {
            return Ok(Some(known));
        }
        let Some((has_bios, _)) = store.bios_availability(platform_id)? else {
            return Ok(None);
        };
        lock(&self.bios).insert(platform_id, has_bios);
        Ok(Some(has_bios))
    }

    /// The collection list from the most recent sweep, `None` before the
    /// first sweep.
    pub fn collections(&self) -> Option<Vec<Collection>> {
        lock(&self.collections).clone()
    }

    pub fn is_prefetching(&self, key: &CacheKey) -> bool {
        lock(&self.inflight).contains_key(key)
    }

    /// Wait for an in-flight prefetch of `key`, if any.
    pub async fn wait_for_prefetch(&self, key: &CacheKey) {
        let rx = lock(&self.inflight).get(key).cloned();
        if let Some(mut rx) = rx {
            let _ = rx.wait_for(|done| *done).await;
        }
    }

    /// Refresh `key` from the remote, collapsing concurrent callers onto
    /// one fetch. Returns `true` when this call performed the fetch,
    /// `false` when it waited on one already in flight.
    pub async fn prefetch<C: CatalogApi>(
        &self,
        api: &C,
        store: &Store,
        key: &CacheKey,
    ) -> Result<bool, CacheError> {
        let ticket = {
            let mut inflight = lock(&self.inflight);
            match inflight.get(key) {
                Some(rx) => Ticket::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(false);
                    inflight.insert(key.clone(), rx);
                    Ticket::Leader(tx)
                }
            }
        };

        match ticket {
            Ticket::Follower(mut rx) => {
                let _ = rx.wait_for(|done| *done).await;
                Ok(false)
            }
            Ticket::Leader(tx) => {
                let result = self.refresh_key(api, store, key).await;
                lock(&self.inflight).remove(key);
                let _ = tx.send(true);
                result.map(|()| true)
            }
        }
    }

    async fn refresh_key<C: CatalogApi>(
        &self,
        api: &C,
        store: &Store,
        key: &CacheKey,
    ) -> Result<(), CacheError> {
        match key {
            CacheKey::Platform(id) => {
                populate::refresh_platform(api, store, *id, None).await?;
            }
            _ => {
                let collection = self
                    .cached_collection(store, key)?
                    .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
                populate::refresh_collection(api, store, &collection).await?;
            }
        }
        self.mark_fresh(key);
        Ok(())
    }

    fn cached_collection(
        &self,
        store: &Store,
        key: &CacheKey,
    ) -> Result<Option<Collection>, CacheError> {
        use romstash_remote::CollectionKind;
        let collection = match key {
            CacheKey::Platform(_) => None,
            CacheKey::Collection(id) => {
                store.collection_by_remote_id(CollectionKind::Regular, *id)?
            }
            CacheKey::SmartCollection(id) => {
                store.collection_by_remote_id(CollectionKind::Smart, *id)?
            }
            CacheKey::VirtualCollection(id) => store.collection_by_virtual_id(id)?,
        };
        Ok(collection)
    }

    /// Ask the remote whether `key` has drifted from the cached rows: a
    /// limit-1 listing's declared total against the cached count.
    pub async fn probe_stale<C: CatalogApi>(
        &self,
        api: &C,
        store: &Store,
        key: &CacheKey,
    ) -> Result<bool, CacheError> {
        let page = api.games(&key.query().page(0, 1)).await?;
        let cached = match key {
            CacheKey::Platform(id) => store.platform_game_count(*id)?,
            _ => match self.cached_collection(store, key)? {
                Some(collection) => store.collection_game_count(&collection)?,
                None => 0,
            },
        };
        Ok(page.total != cached)
    }

    /// Periodic staleness sweep over every cached platform. Runs until the
    /// task is dropped with the runtime; per-key failures are logged and
    /// the sweep moves on.
    pub async fn run_background<C: CatalogApi>(
        &self,
        api: &C,
        store: &Store,
        interval: Duration,
    ) -> Result<(), CacheError> {
        log::info!("Background freshness sweep every {interval:?}");
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = self.sweep(api, store).await {
                log::warn!("Freshness sweep failed: {e}");
            }
        }
    }

    async fn sweep<C: CatalogApi>(&self, api: &C, store: &Store) -> Result<(), CacheError> {
        let platforms = store.platforms()?;
        stream::iter(&platforms)
            .for_each_concurrent(populate::MAX_CONCURRENT_FETCHES, |platform| {
                self.sweep_platform(api, store, platform)
            })
            .await;
        self.sweep_collections(api, store).await
    }

    /// Per-platform pass: refresh the firmware flag unconditionally, then
    /// probe games for drift unless the key is known fresh.
    async fn sweep_platform<C: CatalogApi>(&self, api: &C, store: &Store, platform: &Platform) {
        if let Err(e) = self.check_firmware(api, store, platform.id).await {
            log::warn!(
                "Firmware check failed for {}: {e}",
                platform.display_name()
            );
        }

        let key = CacheKey::Platform(platform.id);
        if self.is_fresh(&key) == Some(true) {
            return;
        }
        match self.probe_stale(api, store, &key).await {
            Ok(true) => {
                log::info!("Platform {} drifted; refreshing", platform.display_name());
                if let Err(e) = self.prefetch(api, store, &key).await {
                    log::warn!("Refresh failed for {key}: {e}");
                }
            }
            Ok(false) => self.mark_fresh(&key),
            Err(e) => log::warn!("Staleness probe failed for {key}: {e}"),
        }
    }

    /// Fetch firmware availability and write it through to both the store
    /// and the in-memory map.
    async fn check_firmware<C: CatalogApi>(
        &self,
        api: &C,
        store: &Store,
        platform_id: i64,
    ) -> Result<(), CacheError> {
        let firmware = api.firmware(platform_id).await?;
        let has_bios = !firmware.is_empty();
        store.set_bios_availability(platform_id, has_bios)?;
        lock(&self.bios).insert(platform_id, has_bios);
        Ok(())
    }

    /// Re-list collections and refresh the ones whose remote timestamp
    /// moved past the cached row. Virtual collections carry no timestamp,
    /// so they fall back to the count probe.
    async fn sweep_collections<C: CatalogApi>(
        &self,
        api: &C,
        store: &Store,
    ) -> Result<(), CacheError> {
        let mut remote = api.collections().await?;
        remote.extend(api.smart_collections().await?);
        remote.extend(api.virtual_collections().await?);

        let mut drifted = Vec::new();
        for collection in &remote {
            let Some(key) = CacheKey::for_collection(collection) else {
                continue;
            };
            if self.is_fresh(&key) == Some(true) {
                continue;
            }
            let moved = match collection.updated_at {
                Some(updated) => self
                    .cached_collection(store, &key)?
                    .map_or(true, |cached| cached.updated_at != Some(updated)),
                None => self.probe_stale(api, store, &key).await?,
            };
            if moved {
                drifted.push((key, collection.name.clone()));
            } else {
                self.mark_fresh(&key);
            }
        }

        // Rows must exist before a scoped refresh can resolve them.
        store.save_collections(&remote)?;
        for (key, name) in drifted {
            log::info!("Collection {name:?} drifted; refreshing");
            if let Err(e) = self.prefetch(api, store, &key).await {
                log::warn!("Refresh failed for {key}: {e}");
            }
        }
        *lock(&self.collections) = Some(remote);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeCatalog, game, platform};

    fn fake_with_platform(games: i64) -> FakeCatalog {
        let mut api = FakeCatalog::default();
        api.add_platform_games(
            platform(1, "snes", games),
            (0..games).map(|i| game(i + 1, 1, "snes")).collect(),
        );
        api
    }

    #[test]
    fn marks_distinguish_unknown_stale_and_fresh() {
        let freshness = Freshness::new(Duration::from_secs(60));
        let key = CacheKey::Platform(1);
        // Never evaluated.
        assert_eq!(freshness.is_fresh(&key), None);

        freshness.mark_fresh(&key);
        assert_eq!(freshness.is_fresh(&key), Some(true));

        freshness.mark_stale(&key);
        assert_eq!(freshness.is_fresh(&key), Some(false));

        freshness.mark_all_stale();
        assert_eq!(freshness.is_fresh(&key), None);

        // A zero TTL expires a fresh mark immediately.
        let expired = Freshness::new(Duration::ZERO);
        expired.mark_fresh(&key);
        assert_eq!(expired.is_fresh(&key), Some(false));
    }

    #[tokio::test]
    async fn concurrent_prefetches_collapse_to_one_fetch() {
        let mut api = fake_with_platform(3);
        api.request_delay = Some(Duration::from_millis(20));

        let store = romstash_store::Store::open_in_memory().unwrap();
        let freshness = Freshness::new(Duration::from_secs(60));
        let key = CacheKey::Platform(1);

        let (a, b) = tokio::join!(
            freshness.prefetch(&api, &store, &key),
            freshness.prefetch(&api, &store, &key),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a ^ b, "exactly one caller should lead the fetch");
        assert_eq!(api.requests(), 1);
        assert_eq!(store.platform_game_count(1).unwrap(), 3);
        assert_eq!(freshness.is_fresh(&key), Some(true));
        assert!(!freshness.is_prefetching(&key));
    }

    #[tokio::test]
    async fn probe_compares_declared_total_with_cached_rows() {
        let api = fake_with_platform(3);
        let store = romstash_store::Store::open_in_memory().unwrap();
        let freshness = Freshness::new(Duration::from_secs(60));
        let key = CacheKey::Platform(1);

        // Nothing cached yet: drift.
        assert!(freshness.probe_stale(&api, &store, &key).await.unwrap());

        freshness.prefetch(&api, &store, &key).await.unwrap();
        assert!(!freshness.probe_stale(&api, &store, &key).await.unwrap());
    }

    #[tokio::test]
    async fn sweep_refreshes_collections_whose_timestamp_moved() {
        use chrono::{TimeZone, Utc};
        use romstash_remote::CollectionKind;

        use crate::testutil::collection;

        let mut api = FakeCatalog::default();
        let mut shelf = collection(CollectionKind::Regular, 7, "Shelf");
        shelf.updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        api.collections = vec![shelf.clone()];
        api.games.insert(
            "collection_7".to_string(),
            vec![game(1, 1, "snes"), game(2, 1, "snes")],
        );

        let store = romstash_store::Store::open_in_memory().unwrap();
        let freshness = Freshness::new(Duration::from_secs(60));
        let key = CacheKey::Collection(7);

        // First sweep sees an uncached collection and fetches its games.
        freshness.sweep(&api, &store).await.unwrap();
        assert_eq!(store.collection_game_count(&shelf).unwrap(), 2);
        assert_eq!(freshness.is_fresh(&key), Some(true));
        assert_eq!(freshness.collections().unwrap().len(), 1);
        let after_first = api.requests();

        // Same timestamp: a stale mark alone does not trigger a refetch.
        freshness.mark_stale(&key);
        freshness.sweep(&api, &store).await.unwrap();
        assert_eq!(api.requests(), after_first);
        assert_eq!(freshness.is_fresh(&key), Some(true));

        // A moved timestamp does.
        api.collections[0].updated_at =
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        freshness.mark_stale(&key);
        freshness.sweep(&api, &store).await.unwrap();
        assert!(api.requests() > after_first);
    }

    #[tokio::test]
    async fn bios_flags_memoize_over_the_store() {
        let store = romstash_store::Store::open_in_memory().unwrap();
        let freshness = Freshness::new(Duration::from_secs(60));

        assert_eq!(freshness.has_bios(&store, 1).unwrap(), None);
        store.set_bios_availability(1, true).unwrap();
        assert_eq!(freshness.has_bios(&store, 1).unwrap(), Some(true));

        // Out-of-band store changes are shadowed by the memo until the
        // next sweep writes through it.
        store.set_bios_availability(1, false).unwrap();
        assert_eq!(freshness.has_bios(&store, 1).unwrap(), Some(true));
    }

    #[tokio::test]
    async fn sweep_refreshes_firmware_availability() {
        use romstash_remote::Firmware;

        let mut api = fake_with_platform(1);
        api.firmware.insert(
            1,
            vec![Firmware {
                id: 1,
                file_name: "bios.bin".into(),
                extra: Default::default(),
            }],
        );

        let store = romstash_store::Store::open_in_memory().unwrap();
        store.save_platforms(&[platform(1, "snes", 1)]).unwrap();
        store
            .save_platform_games(1, &[game(1, 1, "snes")])
            .unwrap();

        let freshness = Freshness::new(Duration::from_secs(60));
        assert_eq!(freshness.has_bios(&store, 1).unwrap(), None);

        // Even with the games cache fully up to date, a sweep refreshes
        // the firmware flag in the store and the memo.
        freshness.sweep(&api, &store).await.unwrap();
        assert_eq!(freshness.has_bios(&store, 1).unwrap(), Some(true));
        assert!(store.bios_availability(1).unwrap().unwrap().0);

        // And a later run picks up firmware removal.
        api.firmware.remove(&1);
        freshness.sweep(&api, &store).await.unwrap();
        assert_eq!(freshness.has_bios(&store, 1).unwrap(), Some(false));
    }

    #[tokio::test]
    async fn sweep_probes_platforms_concurrently() {
        let mut api = FakeCatalog::default();
        for id in 1..=4 {
            let slug = format!("p{id}");
            api.add_platform_games(
                platform(id, &slug, 1),
                vec![game(id * 100, id, &slug)],
            );
        }
        api.request_delay = Some(Duration::from_millis(50));

        let store = romstash_store::Store::open_in_memory().unwrap();
        store.save_platforms(&api.platforms).unwrap();
        for id in 1..=4 {
            let slug = format!("p{id}");
            store
                .save_platform_games(id, &[game(id * 100, id, &slug)])
                .unwrap();
        }

        let freshness = Freshness::new(Duration::from_secs(60));
        let started = Instant::now();
        freshness.sweep(&api, &store).await.unwrap();

        // Four 50ms probes overlap under the fan-out bound; run serially
        // they would take at least 200ms.
        assert!(
            started.elapsed() < Duration::from_millis(150),
            "platform probes did not overlap"
        );
        assert_eq!(api.requests(), 4);
    }
}
