//! Bulk population of the local mirror from the remote catalog.
//!
//! Platforms are fetched first, then each platform's games in parallel
//! (bounded), then the three collection families. A failure on one
//! platform never cancels the others; the first failure is reported after
//! everything reachable has been cached.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures::StreamExt;
use futures::stream;

use romstash_remote::{CatalogApi, Collection, Game, GameQuery};
use romstash_store::{META_COLLECTIONS_REFRESHED_AT, META_GAMES_REFRESHED_AT, Store};

use crate::error::CacheError;
use crate::progress::Progress;

/// Games fetched per listing request.
pub const PAGE_SIZE: i64 = 200;
/// Platforms fetched in parallel during population.
pub const MAX_CONCURRENT_FETCHES: usize = 5;
/// Hard cap on listing requests per scope, bounding a service that keeps
/// returning full pages.
pub const MAX_REQUESTS_PER_KEY: usize = 1000;

/// Share of the progress range spent on game fetching; the remainder
/// covers collections.
const GAMES_SPAN: f64 = 0.9;

/// Outcome of a population run.
#[derive(Debug, Default, Clone, Copy)]
pub struct PopulateStats {
    pub platforms: usize,
    pub failed_platforms: usize,
    pub games: u64,
    pub collections: usize,
}

/// Fetch every game in a scope, page by page, until the listing is
/// exhausted. `on_page` observes each page's item count.
///
/// Termination: an empty page, a short page, or the accumulated count
/// reaching the service's declared total. The request cap bounds scopes
/// whose declared total never reconciles with what they serve.
pub(crate) async fn fetch_all_games<C: CatalogApi>(
    api: &C,
    base: &GameQuery,
    mut on_page: impl FnMut(usize),
) -> Result<Vec<Game>, CacheError> {
    let mut games: Vec<Game> = Vec::new();
    let mut offset = 0i64;
    for _ in 0..MAX_REQUESTS_PER_KEY {
        let page = api.games(&base.clone().page(offset, PAGE_SIZE)).await?;
        let count = page.items.len();
        games.extend(page.items);
        on_page(count);

        if count == 0
            || (count as i64) < PAGE_SIZE
            || (page.total > 0 && games.len() as i64 >= page.total)
        {
            break;
        }
        offset += count as i64;
    }
    Ok(games)
}

async fn refresh_platform_paged<C: CatalogApi>(
    api: &C,
    store: &Store,
    platform_id: i64,
    on_page: impl FnMut(usize),
) -> Result<u64, CacheError> {
    let query = GameQuery::for_platform(platform_id);
    let games = fetch_all_games(api, &query, on_page).await?;
    store.save_platform_games(platform_id, &games)?;

    // Firmware availability rides along; its failure degrades the flag,
    // not the platform's games.
    match api.firmware(platform_id).await {
        Ok(firmware) => store.set_bios_availability(platform_id, !firmware.is_empty())?,
        Err(e) => log::warn!("Firmware check failed for platform {platform_id}: {e}"),
    }
    Ok(games.len() as u64)
}

/// Re-fetch one platform's games and firmware flag. With a progress sink,
/// the run drives it from 0 to exactly 1.0, weighted by the platform's
/// declared ROM count.
pub async fn refresh_platform<C: CatalogApi>(
    api: &C,
    store: &Store,
    platform_id: i64,
    progress: Option<&Progress>,
) -> Result<u64, CacheError> {
    if let Some(progress) = progress {
        progress.reset();
    }
    let expected = store
        .platform_by_id(platform_id)?
        .map(|p| p.rom_count)
        .unwrap_or(0);

    let fetched = AtomicU64::new(0);
    let count = refresh_platform_paged(api, store, platform_id, |count| {
        if let Some(progress) = progress {
            let now = fetched.fetch_add(count as u64, Ordering::Relaxed) + count as u64;
            if expected > 0 {
                progress.set((now as f64 / expected as f64).min(1.0));
            }
        }
    })
    .await?;

    if let Some(progress) = progress {
        progress.set(1.0);
    }
    log::info!("Refreshed platform {platform_id}: {count} games");
    Ok(count)
}

/// Re-fetch one collection's games and rebuild its membership rows. The
/// fetched games span platforms, so they are upserted individually.
pub async fn refresh_collection<C: CatalogApi>(
    api: &C,
    store: &Store,
    collection: &Collection,
) -> Result<u64, CacheError> {
    let query = GameQuery::for_collection(collection);
    let games = fetch_all_games(api, &query, |_| {}).await?;
    store.upsert_games(&games)?;

    let ids: Vec<i64> = games.iter().map(|g| g.id).collect();
    store.save_collection_games(collection, &ids)?;
    log::info!("Refreshed collection {:?}: {} games", collection.name, ids.len());
    Ok(ids.len() as u64)
}

async fn fetch_collections<C: CatalogApi>(
    api: &C,
    store: &Store,
    progress: &Progress,
) -> Result<usize, CacheError> {
    let mut all = api.collections().await?;
    progress.set(0.92);
    all.extend(api.smart_collections().await?);
    progress.set(0.94);
    all.extend(api.virtual_collections().await?);
    progress.set(0.98);

    store.save_collections(&all)?;
    store.save_all_collection_mappings(&all)?;
    store.record_refresh(META_COLLECTIONS_REFRESHED_AT)?;
    Ok(all.len())
}

/// Populate the whole mirror: platforms, games, firmware flags, then
/// collections and their membership mappings.
///
/// Progress runs 0 to 0.9 over game fetching (weighted by the declared
/// per-platform totals, falling back to completed-platform count when the
/// service declares none), stepping through the collection phases to
/// exactly 1.0. The games refresh stamp is only recorded when every
/// platform succeeded, so a partial run stays eligible for re-population.
pub async fn populate<C: CatalogApi>(
    api: &C,
    store: &Store,
    progress: &Progress,
) -> Result<PopulateStats, CacheError> {
    progress.reset();
    let platforms = api.platforms().await?;
    store.save_platforms(&platforms)?;
    log::info!("Populating cache: {} platforms", platforms.len());

    let expected: i64 = platforms.iter().map(|p| p.rom_count).sum();
    let fetched = AtomicU64::new(0);
    let completed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let first_error: Mutex<Option<CacheError>> = Mutex::new(None);

    let report = |fetched_now: u64, completed_now: usize| {
        let fraction = if expected > 0 {
            (fetched_now as f64 / expected as f64).min(1.0)
        } else if platforms.is_empty() {
            1.0
        } else {
            completed_now as f64 / platforms.len() as f64
        };
        progress.set(fraction * GAMES_SPAN);
    };

    stream::iter(&platforms)
        .for_each_concurrent(MAX_CONCURRENT_FETCHES, |platform| {
            let fetched = &fetched;
            let completed = &completed;
            let failed = &failed;
            let first_error = &first_error;
            let report = &report;
            async move {
                let result = refresh_platform_paged(api, store, platform.id, |count| {
                    let now = fetched.fetch_add(count as u64, Ordering::Relaxed) + count as u64;
                    report(now, completed.load(Ordering::Relaxed));
                })
                .await;

                if let Err(e) = result {
                    log::error!(
                        "Failed to populate platform {}: {e}",
                        platform.display_name()
                    );
                    failed.fetch_add(1, Ordering::Relaxed);
                    if let Ok(mut slot) = first_error.lock() {
                        slot.get_or_insert(e);
                    }
                }
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                report(fetched.load(Ordering::Relaxed), done);
            }
        })
        .await;

    progress.set(GAMES_SPAN);
    let failed_platforms = failed.load(Ordering::Relaxed);
    if failed_platforms == 0 {
        store.record_refresh(META_GAMES_REFRESHED_AT)?;
    }

    let collections = fetch_collections(api, store, progress).await?;
    progress.set(1.0);

    let stats = PopulateStats {
        platforms: platforms.len(),
        failed_platforms,
        games: fetched.load(Ordering::Relaxed),
        collections,
    };
    log::info!(
        "Populate finished: {} games across {} platforms ({} failed), {} collections",
        stats.games,
        stats.platforms,
        stats.failed_platforms,
        stats.collections
    );

    if let Ok(mut slot) = first_error.lock() {
        if let Some(e) = slot.take() {
            return Err(e);
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use romstash_remote::CollectionKind;
    use romstash_store::META_GAMES_REFRESHED_AT;

    use super::*;
    use crate::testutil::{FakeCatalog, collection, game, platform};

    fn games_for(platform_id: i64, count: i64) -> Vec<Game> {
        (0..count)
            .map(|i| game(platform_id * 10_000 + i, platform_id, "snes"))
            .collect()
    }

    #[tokio::test]
    async fn pagination_stops_on_short_page() {
        let mut api = FakeCatalog::default();
        api.add_platform_games(platform(1, "snes", 500), games_for(1, 500));

        let games = fetch_all_games(&api, &GameQuery::for_platform(1), |_| {})
            .await
            .unwrap();
        assert_eq!(games.len(), 500);
        // 200 + 200 + 100: the declared total ends the walk on page three.
        assert_eq!(api.requests(), 3);
    }

    #[tokio::test]
    async fn empty_scope_costs_one_request() {
        let mut api = FakeCatalog::default();
        api.add_platform_games(platform(1, "snes", 0), vec![]);

        let games = fetch_all_games(&api, &GameQuery::for_platform(1), |_| {})
            .await
            .unwrap();
        assert!(games.is_empty());
        assert_eq!(api.requests(), 1);
    }

    #[tokio::test]
    async fn inflated_total_terminates_on_short_page() {
        let mut api = FakeCatalog::default();
        api.add_platform_games(platform(1, "snes", 0), games_for(1, 250));
        api.lie_total = Some(100_000);

        let games = fetch_all_games(&api, &GameQuery::for_platform(1), |_| {})
            .await
            .unwrap();
        assert_eq!(games.len(), 250);
        assert_eq!(api.requests(), 2);
    }

    #[tokio::test]
    async fn populate_fills_store_and_completes_progress() {
        let mut api = FakeCatalog::default();
        api.add_platform_games(platform(1, "snes", 3), games_for(1, 3));
        api.add_platform_games(platform(2, "gba", 2), games_for(2, 2));
        api.firmware.insert(
            1,
            vec![romstash_remote::Firmware {
                id: 1,
                file_name: "bios.bin".into(),
                extra: Default::default(),
            }],
        );
        api.collections = vec![collection(CollectionKind::Regular, 1, "Shelf")];

        let store = romstash_store::Store::open_in_memory().unwrap();
        let progress = Progress::new();
        let stats = populate(&api, &store, &progress).await.unwrap();

        assert_eq!(stats.platforms, 2);
        assert_eq!(stats.failed_platforms, 0);
        assert_eq!(stats.games, 5);
        assert_eq!(stats.collections, 1);
        assert_eq!(progress.get(), 1.0);

        assert_eq!(store.platform_game_count(1).unwrap(), 3);
        assert_eq!(store.platform_game_count(2).unwrap(), 2);
        assert!(store.bios_availability(1).unwrap().unwrap().0);
        assert!(!store.bios_availability(2).unwrap().unwrap().0);
        assert!(store.last_refresh(META_GAMES_REFRESHED_AT).unwrap().is_some());
        assert!(store.has_collections().unwrap());
    }

    #[tokio::test]
    async fn platform_refresh_drives_its_own_progress() {
        let mut api = FakeCatalog::default();
        api.add_platform_games(platform(1, "snes", 3), games_for(1, 3));

        let store = romstash_store::Store::open_in_memory().unwrap();
        store.save_platforms(&[platform(1, "snes", 3)]).unwrap();

        let progress = Progress::new();
        progress.set(0.4); // leftover from an earlier run
        let count = refresh_platform(&api, &store, 1, Some(&progress))
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(progress.get(), 1.0);
        assert_eq!(store.platform_game_count(1).unwrap(), 3);
    }

    #[tokio::test]
    async fn populate_is_idempotent() {
        let mut api = FakeCatalog::default();
        api.add_platform_games(platform(1, "snes", 3), games_for(1, 3));

        let store = romstash_store::Store::open_in_memory().unwrap();
        populate(&api, &store, &Progress::new()).await.unwrap();
        populate(&api, &store, &Progress::new()).await.unwrap();
        assert_eq!(store.platform_game_count(1).unwrap(), 3);
    }

    #[tokio::test]
    async fn one_failing_platform_does_not_cancel_the_rest() {
        let mut api = FakeCatalog::default();
        api.add_platform_games(platform(1, "snes", 3), games_for(1, 3));
        api.add_platform_games(platform(2, "gba", 2), games_for(2, 2));
        api.fail_scopes.push("platform_1".to_string());

        let store = romstash_store::Store::open_in_memory().unwrap();
        let progress = Progress::new();
        let err = populate(&api, &store, &progress).await.unwrap_err();
        assert!(matches!(err, CacheError::Fetch(_)));

        // The healthy platform is cached, but the run is not stamped as a
        // complete games refresh.
        assert_eq!(store.platform_game_count(2).unwrap(), 2);
        assert!(store.last_refresh(META_GAMES_REFRESHED_AT).unwrap().is_none());
        assert_eq!(progress.get(), 1.0);
    }

    #[tokio::test]
    async fn collection_refresh_upserts_without_replacing_platforms() {
        let mut api = FakeCatalog::default();
        api.add_platform_games(platform(1, "snes", 2), games_for(1, 2));
        let shelf = collection(CollectionKind::Regular, 7, "Shelf");
        api.collections = vec![shelf.clone()];
        api.games.insert(
            "collection_7".to_string(),
            vec![game(10_000, 1, "snes"), game(99, 2, "gba")],
        );

        let store = romstash_store::Store::open_in_memory().unwrap();
        populate(&api, &store, &Progress::new()).await.unwrap();

        let count = refresh_collection(&api, &store, &shelf).await.unwrap();
        assert_eq!(count, 2);
        // The upsert pulled in a game from a platform we never listed,
        // without dropping the platform's existing rows.
        assert_eq!(store.platform_game_count(1).unwrap(), 2);
        assert!(store.game_by_id(99).unwrap().is_some());
        assert_eq!(store.collection_game_count(&shelf).unwrap(), 2);
    }
}
