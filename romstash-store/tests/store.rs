use romstash_remote::{Collection, CollectionKind, Game, Platform};
use romstash_store::{ArtworkEntry, META_GAMES_REFRESHED_AT, Store};

fn platform(id: i64, slug: &str) -> Platform {
    Platform {
        id,
        slug: slug.into(),
        fs_slug: slug.into(),
        name: slug.to_uppercase(),
        custom_name: String::new(),
        rom_count: 0,
        has_bios: false,
        updated_at: None,
        extra: Default::default(),
    }
}

fn game(id: i64, platform_id: i64) -> Game {
    Game {
        id,
        platform_id,
        platform_fs_slug: "snes".into(),
        name: format!("Game {id}"),
        fs_name: String::new(),
        url_cover: None,
        updated_at: None,
        extra: Default::default(),
    }
}

#[test]
fn emptiness_tracks_games_not_platforms() {
    let store = Store::open_in_memory().unwrap();
    assert!(store.is_empty().unwrap());

    store.save_platforms(&[platform(1, "snes")]).unwrap();
    assert!(store.is_empty().unwrap());

    store.save_platform_games(1, &[game(1, 1)]).unwrap();
    assert!(!store.is_empty().unwrap());
    assert!(store.has_games().unwrap());
}

#[test]
fn scoped_clears_only_touch_their_tables() {
    let store = Store::open_in_memory().unwrap();
    store.save_platforms(&[platform(1, "snes")]).unwrap();
    store.save_platform_games(1, &[game(1, 1)]).unwrap();
    let shelf = Collection {
        remote_id: Some(1),
        virtual_id: None,
        kind: CollectionKind::Regular,
        name: "Shelf".into(),
        rom_count: 1,
        rom_ids: vec![1],
        updated_at: None,
        extra: Default::default(),
    };
    store.save_collections(std::slice::from_ref(&shelf)).unwrap();
    store
        .save_all_collection_mappings(std::slice::from_ref(&shelf))
        .unwrap();

    store.clear_games().unwrap();
    assert!(!store.has_games().unwrap());
    assert!(store.has_collections().unwrap());
    assert_eq!(store.collection_game_count(&shelf).unwrap(), 0);
    assert_eq!(store.platforms().unwrap().len(), 1);

    store.clear_all().unwrap();
    assert!(store.platforms().unwrap().is_empty());
    assert!(!store.has_collections().unwrap());
}

#[test]
fn refresh_stamps_round_trip() {
    let store = Store::open_in_memory().unwrap();
    assert!(store.last_refresh(META_GAMES_REFRESHED_AT).unwrap().is_none());

    store.record_refresh(META_GAMES_REFRESHED_AT).unwrap();
    let stamped = store.last_refresh(META_GAMES_REFRESHED_AT).unwrap().unwrap();
    assert!((chrono::Utc::now() - stamped).num_seconds() < 5);

    let all = store.all_refresh_times().unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().any(|(k, t)| *k == META_GAMES_REFRESHED_AT && t.is_some()));
}

#[test]
fn bios_flags_are_last_write_wins() {
    let store = Store::open_in_memory().unwrap();
    assert!(store.bios_availability(1).unwrap().is_none());

    store.set_bios_availability(1, true).unwrap();
    store.set_bios_availability(1, false).unwrap();
    let (has_bios, checked_at) = store.bios_availability(1).unwrap().unwrap();
    assert!(!has_bios);
    assert!(checked_at.is_some());
}

#[test]
fn artwork_rows_round_trip() {
    let store = Store::open_in_memory().unwrap();
    let entry = ArtworkEntry {
        platform_fs_slug: "snes".into(),
        game_id: 7,
        file_path: "/art/snes/7.png".into(),
        file_size_bytes: 1024,
    };
    store.mark_artwork_cached(&entry).unwrap();

    assert!(store.is_artwork_cached("snes", 7).unwrap());
    assert!(!store.is_artwork_cached("snes", 8).unwrap());
    assert!(store.has_platform_artwork("snes").unwrap());
    assert_eq!(store.artwork_count().unwrap(), 1);

    let rows = store.artwork_entries(Some("snes")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].file_path, "/art/snes/7.png");

    store.remove_artwork("snes", 7).unwrap();
    assert_eq!(store.artwork_count().unwrap(), 0);
}

#[test]
fn stats_record_hits_and_misses() {
    let store = Store::open_in_memory().unwrap();
    let _ = store.game_by_id(1).unwrap(); // miss
    store.save_platform_games(1, &[game(1, 1)]).unwrap();
    let _ = store.game_by_id(1).unwrap(); // hit

    let stats = store.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.errors, 0);
    assert!(stats.last_access.is_some());
}
