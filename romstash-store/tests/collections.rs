use romstash_remote::{Collection, CollectionKind, Game};
use romstash_store::Store;

fn collection(kind: CollectionKind, remote_id: Option<i64>, name: &str) -> Collection {
    Collection {
        remote_id,
        virtual_id: None,
        kind,
        name: name.into(),
        rom_count: 0,
        rom_ids: vec![],
        updated_at: None,
        extra: Default::default(),
    }
}

fn virtual_collection(virtual_id: &str, name: &str) -> Collection {
    Collection {
        remote_id: None,
        virtual_id: Some(virtual_id.into()),
        kind: CollectionKind::Virtual,
        name: name.into(),
        rom_count: 0,
        rom_ids: vec![],
        updated_at: None,
        extra: Default::default(),
    }
}

fn game(id: i64) -> Game {
    Game {
        id,
        platform_id: 1,
        platform_fs_slug: "snes".into(),
        name: format!("Game {id}"),
        fs_name: format!("Game {id}.sfc"),
        url_cover: None,
        updated_at: None,
        extra: Default::default(),
    }
}

#[test]
fn kinds_share_a_numeric_id_space_without_collisions() {
    let store = Store::open_in_memory().unwrap();
    store
        .save_collections(&[
            collection(CollectionKind::Regular, Some(1), "Shelf"),
            collection(CollectionKind::Smart, Some(1), "Recent"),
            virtual_collection("genre-rpg", "RPG"),
        ])
        .unwrap();

    let regular = store
        .collection_by_remote_id(CollectionKind::Regular, 1)
        .unwrap()
        .unwrap();
    let smart = store
        .collection_by_remote_id(CollectionKind::Smart, 1)
        .unwrap()
        .unwrap();
    assert_eq!(regular.name, "Shelf");
    assert_eq!(smart.name, "Recent");

    let rpg = store.collection_by_virtual_id("genre-rpg").unwrap().unwrap();
    assert_eq!(rpg.name, "RPG");
    assert_eq!(store.collections().unwrap().len(), 3);
}

#[test]
fn resave_updates_rather_than_duplicates() {
    let store = Store::open_in_memory().unwrap();
    let mut shelf = collection(CollectionKind::Regular, Some(1), "Shelf");
    store.save_collections(std::slice::from_ref(&shelf)).unwrap();

    shelf.name = "Renamed Shelf".into();
    shelf.rom_count = 12;
    store.save_collections(&[shelf]).unwrap();

    let rows = store.collections_by_kind(CollectionKind::Regular).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Renamed Shelf");
    assert_eq!(rows[0].rom_count, 12);
}

#[test]
fn mapping_rebuild_is_chunked_and_deduplicated() {
    let store = Store::open_in_memory().unwrap();

    let mut big = collection(CollectionKind::Regular, Some(1), "Big");
    // 950 distinct pairs plus 50 repeat attempts of pairs already in the
    // list: 1000 inserts across three chunks.
    let mut ids: Vec<i64> = (1..=950).collect();
    ids.extend(901..=950);
    big.rom_ids = ids;
    let mut overlap = collection(CollectionKind::Smart, Some(2), "Overlap");
    overlap.rom_ids = (901..=950).collect();

    store
        .save_collections(&[big.clone(), overlap.clone()])
        .unwrap();
    store
        .save_all_collection_mappings(&[big.clone(), overlap.clone()])
        .unwrap();

    // Repeats within a collection collapse to one pair each; the overlap
    // with the smart collection is a different pair, so it does not.
    assert_eq!(store.collection_game_count(&big).unwrap(), 950);
    assert_eq!(store.collection_game_count(&overlap).unwrap(), 50);

    // A second rebuild starts from scratch, so counts are stable.
    store.save_all_collection_mappings(&[big.clone(), overlap]).unwrap();
    assert_eq!(store.collection_game_count(&big).unwrap(), 950);
}

#[test]
fn collection_games_joins_against_cached_games() {
    let store = Store::open_in_memory().unwrap();
    store
        .save_platform_games(1, &[game(1), game(2), game(3)])
        .unwrap();

    let mut shelf = collection(CollectionKind::Regular, Some(9), "Shelf");
    shelf.rom_ids = vec![2, 3, 404];
    store.save_collections(std::slice::from_ref(&shelf)).unwrap();
    store
        .save_all_collection_mappings(std::slice::from_ref(&shelf))
        .unwrap();

    // Memberships pointing at games we never cached are simply absent.
    let games = store.collection_games(&shelf).unwrap();
    let ids: Vec<i64> = games.iter().map(|g| g.id).collect();
    assert_eq!(ids, vec![2, 3]);
    assert!(store.has_collection_games(&shelf).unwrap());
}

#[test]
fn per_collection_rebuild_leaves_others_alone() {
    let store = Store::open_in_memory().unwrap();
    let mut a = collection(CollectionKind::Regular, Some(1), "A");
    a.rom_ids = vec![1, 2];
    let mut b = collection(CollectionKind::Regular, Some(2), "B");
    b.rom_ids = vec![3];

    store.save_collections(&[a.clone(), b.clone()]).unwrap();
    store
        .save_all_collection_mappings(&[a.clone(), b.clone()])
        .unwrap();

    store.save_collection_games(&a, &[5]).unwrap();
    assert_eq!(store.collection_game_count(&a).unwrap(), 1);
    assert_eq!(store.collection_game_count(&b).unwrap(), 1);
}
