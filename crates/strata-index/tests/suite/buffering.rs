use crate::{fixture, get_pairs, update};
use pretty_assertions::assert_eq;

#[test]
fn buffered_updates_are_visible_then_discarded() {
    let f = fixture(false);

    f.index.storage().read().set_buffering_enabled(true);
    assert!(update(&f.index, 7, Some("a")));

    assert_eq!(get_pairs(&f.index, "a"), vec![(7, "A".to_string())]);

    f.index.storage().read().set_buffering_enabled(false);
    f.index.storage().write().drop_memory_data();

    assert_eq!(get_pairs(&f.index, "a"), vec![]);
}

#[test]
fn buffered_session_leaves_persistent_maps_untouched() {
    let f = fixture(false);
    let forward_path = f.dir.path().join("index/tokens/tokens.inputs");

    f.index.storage().read().set_buffering_enabled(true);
    assert!(update(&f.index, 7, Some("a b")));
    f.index.flush().unwrap();

    // The forward map took no writes, so it has nothing to persist yet.
    assert!(!forward_path.exists());

    f.index.storage().read().set_buffering_enabled(false);
    f.index.storage().write().drop_memory_data();
    f.index.flush().unwrap();
    assert!(!forward_path.exists());
}

#[test]
fn buffered_session_keeps_the_snapshot_map_clean_too() {
    let f = fixture(true);
    let snapshot_path = f.dir.path().join("index/tokens/fileIdToHashId");

    f.index.storage().read().set_buffering_enabled(true);
    assert!(update(&f.index, 7, Some("a b")));
    f.index.flush().unwrap();

    assert!(!snapshot_path.exists());
}

#[test]
fn second_buffered_update_diffs_against_staged_keys() {
    let f = fixture(false);

    f.index.storage().read().set_buffering_enabled(true);
    assert!(update(&f.index, 7, Some("a b")));
    assert!(update(&f.index, 7, Some("b c")));

    assert_eq!(get_pairs(&f.index, "a"), vec![]);
    assert_eq!(get_pairs(&f.index, "b"), vec![(7, "B".to_string())]);
    assert_eq!(get_pairs(&f.index, "c"), vec![(7, "C".to_string())]);
}

#[test]
fn discarded_session_restores_the_pre_buffer_state() {
    let f = fixture(false);

    assert!(update(&f.index, 7, Some("a b")));

    f.index.storage().read().set_buffering_enabled(true);
    assert!(update(&f.index, 7, Some("c")));
    assert_eq!(get_pairs(&f.index, "a"), vec![]);
    assert_eq!(get_pairs(&f.index, "c"), vec![(7, "C".to_string())]);

    f.index.storage().read().set_buffering_enabled(false);
    f.index.storage().write().drop_memory_data();

    assert_eq!(get_pairs(&f.index, "a"), vec![(7, "A".to_string())]);
    assert_eq!(get_pairs(&f.index, "b"), vec![(7, "B".to_string())]);
    assert_eq!(get_pairs(&f.index, "c"), vec![]);
}
