use crate::{disk_state, fixture, get_pairs, update};
use pretty_assertions::assert_eq;

#[test]
fn update_associates_each_token_with_the_input() {
    let f = fixture(false);

    assert!(update(&f.index, 7, Some("a b c")));

    assert_eq!(get_pairs(&f.index, "a"), vec![(7, "A".to_string())]);
    assert_eq!(get_pairs(&f.index, "b"), vec![(7, "B".to_string())]);
    assert_eq!(get_pairs(&f.index, "c"), vec![(7, "C".to_string())]);
    assert_eq!(get_pairs(&f.index, "missing"), vec![]);
}

#[test]
fn second_update_drops_stale_keys_and_adds_new_ones() {
    let f = fixture(false);

    assert!(update(&f.index, 7, Some("a b c")));
    assert!(update(&f.index, 7, Some("b c d")));

    assert_eq!(get_pairs(&f.index, "a"), vec![]);
    assert_eq!(get_pairs(&f.index, "b"), vec![(7, "B".to_string())]);
    assert_eq!(get_pairs(&f.index, "c"), vec![(7, "C".to_string())]);
    assert_eq!(get_pairs(&f.index, "d"), vec![(7, "D".to_string())]);
}

#[test]
fn second_update_diffs_on_the_snapshot_path_too() {
    let f = fixture(true);

    assert!(update(&f.index, 7, Some("a b c")));
    assert!(update(&f.index, 7, Some("b c d")));

    assert_eq!(get_pairs(&f.index, "a"), vec![]);
    assert_eq!(get_pairs(&f.index, "d"), vec![(7, "D".to_string())]);
}

#[test]
fn null_content_removes_every_association() {
    for snapshot_mapping in [false, true] {
        let f = fixture(snapshot_mapping);

        assert!(update(&f.index, 7, Some("a b")));
        assert!(update(&f.index, 7, None));

        assert_eq!(get_pairs(&f.index, "a"), vec![]);
        assert_eq!(get_pairs(&f.index, "b"), vec![]);

        let mut keys = Vec::new();
        f.index
            .process_all_keys(
                |key| {
                    keys.push(key.clone());
                    true
                },
                None,
            )
            .unwrap();
        assert_eq!(keys, Vec::<String>::new());
    }
}

#[test]
fn repeated_update_is_idempotent_on_disk() {
    for snapshot_mapping in [false, true] {
        let f = fixture(snapshot_mapping);

        assert!(update(&f.index, 7, Some("a b c")));
        f.index.flush().unwrap();
        let once = disk_state(f.dir.path());

        assert!(update(&f.index, 7, Some("a b c")));
        f.index.flush().unwrap();
        let twice = disk_state(f.dir.path());

        assert_eq!(once, twice);
    }
}

#[test]
fn process_all_keys_visits_every_key_and_honors_short_circuit() {
    let f = fixture(false);
    assert!(update(&f.index, 1, Some("a b")));
    assert!(update(&f.index, 2, Some("c")));

    let mut keys = Vec::new();
    let finished = f
        .index
        .process_all_keys(
            |key| {
                keys.push(key.clone());
                true
            },
            None,
        )
        .unwrap();
    assert!(finished);
    keys.sort();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string(), "c".to_string()]);

    let mut seen = 0;
    let finished = f
        .index
        .process_all_keys(
            |_key| {
                seen += 1;
                false
            },
            None,
        )
        .unwrap();
    assert!(!finished);
    assert_eq!(seen, 1);
}

#[test]
fn updates_for_different_inputs_accumulate_per_key() {
    let f = fixture(false);

    assert!(update(&f.index, 1, Some("shared only1")));
    assert!(update(&f.index, 2, Some("shared only2")));

    assert_eq!(
        get_pairs(&f.index, "shared"),
        vec![(1, "SHARED".to_string()), (2, "SHARED".to_string())]
    );
    assert_eq!(get_pairs(&f.index, "only1"), vec![(1, "ONLY1".to_string())]);
    assert_eq!(get_pairs(&f.index, "only2"), vec![(2, "ONLY2".to_string())]);
}
