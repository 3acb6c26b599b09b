use crate::{content, fixture, get_pairs, open_index, transient_content, update, RecordingRebuild};
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use strata_core::{CancellationToken, InputId};
use strata_index::IndexOptions;

#[test]
fn byte_identical_content_runs_the_indexer_once() {
    let f = fixture(true);

    assert!(update(&f.index, 7, Some("a b")));
    assert!(update(&f.index, 8, Some("a b")));

    assert_eq!(f.indexer_runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        get_pairs(&f.index, "a"),
        vec![(7, "A".to_string()), (8, "A".to_string())]
    );
    assert_eq!(
        get_pairs(&f.index, "b"),
        vec![(7, "B".to_string()), (8, "B".to_string())]
    );
}

#[test]
fn distinct_content_still_runs_the_indexer() {
    let f = fixture(true);

    assert!(update(&f.index, 7, Some("a")));
    assert!(update(&f.index, 8, Some("b")));

    assert_eq!(f.indexer_runs.load(Ordering::SeqCst), 2);
}

#[test]
fn indexed_state_survives_dispose_and_reopen() {
    let f = fixture(true);
    assert!(update(&f.index, 7, Some("a b")));
    f.index.dispose();

    let reopened = open_index(
        f.dir.path(),
        true,
        IndexOptions::default(),
        f.indexer_runs.clone(),
        Arc::new(RecordingRebuild::default()),
    );
    assert_eq!(get_pairs(&reopened, "a"), vec![(7, "A".to_string())]);

    // The contents map still remembers this payload, so indexing it under a
    // new input id reuses the stored result.
    let runs_before = f.indexer_runs.load(Ordering::SeqCst);
    assert!(update(&reopened, 9, Some("a b")));
    assert_eq!(f.indexer_runs.load(Ordering::SeqCst), runs_before);
    assert_eq!(
        get_pairs(&reopened, "a"),
        vec![(7, "A".to_string()), (9, "A".to_string())]
    );
    reopened.dispose();
}

#[test]
fn transient_content_replaces_the_snapshot_backed_keys() {
    let f = fixture(true);
    let token = CancellationToken::new();

    assert!(update(&f.index, 7, Some("a b")));

    let edited = transient_content("a x");
    assert!(f
        .index
        .update(InputId::from_raw(7), Some(&edited), &token)
        .unwrap()
        .compute());

    assert_eq!(get_pairs(&f.index, "a"), vec![(7, "A".to_string())]);
    assert_eq!(get_pairs(&f.index, "b"), vec![]);
    assert_eq!(get_pairs(&f.index, "x"), vec![(7, "X".to_string())]);
}

#[test]
fn extra_sanity_mode_keeps_results_identical() {
    let options = IndexOptions {
        extra_sanity_checks: true,
        ..IndexOptions::default()
    };
    let f = crate::fixture_with(true, options);

    assert!(update(&f.index, 7, Some("a b")));
    assert!(update(&f.index, 8, Some("a b")));

    assert_eq!(
        get_pairs(&f.index, "a"),
        vec![(7, "A".to_string()), (8, "A".to_string())]
    );
}

#[test]
fn precomputed_digest_is_honored() {
    let f = fixture(true);
    let token = CancellationToken::new();

    // Two different payloads carrying the same precomputed digest are treated
    // as identical content by the snapshot machinery.
    let first = content("a b").with_precomputed_digest(vec![1u8; 32]);
    let second = content("c d").with_precomputed_digest(vec![1u8; 32]);

    assert!(f
        .index
        .update(InputId::from_raw(7), Some(&first), &token)
        .unwrap()
        .compute());
    assert!(f
        .index
        .update(InputId::from_raw(8), Some(&second), &token)
        .unwrap()
        .compute());

    assert_eq!(f.indexer_runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        get_pairs(&f.index, "a"),
        vec![(7, "A".to_string()), (8, "A".to_string())]
    );
}
