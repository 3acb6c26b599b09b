use crate::{content, fixture, get_pairs, RecordingRebuild};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata_core::{CancellationToken, Cancelled, InputId};
use strata_index::{
    DataIndexer, FileContent, IndexError, IndexExtension, IndexLayout, IndexName, IndexOptions,
    IndexedData, MapIndexStorage, MapReduceIndex, MemoryIndexStorage,
};
use strata_storage::{ContentHashEnumerator, StringExternalizer};

#[test]
fn cancelled_token_aborts_preparation() {
    let f = fixture(true);
    let token = CancellationToken::new();
    token.cancel();

    let payload = content("a b");
    let result = f
        .index
        .update(InputId::from_raw(7), Some(&payload), &token);
    assert!(matches!(result, Err(IndexError::Cancelled(Cancelled))));

    // Nothing reached the persistent maps or the storage.
    f.index.flush().unwrap();
    assert_eq!(get_pairs(&f.index, "a"), vec![]);
    assert!(!f.dir.path().join("index/tokens/fileIdToHashId").exists());
    assert!(!f.dir.path().join("persistent/tokens/values").exists());
    assert_eq!(f.indexer_runs.load(Ordering::SeqCst), 0);
}

/// Cancels its own token partway through mapping, like an indexer that polls
/// a cancellation facility while parsing.
struct SelfCancellingIndexer {
    runs: Arc<AtomicUsize>,
}

impl DataIndexer<String, String> for SelfCancellingIndexer {
    fn map(
        &self,
        _content: &FileContent,
        token: &CancellationToken,
    ) -> Result<IndexedData<String, String>, Cancelled> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        token.cancel();
        Err(Cancelled)
    }
}

fn self_cancelling_index(
    root: &std::path::Path,
    runs: Arc<AtomicUsize>,
) -> MapReduceIndex<String, String, MemoryIndexStorage<String, String, MapIndexStorage<String, String>>>
{
    let extension: IndexExtension<String, String> = IndexExtension::new(
        IndexName::new("tokens"),
        Box::new(SelfCancellingIndexer { runs }),
        Arc::new(StringExternalizer),
        Arc::new(StringExternalizer),
    )
    .with_snapshot_mapping();
    let layout = IndexLayout::new(root.join("index/tokens"), root.join("persistent/tokens"));
    let backing = MapIndexStorage::open(
        root.join("index/tokens/storage"),
        Arc::new(StringExternalizer),
        Arc::new(StringExternalizer),
    )
    .unwrap();
    MapReduceIndex::open(
        extension,
        MemoryIndexStorage::new(backing),
        layout,
        Arc::new(ContentHashEnumerator::open(root.join("hashes")).unwrap()),
        Arc::new(RecordingRebuild::default()),
        IndexOptions::default(),
    )
    .unwrap()
}

#[test]
fn cancellation_during_the_indexer_leaves_no_trace() {
    let dir = tempfile::tempdir().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let index = self_cancelling_index(dir.path(), runs.clone());
    let token = CancellationToken::new();

    let payload = content("a b");
    let result = index.update(InputId::from_raw(7), Some(&payload), &token);
    assert!(matches!(result, Err(IndexError::Cancelled(Cancelled))));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // The contents map was never written: the indexer raised before the
    // serialized payload could be recorded.
    index.flush().unwrap();
    assert!(!dir.path().join("persistent/tokens/values").exists());
    assert!(!dir.path().join("index/tokens/fileIdToHashId").exists());

    assert_eq!(get_pairs(&index, "a"), vec![]);
}
