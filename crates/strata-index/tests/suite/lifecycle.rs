use crate::{fixture, get_pairs, update, RecordingRebuild};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::Weak;
use strata_core::{notify_low_memory, CancellationToken, InputId};
use strata_index::{
    BufferingStateListener, IndexExtension, IndexLayout, IndexName, IndexOptions, IndexStorage,
    InputFilter, MapReduceIndex, ReadContext, ValueContainer,
};
use strata_storage::{ContentHashEnumerator, StorageError, StringExternalizer};

#[test]
fn clear_empties_the_index_and_recreates_backing_files() {
    let f = fixture(true);

    assert!(update(&f.index, 7, Some("x")));
    f.index.flush().unwrap();

    let snapshot_path = f.dir.path().join("index/tokens/fileIdToHashId");
    let contents_path = f.dir.path().join("persistent/tokens/values");
    assert!(snapshot_path.exists());
    assert!(contents_path.exists());
    let old_contents = std::fs::read(&contents_path).unwrap();

    f.index.clear();

    assert_eq!(get_pairs(&f.index, "x"), vec![]);
    assert!(snapshot_path.exists());
    assert!(contents_path.exists());
    assert_ne!(std::fs::read(&contents_path).unwrap(), old_contents);

    // The index stays usable after the reset.
    assert!(update(&f.index, 7, Some("y")));
    assert_eq!(get_pairs(&f.index, "y"), vec![(7, "Y".to_string())]);
    assert_eq!(get_pairs(&f.index, "x"), vec![]);
}

#[test]
fn clear_recreates_the_forward_map_file() {
    let f = fixture(false);

    assert!(update(&f.index, 7, Some("x")));
    f.index.flush().unwrap();
    let forward_path = f.dir.path().join("index/tokens/tokens.inputs");
    assert!(forward_path.exists());

    f.index.clear();
    assert!(forward_path.exists());
    assert_eq!(get_pairs(&f.index, "x"), vec![]);
}

#[test]
fn low_memory_pressure_flushes_dirty_state() {
    let f = fixture(false);
    let storage_path = f.dir.path().join("index/tokens/storage");

    assert!(update(&f.index, 7, Some("a")));
    assert!(!storage_path.exists());

    notify_low_memory();

    assert!(storage_path.exists());
}

/// A storage whose mutations always fail, for exercising the rebuild path.
struct BrokenStorage;

impl IndexStorage<String, String> for BrokenStorage {
    fn add_value(
        &mut self,
        _key: &String,
        _input: InputId,
        _value: String,
    ) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk failure",
        )))
    }

    fn remove_all_values(&mut self, _key: &String, _input: InputId) -> Result<(), StorageError> {
        Ok(())
    }

    fn read(
        &self,
        _ctx: &ReadContext<'_>,
        _key: &String,
    ) -> Result<ValueContainer<String>, StorageError> {
        Ok(ValueContainer::new())
    }

    fn process_keys(
        &self,
        _ctx: &ReadContext<'_>,
        _processor: &mut dyn FnMut(&String) -> bool,
        _filter: Option<&dyn InputFilter>,
    ) -> Result<bool, StorageError> {
        Ok(true)
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn register_buffering_listener(&mut self, _listener: Weak<dyn BufferingStateListener>) {}
}

#[test]
fn commit_failure_requests_a_rebuild_and_reports_false() {
    let dir = tempfile::tempdir().unwrap();
    let rebuilds = Arc::new(RecordingRebuild::default());

    let extension: IndexExtension<String, String> = IndexExtension::new(
        IndexName::new("tokens"),
        Box::new(token_indexer()),
        Arc::new(StringExternalizer),
        Arc::new(StringExternalizer),
    );
    let layout = IndexLayout::new(
        dir.path().join("index/tokens"),
        dir.path().join("persistent/tokens"),
    );
    let index = MapReduceIndex::open(
        extension,
        BrokenStorage,
        layout,
        Arc::new(ContentHashEnumerator::open(dir.path().join("hashes")).unwrap()),
        rebuilds.clone(),
        IndexOptions::default(),
    )
    .unwrap();

    let token = CancellationToken::new();
    let payload = crate::content("a");
    let task = index
        .update(InputId::from_raw(7), Some(&payload), &token)
        .unwrap();
    assert!(!task.compute());
    assert_eq!(rebuilds.requests(), 1);
}

pub(crate) fn token_indexer() -> impl strata_index::DataIndexer<String, String> {
    struct Tokens;
    impl strata_index::DataIndexer<String, String> for Tokens {
        fn map(
            &self,
            content: &strata_index::FileContent,
            token: &CancellationToken,
        ) -> Result<strata_index::IndexedData<String, String>, strata_core::Cancelled> {
            strata_core::check_cancelled(token)?;
            Ok(content
                .text()
                .split_whitespace()
                .map(|word| (word.to_string(), word.to_uppercase()))
                .collect())
        }
    }
    Tokens
}
