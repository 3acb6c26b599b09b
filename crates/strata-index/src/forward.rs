//! The forward (input → keyset) map, buffering-aware.

use crate::extension::KeySet;
use crate::storage::BufferingStateListener;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_core::InputId;
use strata_storage::{DataExternalizer, PersistentMap, StorageError};

/// Wraps the persistent forward map with an in-memory side table that takes
/// over while the index storage buffers mutations.
///
/// The persistent map must stay in sync with the (possibly shadowed) index
/// storage: writing keysets to disk during a buffered session would leave
/// the two disagreeing if the session is later discarded, and subsequent
/// updates would diff against the wrong old keys.
pub(crate) struct ForwardIndex<K> {
    map: PersistentMap<KeySet<K>>,
    staged: Mutex<HashMap<InputId, KeySet<K>>>,
    buffering: AtomicBool,
}

impl<K> ForwardIndex<K>
where
    K: Ord + Clone + Send + Sync + 'static,
{
    pub(crate) fn open(
        path: impl AsRef<Path>,
        keys_externalizer: Arc<dyn DataExternalizer<KeySet<K>>>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            map: PersistentMap::open(path, keys_externalizer)?,
            staged: Mutex::new(HashMap::new()),
            buffering: AtomicBool::new(false),
        })
    }

    pub(crate) fn get(&self, input: InputId) -> Result<Option<KeySet<K>>, StorageError> {
        if self.buffering.load(Ordering::SeqCst) {
            if let Some(keys) = self.staged.lock().get(&input) {
                return Ok(Some(keys.clone()));
            }
        }
        self.map.get(input.to_raw())
    }

    pub(crate) fn put(&self, input: InputId, keys: KeySet<K>) -> Result<(), StorageError> {
        if self.buffering.load(Ordering::SeqCst) {
            self.staged.lock().insert(input, keys);
            Ok(())
        } else {
            self.map.put(input.to_raw(), keys)
        }
    }

    pub(crate) fn remove(&self, input: InputId) -> Result<(), StorageError> {
        if self.buffering.load(Ordering::SeqCst) {
            // Removal is staged as an empty keyset so lookups see it.
            self.staged.lock().insert(input, KeySet::new());
            Ok(())
        } else {
            self.map.remove(input.to_raw())
        }
    }

    pub(crate) fn force(&self) -> Result<(), StorageError> {
        self.map.force()
    }

    pub(crate) fn close(&self) -> Result<(), StorageError> {
        self.map.close()
    }

    pub(crate) fn clean_and_recreate(&self) -> Result<(), StorageError> {
        self.staged.lock().clear();
        self.map.clean_and_recreate()
    }
}

impl<K: Send + Sync> BufferingStateListener for ForwardIndex<K> {
    fn buffering_state_changed(&self, enabled: bool) {
        // Hold the side-table monitor so a mode flip serializes with any
        // in-flight get/put/remove.
        let _staged = self.staged.lock();
        self.buffering.store(enabled, Ordering::SeqCst);
    }

    fn memory_storage_cleared(&self) {
        self.staged.lock().clear();
    }
}
