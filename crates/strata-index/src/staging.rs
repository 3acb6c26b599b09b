//! Per-input keyset staging, active while the storage buffers in memory.

use crate::extension::KeySet;
use crate::storage::BufferingStateListener;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use strata_core::InputId;

/// Remembers the keyset each input produced during a buffered session.
/// Guarded by its own monitor because buffering-state notifications can
/// arrive from other threads than the writer.
pub(crate) struct StagingTable<K> {
    buffering: AtomicBool,
    keys: Mutex<HashMap<InputId, KeySet<K>>>,
}

impl<K: Ord + Clone> StagingTable<K> {
    pub(crate) fn new() -> Self {
        Self {
            buffering: AtomicBool::new(false),
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn is_buffering(&self) -> bool {
        self.buffering.load(Ordering::SeqCst)
    }

    pub(crate) fn get(&self, input: InputId) -> Option<KeySet<K>> {
        self.keys.lock().get(&input).cloned()
    }

    pub(crate) fn put(&self, input: InputId, keys: KeySet<K>) {
        self.keys.lock().insert(input, keys);
    }
}

impl<K: Send + Sync> BufferingStateListener for StagingTable<K> {
    fn buffering_state_changed(&self, enabled: bool) {
        self.buffering.store(enabled, Ordering::SeqCst);
    }

    fn memory_storage_cleared(&self) {
        self.keys.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_keys_are_dropped_when_memory_is_cleared() {
        let staging: StagingTable<String> = StagingTable::new();
        let input = InputId::from_raw(3);

        staging.buffering_state_changed(true);
        assert!(staging.is_buffering());

        staging.put(input, ["k".to_string()].into_iter().collect());
        assert!(staging.get(input).is_some());

        staging.memory_storage_cleared();
        assert_eq!(staging.get(input), None);
    }
}
