//! The deferred write phase of one update.

use crate::extension::IndexedData;
use crate::index::IndexCore;
use crate::storage::IndexStorage;
use std::fmt::Debug;
use std::hash::Hash;
use strata_core::{HashId, InputId};

/// Where the previous keyset for an input comes from. Resolution is deferred
/// to the commit so it observes the state the write lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OldKeysSource {
    /// The forward map (or the staging table while buffering).
    Forward,
    /// The snapshot mapping, through the contents map.
    Snapshot,
    /// The forward-side read first, falling back to the snapshot mapping
    /// when it yields nothing.
    ForwardThenSnapshot,
}

/// How the commit reconciles new data against the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateStrategy {
    /// Remove every old key, then add every new key.
    Simple(OldKeysSource),
    /// Compare against the saved value map and touch only changed keys.
    Diff,
}

/// A prepared update: everything the write phase needs, independent of the
/// input content. Apply with [`UpdateTask::compute`].
#[must_use = "the update is not applied until compute() runs"]
pub struct UpdateTask<'a, K, V, S> {
    pub(crate) core: &'a IndexCore<K, V, S>,
    pub(crate) input_id: InputId,
    pub(crate) data: IndexedData<K, V>,
    pub(crate) strategy: UpdateStrategy,
    pub(crate) saved_hash: HashId,
}

impl<K, V, S> UpdateTask<'_, K, V, S>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    S: IndexStorage<K, V> + Send + Sync + 'static,
{
    /// Applies the update under the write lock and returns whether it
    /// succeeded. The write phase is not cancellable; a failure logs the
    /// error, requests a rebuild of this index, and reports `false`.
    pub fn compute(self) -> bool {
        match self
            .core
            .update_with_map(self.input_id, &self.data, &self.strategy, self.saved_hash)
        {
            Ok(()) => true,
            Err(err) => {
                tracing::info!(
                    target: "strata.index",
                    index = %self.core.name,
                    input = ?self.input_id,
                    error = %err,
                    "storage update failed"
                );
                self.core.rebuild.request_rebuild(&self.core.name, &err);
                false
            }
        }
    }
}
