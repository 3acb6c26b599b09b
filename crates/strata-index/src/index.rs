//! The map-reduce index engine.

use crate::container::ValueContainer;
use crate::content::FileContent;
use crate::contents::ContentsMap;
use crate::error::IndexError;
use crate::extension::{DataIndexer, IndexExtension, IndexName, IndexedData, KeySet};
use crate::forward::ForwardIndex;
use crate::hash::hash_of_content;
use crate::layout::{check_version_stamp, IndexLayout, IndexLock};
use crate::sanity::{build_diff, check_value_round_trip};
use crate::staging::StagingTable;
use crate::storage::{BufferingStateListener, IndexStorage, InputFilter, ReadContext};
use crate::update::{OldKeysSource, UpdateStrategy, UpdateTask};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::hash::Hash;
use std::path::Path;
use std::sync::{Arc, Weak};
use strata_core::{check_cancelled, Cancelled, CancellationToken, HashId, InputId, LowMemoryWatcher};
use strata_storage::{
    delete_files_starting_with, ContentHashEnumerator, DataExternalizer, PersistentMap,
    StorageError, StringExternalizer, U32Externalizer,
};

/// Receives out-of-band rebuild requests when an index detects it can no
/// longer trust its stored state.
pub trait RebuildNotifier: Send + Sync {
    fn request_rebuild(&self, index: &IndexName, error: &StorageError);
}

/// Logs rebuild requests; hosts that can actually rebuild install their own
/// notifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingRebuildNotifier;

impl RebuildNotifier for LoggingRebuildNotifier {
    fn request_rebuild(&self, index: &IndexName, error: &StorageError) {
        tracing::warn!(
            target: "strata.index",
            index = %index,
            error = %error,
            "index rebuild requested"
        );
    }
}

/// Engine tunables.
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Read previously stored indexer output for a known content hash
    /// instead of running the indexer.
    pub read_saved_data: bool,
    /// Cross-check saved data against a fresh indexer run and verify
    /// externalizer round-trips. Diagnostic; expensive.
    pub extra_sanity_checks: bool,
    /// On the snapshot path, diff old and new value maps and touch only
    /// changed keys instead of rewriting the whole keyset.
    pub diff_update: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            read_saved_data: true,
            extra_sanity_checks: false,
            diff_update: true,
        }
    }
}

pub(crate) struct IndexCore<K, V, S> {
    pub(crate) name: IndexName,
    indexer: Box<dyn DataIndexer<K, V>>,
    value_externalizer: Arc<dyn DataExternalizer<V>>,
    snapshot_mapping: bool,
    parse_backed: bool,
    options: IndexOptions,
    pub(crate) storage: RwLock<S>,
    contents: Option<ContentsMap<K, V>>,
    snapshot: Option<PersistentMap<u32>>,
    trace: Option<PersistentMap<String>>,
    forward: Arc<ForwardIndex<K>>,
    staging: Arc<StagingTable<K>>,
    hashes: Arc<ContentHashEnumerator>,
    pub(crate) rebuild: Arc<dyn RebuildNotifier>,
}

/// A durable, incrementally updated inverted index: keys extracted from file
/// contents map to the set of inputs containing them, with per-key values.
///
/// One writer at a time commits through [`UpdateTask::compute`]; readers run
/// in parallel under the read lock. With snapshot mapping enabled, identical
/// payloads share one stored indexer output keyed by content hash, so
/// re-indexing an already-seen payload skips the indexer entirely.
pub struct MapReduceIndex<K, V, S> {
    core: Arc<IndexCore<K, V, S>>,
    low_memory_flusher: LowMemoryWatcher,
    _lock: IndexLock,
}

impl<K, V, S> MapReduceIndex<K, V, S>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    S: IndexStorage<K, V> + Send + Sync + 'static,
{
    pub fn open(
        extension: IndexExtension<K, V>,
        mut storage: S,
        layout: IndexLayout,
        hashes: Arc<ContentHashEnumerator>,
        rebuild: Arc<dyn RebuildNotifier>,
        options: IndexOptions,
    ) -> Result<Self, StorageError> {
        layout.ensure_dirs()?;
        let lock = IndexLock::acquire(&layout.lock_path())?;
        check_version_stamp(&layout, extension.format_version)?;

        let IndexExtension {
            name,
            indexer,
            value_externalizer,
            keys_externalizer,
            snapshot_mapping,
            parse_backed,
            format_version: _,
        } = extension;

        let contents = if snapshot_mapping {
            Some(ContentsMap::open(
                layout.contents_map_path(),
                value_externalizer.clone(),
                keys_externalizer.clone(),
            )?)
        } else {
            None
        };
        let snapshot = if snapshot_mapping {
            Some(open_map_or_reset(
                &layout.snapshot_map_path(),
                Arc::new(U32Externalizer),
            )?)
        } else {
            None
        };
        let trace = if snapshot_mapping && options.extra_sanity_checks {
            Some(open_map_or_reset(
                &layout.trace_map_path(),
                Arc::new(StringExternalizer),
            )?)
        } else {
            None
        };

        let forward = Arc::new(ForwardIndex::open(
            layout.forward_map_path(&name),
            keys_externalizer,
        )?);
        let staging = Arc::new(StagingTable::new());

        let forward_dyn: Arc<dyn BufferingStateListener> = forward.clone();
        let staging_dyn: Arc<dyn BufferingStateListener> = staging.clone();
        let forward_listener: Weak<dyn BufferingStateListener> = Arc::downgrade(&forward_dyn);
        let staging_listener: Weak<dyn BufferingStateListener> = Arc::downgrade(&staging_dyn);
        storage.register_buffering_listener(forward_listener);
        storage.register_buffering_listener(staging_listener);

        let core = Arc::new(IndexCore {
            name,
            indexer,
            value_externalizer,
            snapshot_mapping,
            parse_backed,
            options,
            storage: RwLock::new(storage),
            contents,
            snapshot,
            trace,
            forward,
            staging,
            hashes,
            rebuild,
        });

        let low_memory_flusher = {
            let core = Arc::downgrade(&core);
            LowMemoryWatcher::register(move || {
                let Some(core) = core.upgrade() else { return };
                if let Err(err) = core.flush() {
                    tracing::info!(
                        target: "strata.index",
                        index = %core.name,
                        error = %err,
                        "flush on low memory failed"
                    );
                    core.rebuild.request_rebuild(&core.name, &err);
                }
            })
        };

        Ok(Self {
            core,
            low_memory_flusher,
            _lock: lock,
        })
    }

    pub fn name(&self) -> &IndexName {
        &self.core.name
    }

    /// The underlying storage, for hosts that drive buffering sessions.
    pub fn storage(&self) -> &RwLock<S> {
        &self.core.storage
    }

    /// Prepares an update of `input_id` to `content` (`None` deletes the
    /// input). Preparation runs without the write lock and honors `token`;
    /// the returned task performs the write phase.
    pub fn update<'a>(
        &'a self,
        input_id: InputId,
        content: Option<&FileContent>,
        token: &CancellationToken,
    ) -> Result<UpdateTask<'a, K, V, S>, IndexError> {
        self.core.prepare_update(input_id, content, token)
    }

    /// The container for `key`; empty when the key is unknown.
    pub fn get_data(&self, key: &K) -> Result<ValueContainer<V>, StorageError> {
        let storage = self.core.storage.read();
        storage.read(&ReadContext::new(&self.core.name), key)
    }

    /// Feeds every key to `processor` until it returns `false`; reports
    /// whether iteration ran to completion.
    pub fn process_all_keys(
        &self,
        mut processor: impl FnMut(&K) -> bool,
        filter: Option<&dyn InputFilter>,
    ) -> Result<bool, StorageError> {
        let storage = self.core.storage.read();
        storage.process_keys(&ReadContext::new(&self.core.name), &mut processor, filter)
    }

    /// Forces every dirty persistent map, then the storage.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.core.flush()
    }

    /// Clears the storage and resets each persistent map to a fresh, empty
    /// backing file. Failures are logged; every map gets a best-effort reset.
    pub fn clear(&self) {
        self.core.clear();
    }

    /// Closes the storage and every persistent map. Terminal.
    pub fn dispose(self) {
        let Self {
            core,
            low_memory_flusher,
            _lock,
        } = self;
        low_memory_flusher.stop();

        let mut storage = core.storage.write();
        if let Err(err) = storage.close() {
            tracing::error!(
                target: "strata.index",
                index = %core.name,
                error = %err,
                "failed to close index storage"
            );
        }
        drop(storage);
        core.close_maps();
    }
}

fn open_map_or_reset<V: Clone + Send + 'static>(
    path: &Path,
    externalizer: Arc<dyn DataExternalizer<V>>,
) -> Result<PersistentMap<V>, StorageError> {
    PersistentMap::open(path, externalizer).map_err(|err| {
        let _ = delete_files_starting_with(path);
        err
    })
}

impl<K, V, S> IndexCore<K, V, S>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    S: IndexStorage<K, V> + Send + Sync + 'static,
{
    fn prepare_update<'a>(
        &'a self,
        input_id: InputId,
        content: Option<&FileContent>,
        token: &CancellationToken,
    ) -> Result<UpdateTask<'a, K, V, S>, IndexError> {
        let physical_content = content.map_or(true, FileContent::is_physical);

        let mut data: Option<IndexedData<K, V>> = None;
        let mut have_persistent_data = false;
        let mut hash_id: Option<HashId> = None;
        let mut skipped_reading_but_may_have_it = false;

        if physical_content {
            if let (Some(contents), Some(content)) = (self.contents.as_ref(), content) {
                let hash = hash_of_content(content, self.parse_backed, &self.hashes)?;
                hash_id = Some(hash);
                if self.options.read_saved_data {
                    // A busy contents map means a concurrent reader holds its
                    // monitor; recomputing is cheaper than blocking on it.
                    if !contents.is_busy_reading() || self.options.extra_sanity_checks {
                        if let Some(saved) = contents.get(hash)? {
                            if self.options.extra_sanity_checks {
                                self.verify_saved_data(content, token, hash, &saved)?;
                            }
                            data = Some(saved);
                            have_persistent_data = true;
                        }
                    } else {
                        skipped_reading_but_may_have_it = true;
                    }
                } else {
                    have_persistent_data = contents.contains(hash)?;
                }
            }
        }

        check_cancelled(token)?;

        let data = match data {
            Some(data) => data,
            None => {
                let data = match content {
                    Some(content) => self.indexer.map(content, token)?,
                    None => IndexedData::new(),
                };
                if self.options.extra_sanity_checks {
                    check_value_round_trip(self.value_externalizer.as_ref(), &self.name, &data);
                }
                data
            }
        };

        if let (Some(hash), Some(contents)) = (hash_id, self.contents.as_ref()) {
            if !have_persistent_data {
                let saved = contents.save(hash, &data, skipped_reading_but_may_have_it)?;
                if saved && self.options.extra_sanity_checks {
                    self.record_indexing_trace(hash, content);
                }
            }
        }

        check_cancelled(token)?;

        let (strategy, saved_hash) = if self.snapshot_mapping {
            if physical_content {
                let strategy = if self.options.diff_update {
                    UpdateStrategy::Diff
                } else {
                    UpdateStrategy::Simple(OldKeysSource::Snapshot)
                };
                (strategy, hash_id.unwrap_or(HashId::NULL))
            } else {
                (
                    UpdateStrategy::Simple(OldKeysSource::ForwardThenSnapshot),
                    HashId::NULL,
                )
            }
        } else {
            (UpdateStrategy::Simple(OldKeysSource::Forward), HashId::NULL)
        };

        Ok(UpdateTask {
            core: self,
            input_id,
            data,
            strategy,
            saved_hash,
        })
    }

    fn verify_saved_data(
        &self,
        content: &FileContent,
        token: &CancellationToken,
        hash: HashId,
        saved: &IndexedData<K, V>,
    ) -> Result<(), Cancelled> {
        let fresh = self.indexer.map(content, token)?;
        if &fresh != saved {
            let previous = self
                .trace
                .as_ref()
                .and_then(|trace| trace.get(hash.to_raw()).ok().flatten())
                .unwrap_or_default();
            tracing::error!(
                target: "strata.index",
                index = %self.name,
                file = content.name(),
                file_type = content.file_type(),
                charset = content.charset(),
                diff = %build_diff(saved, &fresh),
                previous = %previous,
                "saved indexed data differs from a fresh indexer run"
            );
        }
        Ok(())
    }

    fn record_indexing_trace(&self, hash: HashId, content: Option<&FileContent>) {
        let (Some(trace), Some(content)) = (self.trace.as_ref(), content) else {
            return;
        };
        let entry = format!(
            "{},{},{},{}",
            content.charset(),
            content.file_type(),
            content.name(),
            std::backtrace::Backtrace::force_capture()
        );
        if let Err(err) = trace.put(hash.to_raw(), entry) {
            tracing::error!(
                target: "strata.index",
                index = %self.name,
                error = %err,
                "failed to record indexing trace"
            );
        }
    }

    /// The write phase. Runs entirely under the write lock; errors wrap as
    /// storage faults for the caller to convert into a rebuild request.
    pub(crate) fn update_with_map(
        &self,
        input_id: InputId,
        data: &IndexedData<K, V>,
        strategy: &UpdateStrategy,
        saved_hash: HashId,
    ) -> Result<(), StorageError> {
        let mut storage = self.storage.write();
        match strategy {
            UpdateStrategy::Simple(source) => {
                // Retained keys may carry changed values; they are removed
                // and re-added along with everything else.
                let old_keys = self.resolve_old_keys(*source, input_id)?;
                for key in &old_keys {
                    storage.remove_all_values(key, input_id)?;
                }
                for (key, value) in data {
                    storage.add_value(key, input_id, value.clone())?;
                }
            }
            UpdateStrategy::Diff => {
                let current = self.saved_value_map(input_id)?;
                for (key, old_value) in &current {
                    if data.get(key) != Some(old_value) {
                        storage.remove_all_values(key, input_id)?;
                    }
                }
                for (key, new_value) in data {
                    if current.get(key) != Some(new_value) {
                        storage.add_value(key, input_id, new_value.clone())?;
                    }
                }
            }
        }
        self.save_mapping(&storage, input_id, data, saved_hash)
    }

    fn save_mapping(
        &self,
        storage: &S,
        input_id: InputId,
        data: &IndexedData<K, V>,
        saved_hash: HashId,
    ) -> Result<(), StorageError> {
        let physical = !storage.is_buffering();
        let new_keys: KeySet<K> = data.keys().cloned().collect();

        if self.staging.is_buffering() {
            self.staging.put(input_id, new_keys.clone());
        }

        if self.snapshot_mapping && physical {
            if let Some(snapshot) = &self.snapshot {
                snapshot.put(input_id.to_raw(), saved_hash.to_raw())?;
            }
            Ok(())
        } else if !new_keys.is_empty() {
            self.forward.put(input_id, new_keys)
        } else {
            self.forward.remove(input_id)
        }
    }

    fn resolve_old_keys(
        &self,
        source: OldKeysSource,
        input_id: InputId,
    ) -> Result<KeySet<K>, StorageError> {
        match source {
            OldKeysSource::Forward => Ok(self.read_input_keys(input_id)?.unwrap_or_default()),
            OldKeysSource::Snapshot => self.keys_for_snapshot(input_id),
            OldKeysSource::ForwardThenSnapshot => match self.read_input_keys(input_id)? {
                Some(keys) => Ok(keys),
                None => self.keys_for_snapshot(input_id),
            },
        }
    }

    /// The forward-side view of an input's keys: the staging table while
    /// buffering, nothing on the snapshot path (the snapshot mapping owns
    /// those keys), the forward map otherwise.
    fn read_input_keys(&self, input_id: InputId) -> Result<Option<KeySet<K>>, StorageError> {
        if self.staging.is_buffering() {
            if let Some(keys) = self.staging.get(input_id) {
                return Ok(Some(keys));
            }
        }
        if self.snapshot_mapping {
            return Ok(None);
        }
        self.forward.get(input_id)
    }

    fn keys_for_snapshot(&self, input_id: InputId) -> Result<KeySet<K>, StorageError> {
        Ok(self
            .saved_value_map(input_id)?
            .into_keys()
            .collect())
    }

    fn saved_value_map(&self, input_id: InputId) -> Result<IndexedData<K, V>, StorageError> {
        let (Some(snapshot), Some(contents)) = (self.snapshot.as_ref(), self.contents.as_ref())
        else {
            return Ok(IndexedData::new());
        };
        let Some(hash) = snapshot.get(input_id.to_raw())? else {
            return Ok(IndexedData::new());
        };
        Ok(contents
            .get(HashId::from_raw(hash))?
            .unwrap_or_default())
    }

    fn flush(&self) -> Result<(), StorageError> {
        let storage = self.storage.read();
        self.forward.force()?;
        if let Some(snapshot) = &self.snapshot {
            snapshot.force()?;
        }
        if let Some(trace) = &self.trace {
            trace.force()?;
        }
        if let Some(contents) = &self.contents {
            contents.force()?;
        }
        storage.flush()
    }

    fn clear(&self) {
        let mut storage = self.storage.write();
        if let Err(err) = storage.clear() {
            self.log_reset_failure("storage", &err);
        }
        if let Err(err) = self.forward.clean_and_recreate() {
            self.log_reset_failure("forward map", &err);
        }
        if let Some(snapshot) = &self.snapshot {
            if let Err(err) = snapshot.clean_and_recreate() {
                self.log_reset_failure("snapshot map", &err);
            }
        }
        if let Some(trace) = &self.trace {
            if let Err(err) = trace.clean_and_recreate() {
                self.log_reset_failure("indexing trace", &err);
            }
        }
        if let Some(contents) = &self.contents {
            if let Err(err) = contents.clean_and_recreate() {
                self.log_reset_failure("contents map", &err);
            }
        }
    }

    fn close_maps(&self) {
        if let Err(err) = self.forward.close() {
            self.log_close_failure("forward map", &err);
        }
        if let Some(snapshot) = &self.snapshot {
            if let Err(err) = snapshot.close() {
                self.log_close_failure("snapshot map", &err);
            }
        }
        if let Some(trace) = &self.trace {
            if let Err(err) = trace.close() {
                self.log_close_failure("indexing trace", &err);
            }
        }
        if let Some(contents) = &self.contents {
            if let Err(err) = contents.close() {
                self.log_close_failure("contents map", &err);
            }
        }
    }

    fn log_reset_failure(&self, what: &str, err: &StorageError) {
        tracing::error!(
            target: "strata.index",
            index = %self.name,
            what,
            error = %err,
            "failed to reset during clear"
        );
    }

    fn log_close_failure(&self, what: &str, err: &StorageError) {
        tracing::error!(
            target: "strata.index",
            index = %self.name,
            what,
            error = %err,
            "failed to close"
        );
    }
}
