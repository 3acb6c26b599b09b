//! A buffering wrapper around a backing index storage.

use crate::container::ValueContainer;
use crate::storage::{BufferingStateListener, IndexStorage, InputFilter, ReadContext};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use strata_core::InputId;
use strata_storage::StorageError;

/// Shadows the backing storage with an in-memory overlay while buffering is
/// enabled. Affected keys are copied in on first touch; reads consult the
/// overlay first as long as it holds data, and [`Self::drop_memory_data`]
/// discards the whole session.
pub struct MemoryIndexStorage<K, V, S> {
    backing: S,
    overlay: HashMap<K, ValueContainer<V>>,
    buffering: AtomicBool,
    listeners: Mutex<Vec<Weak<dyn BufferingStateListener>>>,
}

impl<K, V, S> MemoryIndexStorage<K, V, S>
where
    K: Ord + Eq + Hash + Clone,
    V: Clone,
    S: IndexStorage<K, V>,
{
    pub fn new(backing: S) -> Self {
        Self {
            backing,
            overlay: HashMap::new(),
            buffering: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn backing(&self) -> &S {
        &self.backing
    }

    pub fn is_buffering_enabled(&self) -> bool {
        self.buffering.load(Ordering::SeqCst)
    }

    /// Switches buffering on or off and notifies listeners on a transition.
    /// Turning buffering off does not discard the overlay; it stays visible
    /// to reads until [`Self::drop_memory_data`].
    pub fn set_buffering_enabled(&self, enabled: bool) {
        let previous = self.buffering.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            self.notify(|listener| listener.buffering_state_changed(enabled));
        }
    }

    /// Discards every buffered mutation and tells listeners to drop their
    /// side tables.
    pub fn drop_memory_data(&mut self) {
        self.overlay.clear();
        self.notify(|listener| listener.memory_storage_cleared());
    }

    pub fn add_buffering_listener(&self, listener: Weak<dyn BufferingStateListener>) {
        self.listeners.lock().push(listener);
    }

    fn notify(&self, call: impl Fn(&dyn BufferingStateListener)) {
        let listeners: Vec<Arc<dyn BufferingStateListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|listener| listener.strong_count() > 0);
            listeners
                .iter()
                .filter_map(Weak::upgrade)
                .collect()
        };
        for listener in listeners {
            call(listener.as_ref());
        }
    }

    fn buffered_container(&mut self, key: &K) -> Result<&mut ValueContainer<V>, StorageError> {
        match self.overlay.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let seeded = self.backing.read(&ReadContext::detached(), key)?;
                Ok(entry.insert(seeded))
            }
        }
    }
}

impl<K, V, S> IndexStorage<K, V> for MemoryIndexStorage<K, V, S>
where
    K: Ord + Eq + Hash + Clone,
    V: Clone,
    S: IndexStorage<K, V>,
{
    fn add_value(&mut self, key: &K, input: InputId, value: V) -> Result<(), StorageError> {
        if self.is_buffering_enabled() {
            self.buffered_container(key)?.add_value(input, value);
            Ok(())
        } else {
            self.backing.add_value(key, input, value)
        }
    }

    fn remove_all_values(&mut self, key: &K, input: InputId) -> Result<(), StorageError> {
        if self.is_buffering_enabled() {
            self.buffered_container(key)?.remove_all_values(input);
            Ok(())
        } else {
            self.backing.remove_all_values(key, input)
        }
    }

    fn read(&self, ctx: &ReadContext<'_>, key: &K) -> Result<ValueContainer<V>, StorageError> {
        if let Some(container) = self.overlay.get(key) {
            return Ok(container.clone());
        }
        self.backing.read(ctx, key)
    }

    fn process_keys(
        &self,
        ctx: &ReadContext<'_>,
        processor: &mut dyn FnMut(&K) -> bool,
        filter: Option<&dyn InputFilter>,
    ) -> Result<bool, StorageError> {
        for (key, container) in &self.overlay {
            if container.is_empty() {
                continue;
            }
            if let Some(filter) = filter {
                if !container.input_ids().any(|input| filter.contains_input(input)) {
                    continue;
                }
            }
            if !processor(key) {
                return Ok(false);
            }
        }
        // Keys in the overlay shadow their persisted versions, including
        // keys whose buffered container became empty.
        let overlay = &self.overlay;
        let mut remaining = |key: &K| {
            if overlay.contains_key(key) {
                return true;
            }
            processor(key)
        };
        self.backing.process_keys(ctx, &mut remaining, filter)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.backing.flush()
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        if !self.overlay.is_empty() {
            self.overlay.clear();
            self.notify(|listener| listener.memory_storage_cleared());
        }
        self.backing.clear()
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.backing.close()
    }

    fn is_buffering(&self) -> bool {
        self.is_buffering_enabled()
    }

    fn register_buffering_listener(&mut self, listener: Weak<dyn BufferingStateListener>) {
        self.add_buffering_listener(listener);
    }
}
