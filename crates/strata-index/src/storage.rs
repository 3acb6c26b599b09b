//! The primary inverted-index storage abstraction.

use crate::container::ValueContainer;
use crate::extension::IndexName;
use std::sync::Weak;
use strata_core::InputId;
use strata_storage::StorageError;

/// Identifies the index on whose behalf a storage read runs, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    index: Option<&'a IndexName>,
}

impl<'a> ReadContext<'a> {
    pub fn new(index: &'a IndexName) -> Self {
        Self { index: Some(index) }
    }

    /// A context for infrastructure-internal reads not attributable to a
    /// caller-visible index operation.
    pub fn detached() -> ReadContext<'static> {
        ReadContext { index: None }
    }

    pub fn index_name(&self) -> &str {
        self.index.map(IndexName::as_str).unwrap_or("-")
    }
}

/// Restricts key iteration to keys with at least one association in the
/// accepted input set.
pub trait InputFilter: Send + Sync {
    fn contains_input(&self, input: InputId) -> bool;
}

/// Observes buffering-mode transitions on a storage that supports them.
///
/// Registration is weak: a storage never keeps a listener alive.
pub trait BufferingStateListener: Send + Sync {
    fn buffering_state_changed(&self, enabled: bool);
    fn memory_storage_cleared(&self);
}

/// Key → [`ValueContainer`] storage underneath one index.
pub trait IndexStorage<K, V> {
    fn add_value(&mut self, key: &K, input: InputId, value: V) -> Result<(), StorageError>;

    fn remove_all_values(&mut self, key: &K, input: InputId) -> Result<(), StorageError>;

    fn read(&self, ctx: &ReadContext<'_>, key: &K) -> Result<ValueContainer<V>, StorageError>;

    /// Feeds every stored key to `processor` until it returns `false`.
    /// Returns `false` iff the processor short-circuited.
    fn process_keys(
        &self,
        ctx: &ReadContext<'_>,
        processor: &mut dyn FnMut(&K) -> bool,
        filter: Option<&dyn InputFilter>,
    ) -> Result<bool, StorageError>;

    fn flush(&self) -> Result<(), StorageError>;

    fn clear(&mut self) -> Result<(), StorageError>;

    fn close(&mut self) -> Result<(), StorageError>;

    /// True while mutations are buffered in memory instead of hitting the
    /// durable store.
    fn is_buffering(&self) -> bool {
        false
    }

    fn register_buffering_listener(&mut self, _listener: Weak<dyn BufferingStateListener>) {}
}
