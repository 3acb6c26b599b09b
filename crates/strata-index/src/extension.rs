//! Per-index configuration: the indexer function and its externalizers.

use crate::content::FileContent;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use strata_core::{Cancelled, CancellationToken};
use strata_storage::{DataExternalizer, SetExternalizer};

/// The map an indexer produces for one input. Keys are unique; ordering is
/// irrelevant to callers but kept deterministic for stable serialization.
pub type IndexedData<K, V> = BTreeMap<K, V>;

/// The set of keys an input currently contributes to the index.
pub type KeySet<K> = BTreeSet<K>;

/// A stable identifier for one index, used in file names and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexName(String);

impl IndexName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transforms one input into a key-value map.
///
/// Must be deterministic: two calls over equal content must produce equal
/// maps. Long-running indexers should poll `token` and bail out with
/// [`Cancelled`].
pub trait DataIndexer<K, V>: Send + Sync {
    fn map(
        &self,
        content: &FileContent,
        token: &CancellationToken,
    ) -> Result<IndexedData<K, V>, Cancelled>;
}

/// Everything the engine needs to know about one index.
pub struct IndexExtension<K, V> {
    pub(crate) name: IndexName,
    pub(crate) indexer: Box<dyn DataIndexer<K, V>>,
    pub(crate) value_externalizer: Arc<dyn DataExternalizer<V>>,
    pub(crate) keys_externalizer: Arc<dyn DataExternalizer<KeySet<K>>>,
    pub(crate) snapshot_mapping: bool,
    pub(crate) parse_backed: bool,
    pub(crate) format_version: u32,
}

impl<K, V> IndexExtension<K, V>
where
    K: Ord + Send + Sync + 'static,
{
    pub fn new(
        name: IndexName,
        indexer: Box<dyn DataIndexer<K, V>>,
        key_externalizer: Arc<dyn DataExternalizer<K>>,
        value_externalizer: Arc<dyn DataExternalizer<V>>,
    ) -> Self {
        let keys_externalizer: Arc<dyn DataExternalizer<KeySet<K>>> =
            Arc::new(SetExternalizer::new(key_externalizer));
        Self {
            name,
            indexer,
            value_externalizer,
            keys_externalizer,
            snapshot_mapping: false,
            parse_backed: false,
            format_version: 0,
        }
    }

    /// Enable content-hash dedup: identical payloads share one stored
    /// indexer output, and inputs record a hash id instead of a keyset.
    pub fn with_snapshot_mapping(mut self) -> Self {
        self.snapshot_mapping = true;
        self
    }

    /// Mark the indexer as parse-tree-backed, so an uncommitted in-memory
    /// document is hashed instead of the on-disk bytes.
    pub fn with_parse_backed_indexer(mut self) -> Self {
        self.parse_backed = true;
        self
    }

    /// Replace the derived keyset externalizer with a custom one.
    pub fn with_keys_externalizer(
        mut self,
        keys_externalizer: Arc<dyn DataExternalizer<KeySet<K>>>,
    ) -> Self {
        self.keys_externalizer = keys_externalizer;
        self
    }

    /// Bump when the indexer's output format changes; a stamp mismatch on
    /// open forces a rebuild.
    pub fn with_format_version(mut self, format_version: u32) -> Self {
        self.format_version = format_version;
        self
    }

    pub fn name(&self) -> &IndexName {
        &self.name
    }
}
