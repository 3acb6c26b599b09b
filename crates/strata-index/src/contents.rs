//! The content-addressed store of serialized indexer output.

use crate::extension::{IndexedData, KeySet};
use std::io::{self, Cursor};
use std::path::Path;
use std::sync::Arc;
use strata_core::HashId;
use strata_storage::{
    delete_files_starting_with, read_varint_u32, write_varint_u32, BytesExternalizer,
    DataExternalizer, PersistentMap, StorageError,
};

/// Maps a content hash id to the serialized [`IndexedData`] the indexer
/// produced for that content. The store is a pure function of the hash id;
/// concurrent writers may race to record the same payload, which is harmless
/// because both serialize equal data.
///
/// Record layout: a varint count of `(key, value)` pairs, then one record per
/// distinct value (the value followed by its key collection), read back until
/// the payload is exhausted.
pub(crate) struct ContentsMap<K, V> {
    map: PersistentMap<Vec<u8>>,
    value_externalizer: Arc<dyn DataExternalizer<V>>,
    keys_externalizer: Arc<dyn DataExternalizer<KeySet<K>>>,
}

impl<K, V> ContentsMap<K, V>
where
    K: Ord + Clone,
    V: Eq + Clone,
{
    pub(crate) fn open(
        path: impl AsRef<Path>,
        value_externalizer: Arc<dyn DataExternalizer<V>>,
        keys_externalizer: Arc<dyn DataExternalizer<KeySet<K>>>,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let map = PersistentMap::open(path, Arc::new(BytesExternalizer)).map_err(|err| {
            let _ = delete_files_starting_with(path);
            err
        })?;
        Ok(Self {
            map,
            value_externalizer,
            keys_externalizer,
        })
    }

    pub(crate) fn get(&self, hash: HashId) -> Result<Option<IndexedData<K, V>>, StorageError> {
        match self.map.get(hash.to_raw())? {
            Some(bytes) => Ok(Some(self.deserialize_data(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn contains(&self, hash: HashId) -> Result<bool, StorageError> {
        self.map.contains_key(hash.to_raw())
    }

    /// Records the serialized form of `data` under `hash`. With
    /// `delayed_reading` set the caller skipped a busy read earlier, so an
    /// entry recorded by a concurrent writer in the meantime wins; returns
    /// whether this call wrote.
    pub(crate) fn save(
        &self,
        hash: HashId,
        data: &IndexedData<K, V>,
        delayed_reading: bool,
    ) -> Result<bool, StorageError> {
        if delayed_reading && self.map.contains_key(hash.to_raw())? {
            return Ok(false);
        }
        let bytes = self.serialize_data(data)?;
        self.map.put(hash.to_raw(), bytes)?;
        Ok(true)
    }

    pub(crate) fn is_busy_reading(&self) -> bool {
        self.map.is_busy_reading()
    }

    pub(crate) fn force(&self) -> Result<(), StorageError> {
        self.map.force()
    }

    pub(crate) fn close(&self) -> Result<(), StorageError> {
        self.map.close()
    }

    pub(crate) fn clean_and_recreate(&self) -> Result<(), StorageError> {
        self.map.clean_and_recreate()
    }

    pub(crate) fn serialize_data(&self, data: &IndexedData<K, V>) -> Result<Vec<u8>, StorageError> {
        let mut out = Vec::new();
        write_varint_u32(&mut out, data.len() as u32)?;
        if data.is_empty() {
            return Ok(out);
        }

        // Group keys by value so each distinct value is written once.
        let mut groups: Vec<(&V, KeySet<K>)> = Vec::new();
        for (key, value) in data {
            match groups.iter_mut().find(|(group, _)| *group == value) {
                Some((_, keys)) => {
                    keys.insert(key.clone());
                }
                None => {
                    let mut keys = KeySet::new();
                    keys.insert(key.clone());
                    groups.push((value, keys));
                }
            }
        }
        for (value, keys) in groups {
            self.value_externalizer.save(&mut out, value)?;
            self.keys_externalizer.save(&mut out, &keys)?;
        }
        Ok(out)
    }

    pub(crate) fn deserialize_data(&self, bytes: &[u8]) -> Result<IndexedData<K, V>, StorageError> {
        let corrupted = |err: io::Error| StorageError::Corrupted {
            path: self.map.base_path().to_path_buf(),
            reason: err.to_string(),
        };

        let mut cursor = Cursor::new(bytes);
        let pair_count = read_varint_u32(&mut cursor).map_err(|err| corrupted(err))?;
        let mut result = IndexedData::new();
        if pair_count == 0 {
            return Ok(result);
        }
        while (cursor.position() as usize) < bytes.len() {
            let value = self.value_externalizer.read(&mut cursor).map_err(|err| corrupted(err))?;
            let keys = self.keys_externalizer.read(&mut cursor).map_err(|err| corrupted(err))?;
            for key in keys {
                result.insert(key, value.clone());
            }
        }
        Ok(result)
    }
}
