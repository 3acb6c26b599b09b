//! The durable inverted-index storage implementation.

use crate::container::ValueContainer;
use crate::storage::{IndexStorage, InputFilter, ReadContext};
use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_core::InputId;
use strata_storage::{
    atomic_write, delete_files_starting_with, read_varint_u32, write_varint_u32, DataExternalizer,
    StorageError,
};

const MAGIC: [u8; 4] = *b"STIX";
const FORMAT_VERSION: u32 = 1;

/// Key → [`ValueContainer`] storage held in memory and rewritten wholesale on
/// flush. Ordering is deterministic, so equal index states produce equal
/// files.
pub struct MapIndexStorage<K, V> {
    path: PathBuf,
    key_externalizer: Arc<dyn DataExternalizer<K>>,
    value_externalizer: Arc<dyn DataExternalizer<V>>,
    map: BTreeMap<K, ValueContainer<V>>,
    dirty: AtomicBool,
}

impl<K, V> MapIndexStorage<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    pub fn open(
        path: impl AsRef<Path>,
        key_externalizer: Arc<dyn DataExternalizer<K>>,
        value_externalizer: Arc<dyn DataExternalizer<V>>,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let map = match std::fs::read(&path) {
            Ok(bytes) => decode_map(
                &path,
                &bytes,
                key_externalizer.as_ref(),
                value_externalizer.as_ref(),
            )?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(StorageError::from(err)),
        };
        Ok(Self {
            path,
            key_externalizer,
            value_externalizer,
            map,
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode_map(&self) -> Result<Vec<u8>, StorageError> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        write_varint_u32(&mut out, FORMAT_VERSION)?;
        write_varint_u32(&mut out, self.map.len() as u32)?;
        for (key, container) in &self.map {
            self.key_externalizer.save(&mut out, key)?;
            write_varint_u32(&mut out, container.len() as u32)?;
            for (input, value) in container.iter() {
                write_varint_u32(&mut out, input.to_raw())?;
                self.value_externalizer.save(&mut out, value)?;
            }
        }
        Ok(out)
    }
}

fn decode_map<K, V>(
    path: &Path,
    bytes: &[u8],
    key_externalizer: &dyn DataExternalizer<K>,
    value_externalizer: &dyn DataExternalizer<V>,
) -> Result<BTreeMap<K, ValueContainer<V>>, StorageError>
where
    K: Ord,
{
    let corrupted = |reason: String| StorageError::Corrupted {
        path: path.to_path_buf(),
        reason,
    };

    let mut cursor = Cursor::new(bytes);
    let mut magic = [0u8; 4];
    io::Read::read_exact(&mut cursor, &mut magic).map_err(|err| corrupted(err.to_string()))?;
    if magic != MAGIC {
        return Err(corrupted(format!("bad magic {magic:?}")));
    }
    let version = read_varint_u32(&mut cursor).map_err(|err| corrupted(err.to_string()))?;
    if version != FORMAT_VERSION {
        return Err(corrupted(format!("unsupported format version {version}")));
    }

    let entry_count = read_varint_u32(&mut cursor).map_err(|err| corrupted(err.to_string()))?;
    let mut map = BTreeMap::new();
    for _ in 0..entry_count {
        let key = key_externalizer
            .read(&mut cursor)
            .map_err(|err| corrupted(err.to_string()))?;
        let pair_count = read_varint_u32(&mut cursor).map_err(|err| corrupted(err.to_string()))?;
        let mut container = ValueContainer::new();
        for _ in 0..pair_count {
            let input = read_varint_u32(&mut cursor).map_err(|err| corrupted(err.to_string()))?;
            let value = value_externalizer
                .read(&mut cursor)
                .map_err(|err| corrupted(err.to_string()))?;
            container.add_value(InputId::from_raw(input), value);
        }
        map.insert(key, container);
    }
    if cursor.position() != bytes.len() as u64 {
        return Err(corrupted("trailing bytes after last entry".to_string()));
    }
    Ok(map)
}

impl<K, V> IndexStorage<K, V> for MapIndexStorage<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    fn add_value(&mut self, key: &K, input: InputId, value: V) -> Result<(), StorageError> {
        self.map
            .entry(key.clone())
            .or_default()
            .add_value(input, value);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn remove_all_values(&mut self, key: &K, input: InputId) -> Result<(), StorageError> {
        if let Some(container) = self.map.get_mut(key) {
            container.remove_all_values(input);
            if container.is_empty() {
                self.map.remove(key);
            }
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn read(&self, ctx: &ReadContext<'_>, key: &K) -> Result<ValueContainer<V>, StorageError> {
        tracing::trace!(target: "strata.storage", index = ctx.index_name(), "container read");
        Ok(self.map.get(key).cloned().unwrap_or_default())
    }

    fn process_keys(
        &self,
        ctx: &ReadContext<'_>,
        processor: &mut dyn FnMut(&K) -> bool,
        filter: Option<&dyn InputFilter>,
    ) -> Result<bool, StorageError> {
        tracing::trace!(target: "strata.storage", index = ctx.index_name(), "key iteration");
        for (key, container) in &self.map {
            if let Some(filter) = filter {
                if !container.input_ids().any(|input| filter.contains_input(input)) {
                    continue;
                }
            }
            if !processor(key) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn flush(&self) -> Result<(), StorageError> {
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }
        let bytes = self.encode_map()?;
        atomic_write(&self.path, &bytes)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.map.clear();
        self.dirty.store(false, Ordering::SeqCst);
        delete_files_starting_with(&self.path)
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.flush()
    }
}
