//! A durable `u32`-keyed map with externalized values.
//!
//! The map is held in memory and rewritten wholesale to its base path on
//! [`PersistentMap::force`]. The on-disk layout is a magic tag, a format
//! version, an entry count, then `(varint key, value)` records. A file that
//! fails to decode is reported as corrupted; callers delete the backing
//! files and rebuild.

use crate::error::StorageError;
use crate::externalizer::DataExternalizer;
use crate::util::{atomic_write, delete_files_starting_with};
use crate::varint::{read_varint_u32, write_varint_u32};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAGIC: [u8; 4] = *b"STPM";
const FORMAT_VERSION: u32 = 1;

pub struct PersistentMap<V> {
    base_path: PathBuf,
    externalizer: Arc<dyn DataExternalizer<V>>,
    state: Mutex<MapState<V>>,
}

struct MapState<V> {
    entries: BTreeMap<u32, V>,
    dirty: bool,
    closed: bool,
}

impl<V: Clone + Send + 'static> PersistentMap<V> {
    pub fn open(
        base_path: impl AsRef<Path>,
        externalizer: Arc<dyn DataExternalizer<V>>,
    ) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        let entries = match std::fs::read(&base_path) {
            Ok(bytes) => decode_entries(&base_path, &bytes, externalizer.as_ref())?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(StorageError::from(err)),
        };
        Ok(Self {
            base_path,
            externalizer,
            state: Mutex::new(MapState {
                entries,
                dirty: false,
                closed: false,
            }),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn get(&self, key: u32) -> Result<Option<V>, StorageError> {
        Ok(self.guard()?.entries.get(&key).cloned())
    }

    pub fn put(&self, key: u32, value: V) -> Result<(), StorageError> {
        let mut state = self.guard()?;
        state.entries.insert(key, value);
        state.dirty = true;
        Ok(())
    }

    pub fn remove(&self, key: u32) -> Result<(), StorageError> {
        let mut state = self.guard()?;
        state.entries.remove(&key);
        state.dirty = true;
        Ok(())
    }

    pub fn contains_key(&self, key: u32) -> Result<bool, StorageError> {
        Ok(self.guard()?.entries.contains_key(&key))
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// True while another thread holds the map's monitor. Lets callers skip a
    /// read that would block and recompute instead.
    pub fn is_busy_reading(&self) -> bool {
        self.state.try_lock().is_none()
    }

    /// Writes the current contents to disk if the map has changed since the
    /// last force.
    pub fn force(&self) -> Result<(), StorageError> {
        let mut state = self.guard()?;
        if !state.dirty {
            return Ok(());
        }
        let bytes = encode_entries(&state.entries, self.externalizer.as_ref())?;
        atomic_write(&self.base_path, &bytes)?;
        state.dirty = false;
        Ok(())
    }

    /// Flushes and marks the map closed; further operations fail.
    pub fn close(&self) -> Result<(), StorageError> {
        let mut state = self.guard()?;
        if state.dirty {
            let bytes = encode_entries(&state.entries, self.externalizer.as_ref())?;
            atomic_write(&self.base_path, &bytes)?;
            state.dirty = false;
        }
        state.closed = true;
        Ok(())
    }

    /// Deletes every backing file (including atomic-write leftovers) and
    /// recreates an empty one, resetting the map to an open, empty state.
    pub fn clean_and_recreate(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.entries.clear();
        state.dirty = false;
        state.closed = false;
        delete_files_starting_with(&self.base_path)?;
        let bytes = encode_entries(&state.entries, self.externalizer.as_ref())?;
        atomic_write(&self.base_path, &bytes)
    }

    fn guard(&self) -> Result<MutexGuard<'_, MapState<V>>, StorageError> {
        let state = self.state.lock();
        if state.closed {
            return Err(StorageError::Closed {
                path: self.base_path.clone(),
            });
        }
        Ok(state)
    }
}

fn encode_entries<V>(
    entries: &BTreeMap<u32, V>,
    externalizer: &dyn DataExternalizer<V>,
) -> Result<Vec<u8>, StorageError> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    write_varint_u32(&mut out, FORMAT_VERSION)?;
    write_varint_u32(&mut out, entries.len() as u32)?;
    for (key, value) in entries {
        write_varint_u32(&mut out, *key)?;
        externalizer.save(&mut out, value)?;
    }
    Ok(out)
}

fn decode_entries<V>(
    path: &Path,
    bytes: &[u8],
    externalizer: &dyn DataExternalizer<V>,
) -> Result<BTreeMap<u32, V>, StorageError> {
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

    let count = read_varint_u32(&mut cursor).map_err(|err| corrupted(err.to_string()))?;
    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let key = read_varint_u32(&mut cursor).map_err(|err| corrupted(err.to_string()))?;
        let value = externalizer
            .read(&mut cursor)
            .map_err(|err| corrupted(err.to_string()))?;
        entries.insert(key, value);
    }
    if cursor.position() != bytes.len() as u64 {
        return Err(corrupted("trailing bytes after last entry".to_string()));
    }
    Ok(entries)
}
