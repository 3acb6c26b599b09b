//! Dense, stable ids for content digests.

use crate::error::StorageError;
use crate::util::{atomic_write, bincode_options, bincode_options_limited, delete_files_starting_with};
use bincode::Options as _;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use strata_core::HashId;

const MAGIC: [u8; 4] = *b"STHE";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct EnumeratorFile {
    magic: [u8; 4],
    format_version: u32,
    next_id: u32,
    ids: Vec<(String, u32)>,
}

/// Maps content digests to [`HashId`]s, assigned densely starting at 1 so the
/// zero id stays free as the "no hash recorded" sentinel.
pub struct ContentHashEnumerator {
    base_path: PathBuf,
    state: Mutex<EnumState>,
}

struct EnumState {
    ids: HashMap<String, u32>,
    next_id: u32,
    dirty: bool,
    closed: bool,
}

impl ContentHashEnumerator {
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        let state = match std::fs::read(&base_path) {
            Ok(bytes) => {
                let file: EnumeratorFile = bincode_options_limited()
                    .deserialize(&bytes)
                    .map_err(|err| StorageError::Corrupted {
                        path: base_path.clone(),
                        reason: err.to_string(),
                    })?;
                if file.magic != MAGIC || file.format_version != FORMAT_VERSION {
                    return Err(StorageError::Corrupted {
                        path: base_path,
                        reason: "bad magic or format version".to_string(),
                    });
                }
                EnumState {
                    ids: file.ids.into_iter().collect(),
                    next_id: file.next_id,
                    dirty: false,
                    closed: false,
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => EnumState {
                ids: HashMap::new(),
                next_id: 1,
                dirty: false,
                closed: false,
            },
            Err(err) => return Err(StorageError::from(err)),
        };
        Ok(Self {
            base_path,
            state: Mutex::new(state),
        })
    }

    /// Returns the id previously assigned to `digest`, or assigns the next
    /// free one.
    pub fn enumerate(&self, digest: &[u8]) -> Result<HashId, StorageError> {
        let mut state = self.guard()?;
        let key = hex::encode(digest);
        if let Some(&id) = state.ids.get(&key) {
            return Ok(HashId::from_raw(id));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.ids.insert(key, id);
        state.dirty = true;
        Ok(HashId::from_raw(id))
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn force(&self) -> Result<(), StorageError> {
        let mut state = self.guard()?;
        if !state.dirty {
            return Ok(());
        }
        let bytes = encode(&state)?;
        atomic_write(&self.base_path, &bytes)?;
        state.dirty = false;
        Ok(())
    }

    pub fn close(&self) -> Result<(), StorageError> {
        let mut state = self.guard()?;
        if state.dirty {
            let bytes = encode(&state)?;
            atomic_write(&self.base_path, &bytes)?;
            state.dirty = false;
        }
        state.closed = true;
        Ok(())
    }

    pub fn clean_and_recreate(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.ids.clear();
        state.next_id = 1;
        state.dirty = false;
        state.closed = false;
        drop(state);
        delete_files_starting_with(&self.base_path)
    }

    fn guard(&self) -> Result<MutexGuard<'_, EnumState>, StorageError> {
        let state = self.state.lock();
        if state.closed {
            return Err(StorageError::Closed {
                path: self.base_path.clone(),
            });
        }
        Ok(state)
    }
}

fn encode(state: &EnumState) -> Result<Vec<u8>, StorageError> {
    let mut ids: Vec<(String, u32)> = state
        .ids
        .iter()
        .map(|(digest, id)| (digest.clone(), *id))
        .collect();
    ids.sort();
    let file = EnumeratorFile {
        magic: MAGIC,
        format_version: FORMAT_VERSION,
        next_id: state.next_id,
        ids,
    };
    Ok(bincode_options().serialize(&file)?)
}
