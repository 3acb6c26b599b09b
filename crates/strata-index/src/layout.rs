//! On-disk layout of one index, plus the version stamp and process lock.

use crate::extension::IndexName;
use fs2::FileExt as _;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use strata_storage::{atomic_write, StorageError};

pub(crate) const INDEX_SCHEMA_VERSION: u32 = 1;

/// Where an index keeps its files:
///
/// ```text
/// <index-root>/version.json            version stamp
/// <index-root>/.lock                   process lock
/// <index-root>/fileIdToHashId          snapshot map
/// <index-root>/indextrace              indexing trace
/// <index-root>/<name>.inputs           forward map
/// <persistent-root>/values             contents map
/// ```
#[derive(Debug, Clone)]
pub struct IndexLayout {
    index_root: PathBuf,
    persistent_root: PathBuf,
}

impl IndexLayout {
    pub fn new(index_root: impl Into<PathBuf>, persistent_root: impl Into<PathBuf>) -> Self {
        Self {
            index_root: index_root.into(),
            persistent_root: persistent_root.into(),
        }
    }

    pub fn index_root(&self) -> &Path {
        &self.index_root
    }

    pub fn persistent_root(&self) -> &Path {
        &self.persistent_root
    }

    pub(crate) fn ensure_dirs(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.index_root)?;
        std::fs::create_dir_all(&self.persistent_root)?;
        Ok(())
    }

    pub(crate) fn forward_map_path(&self, name: &IndexName) -> PathBuf {
        self.index_root.join(format!("{}.inputs", name.as_str()))
    }

    pub(crate) fn snapshot_map_path(&self) -> PathBuf {
        self.index_root.join("fileIdToHashId")
    }

    pub(crate) fn trace_map_path(&self) -> PathBuf {
        self.index_root.join("indextrace")
    }

    pub(crate) fn contents_map_path(&self) -> PathBuf {
        self.persistent_root.join("values")
    }

    pub(crate) fn version_stamp_path(&self) -> PathBuf {
        self.index_root.join("version.json")
    }

    pub(crate) fn lock_path(&self) -> PathBuf {
        self.index_root.join(".lock")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionStamp {
    schema_version: u32,
    format_version: u32,
}

/// Validates the version stamp under `layout`, writing a fresh stamp when
/// none exists. A mismatch means the on-disk data was produced by a different
/// engine or indexer version; the caller wipes the roots and rebuilds.
pub(crate) fn check_version_stamp(
    layout: &IndexLayout,
    format_version: u32,
) -> Result<(), StorageError> {
    let path = layout.version_stamp_path();
    match std::fs::read(&path) {
        Ok(bytes) => {
            let stamp: VersionStamp = serde_json::from_slice(&bytes)?;
            if stamp.schema_version != INDEX_SCHEMA_VERSION {
                return Err(StorageError::IncompatibleVersion {
                    expected: INDEX_SCHEMA_VERSION,
                    found: stamp.schema_version,
                });
            }
            if stamp.format_version != format_version {
                return Err(StorageError::IncompatibleVersion {
                    expected: format_version,
                    found: stamp.format_version,
                });
            }
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let stamp = VersionStamp {
                schema_version: INDEX_SCHEMA_VERSION,
                format_version,
            };
            atomic_write(&path, &serde_json::to_vec_pretty(&stamp)?)
        }
        Err(err) => Err(StorageError::from(err)),
    }
}

/// A filesystem lock on the index root, shared-nothing across processes.
/// Released when dropped.
#[derive(Debug)]
pub struct IndexLock {
    file: File,
}

impl IndexLock {
    pub(crate) fn acquire(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
