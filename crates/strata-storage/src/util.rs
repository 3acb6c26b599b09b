//! Filesystem helpers shared by the durable maps.

use crate::error::StorageError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hard upper bound for any bincode-encoded payload read from disk.
///
/// Corruption should degrade to an open error, not an out-of-memory crash;
/// this cap keeps a corrupted length prefix from requesting an enormous
/// allocation.
pub(crate) const BINCODE_PAYLOAD_LIMIT_BYTES: u64 = 16 * 1024 * 1024;

pub(crate) fn bincode_options() -> impl bincode::Options {
    use bincode::Options as _;
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

pub(crate) fn bincode_options_limited() -> impl bincode::Options {
    use bincode::Options as _;
    bincode_options().with_limit(BINCODE_PAYLOAD_LIMIT_BYTES)
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `bytes` to `path` through a uniquely-named sibling tempfile and a
/// rename, so readers never observe a partially-written file.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) | None => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let (tmp_path, mut file) = open_unique_tmp_file(path, parent)?;
    if let Err(err) = file.write_all(bytes).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(&tmp_path);
        return Err(StorageError::from(err));
    }
    drop(file);

    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp_path);
            Err(StorageError::from(err))
        }
    }
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::Other, "destination path has no file name")
    })?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Removes every file in the base path's directory whose name starts with the
/// base file name. Durable maps own all such siblings (the data file plus any
/// crashed atomic-write leftovers).
pub fn delete_files_starting_with(base_path: &Path) -> Result<(), StorageError> {
    let Some(parent) = base_path.parent() else {
        return Ok(());
    };
    let Some(base_name) = base_path.file_name().and_then(|name| name.to_str()) else {
        return Ok(());
    };

    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(StorageError::from(err)),
    };

    let mut first_error = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(base_name) {
            continue;
        }
        let path = entry.path();
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target: "strata.storage",
                    path = %path.display(),
                    error = %err,
                    "failed to remove storage file"
                );
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }
    match first_error {
        Some(err) => Err(StorageError::from(err)),
        None => Ok(()),
    }
}
