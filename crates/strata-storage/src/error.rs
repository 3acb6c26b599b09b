use std::path::PathBuf;

/// Errors produced by the durable map and enumerator layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted storage file {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("storage {path} is closed")]
    Closed { path: PathBuf },

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("incompatible index version: expected {expected}, found {found}")]
    IncompatibleVersion { expected: u32, found: u32 },
}
