use strata_core::Cancelled;
use strata_storage::StorageError;

/// Errors surfaced while preparing an index update.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}
