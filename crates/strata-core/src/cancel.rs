//! Cooperative cancellation for index preparation work.

pub use tokio_util::sync::CancellationToken;

/// Raised when an operation observed a cancellation request.
///
/// This is always propagated verbatim; it must never be converted into a
/// storage fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Returns `Err(Cancelled)` if cancellation has been requested on `token`.
pub fn check_cancelled(token: &CancellationToken) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}
