//! Shared primitives for the strata index engine.

mod cancel;
mod id;
mod memory;

pub use cancel::{check_cancelled, Cancelled, CancellationToken};
pub use id::{HashId, InputId};
pub use memory::{notify_low_memory, LowMemoryWatcher};
