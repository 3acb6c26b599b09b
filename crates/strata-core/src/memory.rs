//! Process-wide low-memory notification registry.
//!
//! Components that hold flushable in-memory state register a callback and
//! keep the returned watcher alive; the host calls [`notify_low_memory`]
//! when it detects memory pressure.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Callback = Arc<dyn Fn() + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static REGISTRY: Lazy<Mutex<Vec<(u64, Callback)>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// A registered low-memory callback. Dropping the watcher (or calling
/// [`LowMemoryWatcher::stop`]) unregisters it.
#[derive(Debug)]
pub struct LowMemoryWatcher {
    id: u64,
}

impl LowMemoryWatcher {
    pub fn register(callback: impl Fn() + Send + Sync + 'static) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        REGISTRY
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push((id, Arc::new(callback)));
        Self { id }
    }

    pub fn stop(&self) {
        REGISTRY
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .retain(|(id, _)| *id != self.id);
    }
}

impl Drop for LowMemoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs every registered callback.
///
/// Callbacks are invoked outside the registry lock so they may register or
/// stop watchers themselves.
pub fn notify_low_memory() {
    let callbacks: Vec<Callback> = REGISTRY
        .lock()
        .unwrap_or_else(|err| err.into_inner())
        .iter()
        .map(|(_, callback)| callback.clone())
        .collect();
    for callback in callbacks {
        callback();
    }
}
