//! A durable, incrementally updated map-reduce file index.
//!
//! An indexer turns one input (a file's content) into a key → value map; the
//! engine reconciles that map against what the input produced last time and
//! maintains the inverted key → `(input, value)` index together with the
//! forward bookkeeping that makes the diff possible:
//!
//! - the **forward map** remembers each input's previous keyset
//! - with snapshot mapping enabled, the **snapshot map** records a content
//!   hash id per input and the **contents map** stores one serialized indexer
//!   output per distinct content, so byte-identical payloads are indexed once
//! - while the storage buffers mutations in memory, a **staging table** and a
//!   forward-map side table keep the persistent maps untouched until the
//!   session is committed or discarded
//!
//! A single read/write lock guards the engine: updates commit briefly under
//! the write lock, reads run in parallel under the read lock, and the commit
//! phase is never cancellable.

mod container;
mod content;
mod contents;
mod error;
mod extension;
mod forward;
mod hash;
mod index;
mod layout;
mod map_storage;
mod memory_storage;
mod sanity;
mod staging;
mod storage;
mod update;

pub use container::ValueContainer;
pub use content::FileContent;
pub use error::IndexError;
pub use extension::{DataIndexer, IndexExtension, IndexName, IndexedData, KeySet};
pub use hash::content_digest;
pub use index::{IndexOptions, LoggingRebuildNotifier, MapReduceIndex, RebuildNotifier};
pub use layout::IndexLayout;
pub use map_storage::MapIndexStorage;
pub use memory_storage::MemoryIndexStorage;
pub use storage::{BufferingStateListener, IndexStorage, InputFilter, ReadContext};
pub use update::UpdateTask;
