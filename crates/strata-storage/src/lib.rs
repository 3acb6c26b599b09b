//! Durable key-value plumbing for the strata index engine.
//!
//! This crate provides the storage building blocks the engine composes:
//! - [`DataExternalizer`] and the built-in externalizers for primitive values
//! - a big-endian variable-length integer codec shared by every on-disk format
//! - [`PersistentMap`], a durable `u32`-keyed map with externalized values,
//!   whole-map atomic rewrite on `force`, and a non-blocking busy-read probe
//! - [`ContentHashEnumerator`], which assigns dense stable ids to content
//!   digests
//!
//! Corruption of any single file degrades to an error on open; callers delete
//! the backing files and rebuild rather than attempting recovery.

mod enumerator;
mod error;
mod externalizer;
mod persistent_map;
mod util;
mod varint;

pub use enumerator::ContentHashEnumerator;
pub use error::StorageError;
pub use externalizer::{
    BytesExternalizer, DataExternalizer, SetExternalizer, StringExternalizer, U32Externalizer,
};
pub use persistent_map::PersistentMap;
pub use util::{atomic_write, delete_files_starting_with};
pub use varint::{read_varint_u32, write_varint_u32};
