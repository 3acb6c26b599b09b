//! User-pluggable serialization for keys and values.
//!
//! An externalizer must round-trip: `read(save(v)) == v` under the value
//! type's equality. The engine checks this in extra-sanity mode.

use crate::varint::{read_varint_u32, write_varint_u32};
use std::collections::BTreeSet;
use std::io::{self, Read, Write};
use std::sync::Arc;

pub trait DataExternalizer<T>: Send + Sync {
    fn save(&self, out: &mut dyn Write, value: &T) -> io::Result<()>;
    fn read(&self, input: &mut dyn Read) -> io::Result<T>;
}

/// Varint-encoded `u32` values.
#[derive(Debug, Default, Clone, Copy)]
pub struct U32Externalizer;

impl DataExternalizer<u32> for U32Externalizer {
    fn save(&self, out: &mut dyn Write, value: &u32) -> io::Result<()> {
        write_varint_u32(out, *value)
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<u32> {
        read_varint_u32(input)
    }
}

/// Length-prefixed UTF-8 strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringExternalizer;

impl DataExternalizer<String> for StringExternalizer {
    fn save(&self, out: &mut dyn Write, value: &String) -> io::Result<()> {
        let bytes = value.as_bytes();
        write_varint_u32(out, bytes.len() as u32)?;
        out.write_all(bytes)
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<String> {
        let len = read_varint_u32(input)? as usize;
        let mut bytes = vec![0u8; len];
        input.read_exact(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
    }
}

/// Length-prefixed raw byte payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesExternalizer;

impl DataExternalizer<Vec<u8>> for BytesExternalizer {
    fn save(&self, out: &mut dyn Write, value: &Vec<u8>) -> io::Result<()> {
        write_varint_u32(out, value.len() as u32)?;
        out.write_all(value)
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<Vec<u8>> {
        let len = read_varint_u32(input)? as usize;
        let mut bytes = vec![0u8; len];
        input.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}

/// An ordered set of elements, written as a varint count followed by each
/// element through the element externalizer.
pub struct SetExternalizer<T> {
    element: Arc<dyn DataExternalizer<T>>,
}

impl<T> SetExternalizer<T> {
    pub fn new(element: Arc<dyn DataExternalizer<T>>) -> Self {
        Self { element }
    }
}

impl<T: Ord + Send + Sync> DataExternalizer<BTreeSet<T>> for SetExternalizer<T> {
    fn save(&self, out: &mut dyn Write, value: &BTreeSet<T>) -> io::Result<()> {
        write_varint_u32(out, value.len() as u32)?;
        for element in value {
            self.element.save(out, element)?;
        }
        Ok(())
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<BTreeSet<T>> {
        let len = read_varint_u32(input)?;
        let mut set = BTreeSet::new();
        for _ in 0..len {
            set.insert(self.element.read(input)?);
        }
        Ok(set)
    }
}
