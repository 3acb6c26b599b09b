//! The unit of indexable content handed to an indexer.

use once_cell::sync::OnceCell;
use std::borrow::Cow;
use strata_core::HashId;

/// A file's content plus the attributes that participate in content hashing.
///
/// The two hash slots memoize the enumerated content hash for the life of
/// this value; the caller owns the content object, so a re-read of the file
/// naturally gets fresh slots.
#[derive(Debug)]
pub struct FileContent {
    name: String,
    bytes: Vec<u8>,
    charset: String,
    file_type: String,
    physical: bool,
    precomputed_digest: Option<Vec<u8>>,
    document_text: Option<String>,
    pub(crate) content_hash: OnceCell<HashId>,
    pub(crate) uncommitted_hash: OnceCell<HashId>,
}

impl FileContent {
    /// Content read from disk.
    pub fn new(
        name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        charset: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            charset: charset.into(),
            file_type: file_type.into(),
            physical: true,
            precomputed_digest: None,
            document_text: None,
            content_hash: OnceCell::new(),
            uncommitted_hash: OnceCell::new(),
        }
    }

    /// In-memory content (an unsaved editor buffer); never recorded in the
    /// snapshot mapping.
    pub fn transient(
        name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        charset: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            physical: false,
            ..Self::new(name, bytes, charset, file_type)
        }
    }

    /// Attach a digest computed elsewhere (e.g. by the file loader); the hash
    /// cache enumerates it instead of hashing the bytes again.
    pub fn with_precomputed_digest(mut self, digest: impl Into<Vec<u8>>) -> Self {
        self.precomputed_digest = Some(digest.into());
        self
    }

    /// Attach the text of an uncommitted in-memory document. Parse-tree-backed
    /// indexers hash this text instead of the on-disk bytes.
    pub fn with_document_text(mut self, text: impl Into<String>) -> Self {
        self.document_text = Some(text.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn is_physical(&self) -> bool {
        self.physical
    }

    pub(crate) fn precomputed_digest(&self) -> Option<&[u8]> {
        self.precomputed_digest.as_deref()
    }

    pub fn document_text(&self) -> Option<&str> {
        self.document_text.as_deref()
    }

    /// The content decoded as text, for tokenizing indexers.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}
