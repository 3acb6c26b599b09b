//! Content hashing: bytes (plus charset and file type) to a stable hash id.

use crate::content::FileContent;
use sha2::{Digest, Sha256};
use strata_core::HashId;
use strata_storage::{ContentHashEnumerator, StorageError};

/// Computes the SHA-256 digest over content bytes together with the charset
/// and file-type name, so the same bytes interpreted differently get distinct
/// hash ids.
pub fn content_digest(bytes: &[u8], charset: &str, file_type: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.update([0u8]);
    hasher.update(charset.as_bytes());
    hasher.update([0u8]);
    hasher.update(file_type.as_bytes());
    hasher.finalize().into()
}

/// Resolves the enumerated hash id for `content`, memoizing it in the
/// content's own cache slots.
///
/// Parse-tree-backed indexers build their output from the in-memory document
/// when one is attached, so the document text is hashed (under its own slot)
/// instead of the on-disk bytes; otherwise returning saved results computed
/// from disk content would be wrong for an edited-but-unsaved buffer.
pub(crate) fn hash_of_content(
    content: &FileContent,
    parse_backed: bool,
    hashes: &ContentHashEnumerator,
) -> Result<HashId, StorageError> {
    if parse_backed {
        if let Some(text) = content.document_text() {
            return content
                .uncommitted_hash
                .get_or_try_init(|| {
                    let digest =
                        content_digest(text.as_bytes(), content.charset(), content.file_type());
                    hashes.enumerate(&digest)
                })
                .copied();
        }
    }

    content
        .content_hash
        .get_or_try_init(|| match content.precomputed_digest() {
            Some(digest) => hashes.enumerate(digest),
            None => {
                let digest =
                    content_digest(content.bytes(), content.charset(), content.file_type());
                hashes.enumerate(&digest)
            }
        })
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enumerator() -> (tempfile::TempDir, ContentHashEnumerator) {
        let dir = tempfile::tempdir().unwrap();
        let hashes = ContentHashEnumerator::open(dir.path().join("hashes")).unwrap();
        (dir, hashes)
    }

    #[test]
    fn equal_content_hashes_equal() {
        let (_dir, hashes) = enumerator();
        let a = FileContent::new("A.java", b"text".to_vec(), "UTF-8", "JAVA");
        let b = FileContent::new("B.java", b"text".to_vec(), "UTF-8", "JAVA");

        assert_eq!(
            hash_of_content(&a, false, &hashes).unwrap(),
            hash_of_content(&b, false, &hashes).unwrap()
        );
    }

    #[test]
    fn file_type_participates_in_the_hash() {
        let (_dir, hashes) = enumerator();
        let java = FileContent::new("A", b"text".to_vec(), "UTF-8", "JAVA");
        let plain = FileContent::new("A", b"text".to_vec(), "UTF-8", "PLAIN_TEXT");

        assert_ne!(
            hash_of_content(&java, false, &hashes).unwrap(),
            hash_of_content(&plain, false, &hashes).unwrap()
        );
    }

    #[test]
    fn parse_backed_content_hashes_the_document_text() {
        let (_dir, hashes) = enumerator();
        let saved = FileContent::new("A.java", b"old".to_vec(), "UTF-8", "JAVA");
        let edited = FileContent::new("A.java", b"old".to_vec(), "UTF-8", "JAVA")
            .with_document_text("new");

        let on_disk = hash_of_content(&saved, true, &hashes).unwrap();
        let in_memory = hash_of_content(&edited, true, &hashes).unwrap();
        assert_ne!(on_disk, in_memory);

        // A non-parse-backed index ignores the document text.
        let ignored = hash_of_content(&edited, false, &hashes).unwrap();
        assert_eq!(ignored, on_disk);
    }

    #[test]
    fn hash_id_is_memoized_on_the_content() {
        let (_dir, hashes) = enumerator();
        let content = FileContent::new("A.java", b"text".to_vec(), "UTF-8", "JAVA");

        let first = hash_of_content(&content, false, &hashes).unwrap();
        let second = hash_of_content(&content, false, &hashes).unwrap();
        assert_eq!(first, second);
        assert_eq!(content.content_hash.get().copied(), Some(first));
    }
}
