//! Content hashing and id derivation.
//!
//! One hash contract per document type: text formats hash their extracted
//! text after line-ending normalization, binary formats hash raw file
//! bytes ([`crate::models::DocumentType::hashes_raw_bytes`]). Identical
//! content always produces an identical hash regardless of when indexing
//! runs or which platform wrote the file.

use sha2::{Digest, Sha256};

/// Hash extracted text. `\r\n` is normalized to `\n` first so a checkout
/// on another platform does not look like an edit.
pub fn hash_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash raw bytes (binary formats).
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Deterministic document id for a vault-relative path.
pub fn doc_id_for_path(rel_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rel_path.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_hash_normalizes_line_endings() {
        assert_eq!(hash_text("a\r\nb"), hash_text("a\nb"));
        assert_ne!(hash_text("a\nb"), hash_text("a b"));
    }

    #[test]
    fn byte_hash_distinguishes_content() {
        assert_ne!(hash_bytes(b"one"), hash_bytes(b"two"));
        assert_eq!(hash_bytes(b"same"), hash_bytes(b"same"));
    }

    #[test]
    fn doc_ids_are_stable_and_distinct() {
        assert_eq!(doc_id_for_path("notes/a.md"), doc_id_for_path("notes/a.md"));
        assert_ne!(doc_id_for_path("notes/a.md"), doc_id_for_path("notes/b.md"));
        assert_eq!(doc_id_for_path("x").len(), 32);
    }
}
