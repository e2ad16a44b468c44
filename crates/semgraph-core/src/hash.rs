//! Content fingerprinting for content-addressed dedup.
//!
//! The normalization policy is fixed: trim surrounding whitespace, then
//! lowercase. It must be applied identically on every submission, otherwise
//! two submissions of the same text land under different ids.

use sha2::{Digest, Sha256};

use crate::types::{ContentType, DocumentId};

/// Trim and case-fold text before hashing or storing it.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// SHA-256 of the given (already normalized) text, lowercase hex encoded.
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(digest)
}

/// Document id for already normalized content.
pub fn document_id(content_type: ContentType, normalized: &str) -> DocumentId {
    DocumentId::new(content_type, &fingerprint(normalized))
}
