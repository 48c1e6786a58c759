//! Content digesting over the canonical serialization.

use canonry_core::{digest::Digest, document::Document};
use sha2::{Digest as _, Sha256};

use crate::{Result, json::canonical_json};

/// SHA-256 over a text, as lowercase hex.
pub fn digest_text(text: &str) -> Digest {
  let mut hasher = Sha256::new();
  hasher.update(text.as_bytes());
  Digest::from_hex(hex::encode(hasher.finalize()))
}

/// Digest of a document's canonical JSON serialization. Deterministic: the
/// same logical content digests identically regardless of incidental
/// whitespace or key ordering in the source.
pub fn canonical_digest(doc: &Document) -> Result<Digest> {
  Ok(digest_text(&canonical_json(&doc.to_value())?))
}
