//! Wire codecs for Canonry.
//!
//! Converts between source texts (JSON or XML) and the canonical
//! [`Document`](canonry_core::document::Document) representation, computes
//! content digests over the canonical serialization, splits and assembles
//! bundle envelopes, and scans documents for reference edges. Pure and
//! synchronous; no database dependencies.
//!
//! Each source encoding is a separate decoder behind the single
//! [`decode`] entry point, so further encodings slot in without touching
//! the ingest pipeline.

pub mod bundle;
pub mod error;
pub mod refs;

mod digest;
mod json;
mod xml;

use canonry_core::document::Document;
use serde_json::Value;

pub use digest::{canonical_digest, digest_text};
pub use error::{Error, Result};
pub use json::canonical_json;
pub use xml::{DOC_NS, to_xml};

// ─── Encoding ────────────────────────────────────────────────────────────────

/// The interchange encodings Canonry reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
  Json,
  Xml,
}

// ─── Decode ──────────────────────────────────────────────────────────────────

/// Decode one source text into the canonical document representation.
///
/// Note on cross-encoding hashing: the XML decoder yields every primitive as
/// a string, so a JSON document using native numbers or booleans will not
/// share a canonical digest with its XML rendering. Two encodings of a
/// document whose fields are all strings do converge.
pub fn decode(text: &str, encoding: Encoding) -> Result<Document> {
  match encoding {
    Encoding::Json => json::decode_json(text),
    Encoding::Xml => xml::decode_xml(text),
  }
}

/// Serialize a document value in the requested encoding, for export.
/// JSON output is pretty-printed; XML carries a declaration and the
/// document namespace.
pub fn encode(value: &Value, encoding: Encoding) -> Result<String> {
  match encoding {
    Encoding::Json => Ok(serde_json::to_string_pretty(value)?),
    Encoding::Xml => xml::to_xml(value),
  }
}
