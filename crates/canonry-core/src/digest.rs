//! Content digest newtype.
//!
//! Digests are lowercase hex SHA-256 strings. Computation lives in
//! `canonry-codec` (it needs the canonical serialiser); this type is the
//! value that flows through the store and the resolver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A SHA-256 digest in lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
  pub fn from_hex(hex: impl Into<String>) -> Self { Self(hex.into()) }

  pub fn as_hex(&self) -> &str { &self.0 }

  pub fn into_hex(self) -> String { self.0 }
}

impl fmt::Display for Digest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
