//! Error type for `canonry-core`.
//!
//! Only document-shape failures originate here. The rest of the taxonomy
//! lives where it is raised: storage failures in the backend crates' error
//! types, per-document skip reasons and export failures in the engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The input could not be turned into a canonical document — a non-object
  /// payload, or a missing resource type.
  #[error("malformed document: {0}")]
  MalformedDocument(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
