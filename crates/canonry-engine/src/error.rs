//! Error type for `canonry-engine`.

use canonry_core::{curated::CuratedId, digest::Digest};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("codec error: {0}")]
  Codec(#[from] canonry_codec::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// An export selection named a curated id that does not exist. The whole
  /// export fails; partial collections are never produced.
  #[error("unknown curated id: {0}")]
  UnknownCuratedId(CuratedId),

  /// An export selection named a display identifier with no curated record.
  #[error("unknown identifier: {0:?}")]
  UnknownIdent(String),

  /// A curated record's current digest has no stored raw content. Raw rows
  /// are append-only, so this indicates an externally damaged repository.
  #[error("no raw content stored for digest {0}")]
  MissingContent(Digest),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store(
    e: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
