//! Error type for `canonry-codec`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] canonry_core::Error),

  #[error("malformed document: {0}")]
  Malformed(String),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("xml error: {0}")]
  Xml(String),

  /// A bundle operation was handed a document that is not a bundle.
  #[error("not a bundle document: {0:?}")]
  NotABundle(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
