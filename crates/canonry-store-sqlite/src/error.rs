//! Error type for `canonry-store-sqlite`.

use canonry_core::store::StoreFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] canonry_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {field} value: {value:?}")]
  UnknownDiscriminant { field: &'static str, value: String },
}

impl Error {
  /// Transient lock contention: the busy timeout elapsed while another
  /// writer held the database. Safe to retry.
  pub fn is_busy(&self) -> bool {
    match self {
      Error::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(e, _),
      )) => matches!(
        e.code,
        rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
      ),
      _ => false,
    }
  }
}

impl StoreFailure for Error {
  fn is_busy(&self) -> bool { Error::is_busy(self) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
