//! Error type for `globalrights-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] globalrights_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The store was opened read-only; every write is refused.
  #[error("store is read-only")]
  ReadOnly,
}

impl Error {
  /// True when the database cannot be written or reached right now, as
  /// opposed to a bug or corrupt data.
  pub fn is_unavailable(&self) -> bool {
    match self {
      Error::ReadOnly => true,
      Error::Database(tokio_rusqlite::Error::ConnectionClosed) => true,
      Error::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(e, _),
      )) => matches!(
        e.code,
        ErrorCode::ReadOnly
          | ErrorCode::CannotOpen
          | ErrorCode::DatabaseBusy
          | ErrorCode::DatabaseLocked
      ),
      _ => false,
    }
  }
}

impl From<Error> for globalrights_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      e if e.is_unavailable() => Self::StorageUnavailable(e.to_string()),
      e => Self::Store(Box::new(e)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
