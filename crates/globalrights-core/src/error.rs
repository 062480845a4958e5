//! Error types for `globalrights-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("subject id must be positive, got {0}")]
  InvalidSubject(i64),

  #[error("group name must not be empty")]
  EmptyGroupName,

  #[error("group name is {0} bytes long; the limit is 255")]
  GroupNameTooLong(usize),

  #[error("expiry for group {0:?} is not in the future")]
  ExpiryInPast(String),

  #[error("{actor} may not {action} group {group:?}")]
  PermissionDenied {
    actor:  String,
    action: &'static str,
    group:  String,
  },

  /// The persistence layer is unreachable or read-only. Writes fail closed.
  #[error("storage unavailable: {0}")]
  StorageUnavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("audit log error: {0}")]
  AuditLog(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Argument errors raised before any I/O.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Self::InvalidSubject(_)
        | Self::EmptyGroupName
        | Self::GroupNameTooLong(_)
        | Self::ExpiryInPast(_)
    )
  }
}

/// Converts a sink error, keeping storage outages distinguishable from
/// other log failures.
pub(crate) fn audit_error(e: impl Into<Error>) -> Error {
  match e.into() {
    Error::Store(inner) => Error::AuditLog(inner),
    other => other,
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
