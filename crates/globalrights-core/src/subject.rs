//! Subject: the central identity a membership belongs to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A central (farm-wide) user id.
///
/// Id `0` is reserved for "no identity". Anonymous subjects never own a
/// membership, so reads for them return nothing without touching storage.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubjectId(pub i64);

impl SubjectId {
  pub const ANONYMOUS: SubjectId = SubjectId(0);

  /// True for the reserved id and for anything that is not a valid central
  /// id (negative values).
  pub fn is_anonymous(self) -> bool { self.0 <= 0 }

  pub fn get(self) -> i64 { self.0 }
}

impl From<i64> for SubjectId {
  fn from(id: i64) -> Self { Self(id) }
}

impl fmt::Display for SubjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}
