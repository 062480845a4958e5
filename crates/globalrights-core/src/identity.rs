//! Mapping from an ambient user reference to a central subject id.

use crate::SubjectId;

/// Resolves whatever the host calls a user into the farm-wide id that
/// memberships are keyed by. Returns [`SubjectId::ANONYMOUS`] when the user
/// has no central identity.
pub trait IdentityResolver: Send + Sync {
  type User: ?Sized;

  fn central_id(&self, user: &Self::User) -> SubjectId;
}

/// The user reference already is the central id.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectIdentity;

impl IdentityResolver for DirectIdentity {
  type User = i64;

  fn central_id(&self, user: &i64) -> SubjectId {
    if *user > 0 { SubjectId(*user) } else { SubjectId::ANONYMOUS }
  }
}
