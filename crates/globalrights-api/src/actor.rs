//! The authenticated caller of a write request.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

/// Name of the account performing a change.
///
/// The API does not authenticate anyone itself; whatever sits in front of the
/// router is expected to insert an `Actor` into the request extensions.
/// Handlers that take an `Actor` answer 401 when none is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl Actor {
  pub fn name(&self) -> &str { &self.0 }
}

impl<St: Send + Sync> FromRequestParts<St> for Actor {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &St,
  ) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<Actor>()
      .cloned()
      .ok_or(ApiError::Unauthorized)
  }
}
