//! HTTP Basic-auth middleware and standalone verifier.

use std::collections::HashMap;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  middleware::Next,
  response::{IntoResponse, Response},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use globalrights_api::Actor;
use thiserror::Error;
use tracing::debug;

use crate::AccountConfig;

#[derive(Debug, Error)]
pub enum AuthError {
  #[error("unauthorized")]
  Unauthorized,
}

impl IntoResponse for AuthError {
  fn into_response(self) -> Response {
    let mut res = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    res.headers_mut().insert(
      header::WWW_AUTHENTICATE,
      HeaderValue::from_static("Basic realm=\"globalrights\""),
    );
    res
  }
}

/// Accounts allowed to call the API, keyed by username.
#[derive(Clone, Default)]
pub struct Accounts {
  /// PHC strings produced by argon2, e.g. `$argon2id$v=19$…`
  password_hashes: HashMap<String, String>,
}

impl Accounts {
  pub fn from_config<'a>(accounts: impl IntoIterator<Item = &'a AccountConfig>) -> Self {
    Self {
      password_hashes: accounts
        .into_iter()
        .map(|a| (a.username.clone(), a.password_hash.clone()))
        .collect(),
    }
  }
}

/// Verify Basic credentials from headers. Returns the authenticated username.
pub fn verify_basic(headers: &HeaderMap, accounts: &Accounts) -> Result<String, AuthError> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(AuthError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(AuthError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| AuthError::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| AuthError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(AuthError::Unauthorized)?;

  let stored = accounts
    .password_hashes
    .get(username)
    .ok_or(AuthError::Unauthorized)?;

  let parsed_hash = PasswordHash::new(stored).map_err(|_| AuthError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| AuthError::Unauthorized)?;

  Ok(username.to_string())
}

/// Reject unauthenticated requests; attach the caller as an [`Actor`]
/// otherwise.
pub async fn require_basic_auth(
  State(accounts): State<std::sync::Arc<Accounts>>,
  mut req: Request,
  next: Next,
) -> Result<Response, AuthError> {
  let username = verify_basic(req.headers(), &accounts).inspect_err(|_| {
    debug!(path = %req.uri().path(), "rejected request without valid credentials");
  })?;
  req.extensions_mut().insert(Actor(username));
  Ok(next.run(req).await)
}
