//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  /// No authenticated actor was attached to a write request.
  #[error("unauthorized")]
  Unauthorized,

  #[error(transparent)]
  Core(#[from] globalrights_core::Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    use globalrights_core::Error as Core;

    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::Core(e) if e.is_validation() => StatusCode::BAD_REQUEST,
      ApiError::Core(Core::PermissionDenied { .. }) => StatusCode::FORBIDDEN,
      ApiError::Core(Core::StorageUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self, "request failed");
    }

    let mut res = (status, Json(json!({ "error": self.to_string() }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"globalrights\""),
      );
    }
    res
  }
}
