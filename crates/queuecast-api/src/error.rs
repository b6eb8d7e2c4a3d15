//! API error type and its JSON rendering.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Everything a handler can fail with. Rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unsupported park id: {0}")]
  UnknownPark(String),

  #[error("invalid query: {0}")]
  BadQuery(String),

  #[error(transparent)]
  Core(queuecast_core::Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      Self::UnknownPark(_) => StatusCode::NOT_FOUND,
      Self::BadQuery(_) => StatusCode::BAD_REQUEST,
      Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<queuecast_core::Error> for ApiError {
  fn from(e: queuecast_core::Error) -> Self {
    match e {
      queuecast_core::Error::UnknownPark(id) => Self::UnknownPark(id),
      other => Self::Core(other),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
