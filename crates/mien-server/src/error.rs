//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum Error {
  /// No live session; the caller is sent to `redirect_to`.
  #[error("unauthenticated")]
  Unauthenticated { redirect_to: String },
  /// A sign-in attempt with an unknown email or a wrong password.
  #[error("invalid email or password")]
  InvalidCredentials,
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("request timed out")]
  Timeout,
  #[error("password hashing failed: {0}")]
  PasswordHash(String),
  #[error(transparent)]
  Core(#[from] mien_core::Error),
}

impl Error {
  /// Wrap any backend error that converts into the core taxonomy.
  pub fn core(e: impl Into<mien_core::Error>) -> Self { Self::Core(e.into()) }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    use mien_core::Error as Core;

    let (status, message) = match self {
      Error::Unauthenticated { redirect_to } => {
        return Redirect::to(&redirect_to).into_response();
      }
      Error::InvalidCredentials => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "invalid email or password" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Bearer realm=\"mien\""),
        );
        return res;
      }
      Error::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
      Error::Timeout => (StatusCode::GATEWAY_TIMEOUT, "request timed out".to_string()),
      Error::PasswordHash(m) => {
        error!(error = %m, "password hashing failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
      }
      Error::Core(Core::NotFound(id)) => {
        (StatusCode::NOT_FOUND, format!("profile not found: {id}"))
      }
      Error::Core(Core::Invalid(m)) => (StatusCode::UNPROCESSABLE_ENTITY, m),
      Error::Core(Core::Conflict(m)) => (StatusCode::CONFLICT, m),
      Error::Core(Core::Upstream(e)) => {
        error!(error = %e, "upstream unavailable");
        let mut res = (
          StatusCode::SERVICE_UNAVAILABLE,
          Json(json!({ "error": "service temporarily unavailable" })),
        )
          .into_response();
        res
          .headers_mut()
          .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        return res;
      }
      Error::Core(Core::Serialization(e)) => {
        error!(error = %e, "serialization failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
