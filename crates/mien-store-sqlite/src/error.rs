//! Error type for `mien-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A UNIQUE constraint rejected the write (email or username taken).
  #[error("{0} already in use")]
  Conflict(&'static str),
}

impl Error {
  /// Turn UNIQUE violations on `users` into [`Error::Conflict`].
  pub(crate) fn classify(e: tokio_rusqlite::Error) -> Self {
    if let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(
      ffi,
      Some(msg),
    )) = &e
      && ffi.code == rusqlite::ErrorCode::ConstraintViolation
    {
      if msg.contains("users.email") {
        return Self::Conflict("email");
      }
      if msg.contains("users.username") {
        return Self::Conflict("username");
      }
    }
    Self::Database(e)
  }
}

impl From<Error> for mien_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Conflict(_) => mien_core::Error::Conflict(e.to_string()),
      other => mien_core::Error::upstream(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
