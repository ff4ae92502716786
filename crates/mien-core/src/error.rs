//! Error types for `mien-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The subject authenticated, but the system of record has no profile.
  #[error("profile not found: {0}")]
  NotFound(String),

  /// A write was rejected by field validation.
  #[error("invalid input: {0}")]
  Invalid(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// The system of record or blob store could not be reached. Retryable.
  #[error("upstream unavailable: {0}")]
  Upstream(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn upstream(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Upstream(Box::new(e))
  }

  /// Whether the caller may reasonably retry the same request later.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Upstream(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
