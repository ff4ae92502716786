//! Session subjects, the credentials that produce them, and the typed outcome
//! of resolving one.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The minimal identity claim issued by the identity provider for a request.
///
/// Request-scoped; never mutated by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSubject {
  pub id:             String,
  pub email:          String,
  pub email_verified: bool,
  pub name:           Option<String>,
  pub image:          Option<String>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
  pub username:       Option<String>,
}

/// An opaque session token lifted out of the request by the HTTP layer.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
  /// Returns `None` for an empty or whitespace-only token.
  pub fn new(token: impl Into<String>) -> Option<Self> {
    let token = token.into();
    let trimmed = token.trim();
    if trimmed.is_empty() {
      None
    } else {
      Some(Self(trimmed.to_owned()))
    }
  }

  /// Wrap a freshly generated token. The caller guarantees it is not blank.
  pub fn issued(token: String) -> Self {
    debug_assert!(!token.trim().is_empty());
    Self(token)
  }

  pub fn token(&self) -> &str { &self.0 }
}

// Tokens are bearer secrets; keep them out of logs.
impl fmt::Debug for Credential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Credential(..)")
  }
}

/// The outcome of resolving a request's session.
///
/// `Unauthenticated` is a normal outcome, not an error: the calling layer
/// decides how to navigate to `redirect_to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
  Resolved(T),
  Unauthenticated { redirect_to: String },
}

impl<T> Resolution<T> {
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
    match self {
      Self::Resolved(v) => Resolution::Resolved(f(v)),
      Self::Unauthenticated { redirect_to } => {
        Resolution::Unauthenticated { redirect_to }
      }
    }
  }

  pub fn resolved(self) -> Option<T> {
    match self {
      Self::Resolved(v) => Some(v),
      Self::Unauthenticated { .. } => None,
    }
  }

  pub fn is_resolved(&self) -> bool { matches!(self, Self::Resolved(_)) }
}
