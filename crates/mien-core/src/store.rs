//! The collaborator traits the resolver and updater are built on.
//!
//! Each trait is implemented by a backend crate (`mien-store-sqlite`,
//! `mien-cache`) or by the server binary (blob storage). Higher layers depend
//! on these abstractions, never on a concrete backend.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  profile::{Profile, ProfileUpdate},
  session::{Credential, SessionSubject},
};

// ─── Identity provider ───────────────────────────────────────────────────────

/// Validates a credential and yields the session subject it belongs to.
pub trait IdentityProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Returns `None` for unknown, revoked or expired credentials.
  fn get_session<'a>(
    &'a self,
    credential: &'a Credential,
  ) -> impl Future<Output = Result<Option<SessionSubject>, Self::Error>> + Send + 'a;
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// A string key/value cache with per-entry expiry.
///
/// Values are opaque serialised snapshots; decoding happens in the caller.
pub trait ProfileCache: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Store `value` under `key`, replacing any previous entry. The entry
  /// expires `ttl` after the write.
  fn set<'a>(
    &'a self,
    key: &'a str,
    value: String,
    ttl: Duration,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn invalidate<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

// ─── System of record ────────────────────────────────────────────────────────

/// Point lookups and edits against the authoritative profile table.
///
/// Errors convert into [`crate::Error`] so that the backend decides which
/// failures are conflicts and which are upstream outages.
pub trait ProfileStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  /// Retrieve a profile by primary key. Returns `None` if not found.
  fn get_profile<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + 'a;

  /// Apply the present fields of `update`. Returns `None` if no row matched.
  fn update_profile<'a>(
    &'a self,
    id: &'a str,
    update: ProfileUpdate,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + 'a;

  /// Point the profile image at `url`. Returns `None` if no row matched.
  fn set_image<'a>(
    &'a self,
    id: &'a str,
    url: String,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + 'a;
}

// ─── Accounts ────────────────────────────────────────────────────────────────

/// Input for [`AccountStore::create_account`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
  pub email:         String,
  pub name:          Option<String>,
  pub username:      Option<String>,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// The stored password hash for an email address.
#[derive(Debug, Clone)]
pub struct StoredPassword {
  pub user_id:       String,
  pub password_hash: String,
}

/// Email/password accounts and the sessions issued for them.
pub trait AccountStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  /// Create a user and its password account. Fails with a conflict if the
  /// email or username is taken.
  fn create_account(
    &self,
    account: NewAccount,
  ) -> impl Future<Output = Result<Profile, Self::Error>> + Send + '_;

  fn password_hash<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<StoredPassword>, Self::Error>> + Send + 'a;

  /// Persist a session for `user_id`. Backends should store a digest of the
  /// credential rather than the token itself.
  fn create_session<'a>(
    &'a self,
    user_id: &'a str,
    credential: &'a Credential,
    expires_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Returns `true` if a live session was removed.
  fn revoke_session<'a>(
    &'a self,
    credential: &'a Credential,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}

// ─── Blob storage ────────────────────────────────────────────────────────────

/// Public-read object storage for uploaded avatars.
pub trait BlobStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Write `bytes` under `name` and return the URL it is publicly served at.
  fn put<'a>(
    &'a self,
    name: &'a str,
    bytes: Vec<u8>,
    content_type: &'a str,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  /// Remove the blob stored under `name`. Removing a missing blob succeeds.
  fn delete<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
