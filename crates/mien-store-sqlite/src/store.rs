//! [`SqliteStore`], the SQLite implementation of the `mien-core` store
//! traits.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use mien_core::{
  profile::{Profile, ProfileUpdate},
  session::{Credential, SessionSubject},
  store::{AccountStore, IdentityProvider, NewAccount, ProfileStore, StoredPassword},
};

use crate::{
  Error, Result,
  encode::{PROFILE_COLUMNS, RawProfile, encode_dt, encode_email},
  schema::SCHEMA,
};

/// Digest under which a session token is stored: lowercase hex SHA-256.
pub fn hash_token(credential: &Credential) -> String {
  hex::encode(Sha256::digest(credential.token().as_bytes()))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Profiles, accounts and sessions backed by a single SQLite file.
///
/// Clones share one background connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open a private in-memory store, used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Delete every session whose expiry has passed. Returns the number removed.
  pub async fn purge_expired_sessions(&self) -> Result<usize> {
    let now_str = encode_dt(Utc::now());
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM sessions WHERE expires_at <= ?1",
          rusqlite::params![now_str],
        )?)
      })
      .await?;
    Ok(removed)
  }

  async fn fetch_profile(&self, id: &str) -> Result<Option<Profile>> {
    let id_str = id.to_owned();

    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROFILE_COLUMNS} FROM users u WHERE u.id = ?1"),
              rusqlite::params![id_str],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }
}

// ─── ProfileStore impl ───────────────────────────────────────────────────────

impl ProfileStore for SqliteStore {
  type Error = Error;

  async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
    self.fetch_profile(id).await
  }

  async fn update_profile(
    &self,
    id: &str,
    update: ProfileUpdate,
  ) -> Result<Option<Profile>> {
    let id_str    = id.to_owned();
    let email_str = update.email.as_deref().map(encode_email);
    let now_str   = encode_dt(Utc::now());

    // Changing the email address drops its verified flag.
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET
             username       = COALESCE(?2, username),
             name           = COALESCE(?3, name),
             email_verified = CASE WHEN ?4 IS NOT NULL AND ?4 != email
                                   THEN 0 ELSE email_verified END,
             email          = COALESCE(?4, email),
             bio            = COALESCE(?5, bio),
             updated_at     = ?6
           WHERE id = ?1",
          rusqlite::params![
            id_str,
            update.username,
            update.name,
            email_str,
            update.bio,
            now_str,
          ],
        )?)
      })
      .await
      .map_err(Error::classify)?;

    if changed == 0 {
      return Ok(None);
    }
    self.fetch_profile(id).await
  }

  async fn set_image(&self, id: &str, url: String) -> Result<Option<Profile>> {
    let id_str  = id.to_owned();
    let now_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET image = ?2, updated_at = ?3 WHERE id = ?1",
          rusqlite::params![id_str, url, now_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.fetch_profile(id).await
  }
}

// ─── AccountStore impl ───────────────────────────────────────────────────────

impl AccountStore for SqliteStore {
  type Error = Error;

  async fn create_account(&self, account: NewAccount) -> Result<Profile> {
    let now = Utc::now();
    let profile = Profile {
      id:             Uuid::new_v4().hyphenated().to_string(),
      email:          encode_email(&account.email),
      email_verified: false,
      name:           account.name,
      image:          None,
      created_at:     now,
      updated_at:     now,
      username:       account.username,
      bio:            None,
    };

    let id_str       = profile.id.clone();
    let email_str    = profile.email.clone();
    let name         = profile.name.clone();
    let username     = profile.username.clone();
    let now_str      = encode_dt(now);
    let password_phc = account.password_hash;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO users (id, email, email_verified, name, username, created_at, updated_at)
           VALUES (?1, ?2, 0, ?3, ?4, ?5, ?5)",
          rusqlite::params![id_str, email_str, name, username, now_str],
        )?;
        tx.execute(
          "INSERT INTO accounts (user_id, password_hash, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, password_phc, now_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(Error::classify)?;

    // Re-read so callers see the stored timestamp precision.
    Ok(self.fetch_profile(&profile.id).await?.unwrap_or(profile))
  }

  async fn password_hash(&self, email: &str) -> Result<Option<StoredPassword>> {
    let email_str = encode_email(email);

    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT a.user_id, a.password_hash
               FROM accounts a JOIN users u ON u.id = a.user_id
               WHERE u.email = ?1",
              rusqlite::params![email_str],
              |row| {
                Ok(StoredPassword {
                  user_id:       row.get(0)?,
                  password_hash: row.get(1)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    Ok(found)
  }

  async fn create_session(
    &self,
    user_id: &str,
    credential: &Credential,
    expires_at: DateTime<Utc>,
  ) -> Result<()> {
    let token_hash  = hash_token(credential);
    let user_id_str = user_id.to_owned();
    let now_str     = encode_dt(Utc::now());
    let expires_str = encode_dt(expires_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![token_hash, user_id_str, now_str, expires_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn revoke_session(&self, credential: &Credential) -> Result<bool> {
    let token_hash = hash_token(credential);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM sessions WHERE token_hash = ?1",
          rusqlite::params![token_hash],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }
}

// ─── IdentityProvider impl ───────────────────────────────────────────────────

impl IdentityProvider for SqliteStore {
  type Error = Error;

  async fn get_session(&self, credential: &Credential) -> Result<Option<SessionSubject>> {
    let token_hash = hash_token(credential);
    let now_str    = encode_dt(Utc::now());

    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PROFILE_COLUMNS}
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token_hash = ?1 AND s.expires_at > ?2"
              ),
              rusqlite::params![token_hash, now_str],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    match raw {
      Some(raw) => Ok(Some(raw.into_profile()?.subject())),
      None => {
        debug!("no live session for presented token");
        Ok(None)
      }
    }
  }
}
