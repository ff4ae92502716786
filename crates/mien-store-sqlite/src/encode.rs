//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that they compare correctly as text.

use chrono::{DateTime, SecondsFormat, Utc};
use mien_core::profile::Profile;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Email ───────────────────────────────────────────────────────────────────

/// Emails are matched case-insensitively by storing them lowercased.
pub fn encode_email(email: &str) -> String { email.trim().to_lowercase() }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching the field order of [`RawProfile::from_row`].
pub const PROFILE_COLUMNS: &str = "u.id, u.email, u.email_verified, u.name, u.image, \
   u.created_at, u.updated_at, u.username, u.bio";

/// Raw values read directly from a `users` row.
pub struct RawProfile {
  pub id:             String,
  pub email:          String,
  pub email_verified: bool,
  pub name:           Option<String>,
  pub image:          Option<String>,
  pub created_at:     String,
  pub updated_at:     String,
  pub username:       Option<String>,
  pub bio:            Option<String>,
}

impl RawProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      email:          row.get(1)?,
      email_verified: row.get(2)?,
      name:           row.get(3)?,
      image:          row.get(4)?,
      created_at:     row.get(5)?,
      updated_at:     row.get(6)?,
      username:       row.get(7)?,
      bio:            row.get(8)?,
    })
  }

  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      id:             self.id,
      email:          self.email,
      email_verified: self.email_verified,
      name:           self.name,
      image:          self.image,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
      username:       self.username,
      bio:            self.bio,
    })
  }
}
