//! Profile records and the field-level edits accepted for them.
//!
//! The system of record owns [`Profile`]; caches only ever hold a serialised
//! copy of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, session::SessionSubject};

pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=20;
pub const NAME_LEN: std::ops::RangeInclusive<usize> = 2..=50;
pub const BIO_MAX_LEN: usize = 160;

/// The full user profile as stored in the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub id:             String,
  pub email:          String,
  pub email_verified: bool,
  pub name:           Option<String>,
  pub image:          Option<String>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
  pub username:       Option<String>,
  pub bio:            Option<String>,
}

impl Profile {
  /// Decode a cached snapshot. Callers never see an unvalidated shape.
  pub fn from_cached(raw: &str) -> Result<Self> { Ok(serde_json::from_str(raw)?) }

  pub fn to_cached(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }

  /// The identity-provider view of this profile.
  pub fn subject(&self) -> SessionSubject {
    SessionSubject {
      id:             self.id.clone(),
      email:          self.email.clone(),
      email_verified: self.email_verified,
      name:           self.name.clone(),
      image:          self.image.clone(),
      created_at:     self.created_at,
      updated_at:     self.updated_at,
      username:       self.username.clone(),
    }
  }
}

/// Profile fields a user may edit. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
  pub username: Option<String>,
  pub name:     Option<String>,
  pub email:    Option<String>,
  pub bio:      Option<String>,
}

impl ProfileUpdate {
  pub fn is_empty(&self) -> bool {
    self.username.is_none()
      && self.name.is_none()
      && self.email.is_none()
      && self.bio.is_none()
  }

  /// Trim every present field and reject values outside the allowed shapes.
  pub fn normalized(self) -> Result<Self> {
    let username = self.username.map(|s| s.trim().to_owned());
    let name = self.name.map(|s| s.trim().to_owned());
    let email = self.email.map(|s| s.trim().to_owned());
    let bio = self.bio.map(|s| s.trim().to_owned());

    if let Some(u) = &username {
      validate_username(u)?;
    }
    if let Some(n) = &name
      && !NAME_LEN.contains(&n.chars().count())
    {
      return Err(Error::Invalid(format!(
        "name must be between {} and {} characters",
        NAME_LEN.start(),
        NAME_LEN.end()
      )));
    }
    if let Some(e) = &email {
      validate_email(e)?;
    }
    if let Some(b) = &bio
      && b.chars().count() > BIO_MAX_LEN
    {
      return Err(Error::Invalid(format!(
        "bio must be at most {BIO_MAX_LEN} characters"
      )));
    }

    Ok(Self { username, name, email, bio })
  }
}

pub fn validate_username(username: &str) -> Result<()> {
  if !USERNAME_LEN.contains(&username.chars().count()) {
    return Err(Error::Invalid(format!(
      "username must be between {} and {} characters",
      USERNAME_LEN.start(),
      USERNAME_LEN.end()
    )));
  }
  if !username
    .chars()
    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
  {
    return Err(Error::Invalid(
      "username may only contain letters, numbers, dashes and underscores"
        .to_string(),
    ));
  }
  Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
  let valid = match email.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !email.contains(char::is_whitespace)
    }
    None => false,
  };
  if valid {
    Ok(())
  } else {
    Err(Error::Invalid(format!("not a valid email address: {email:?}")))
  }
}
