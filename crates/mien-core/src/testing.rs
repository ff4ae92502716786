//! In-memory collaborators for unit tests.

use std::{
  collections::HashMap,
  sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::{TimeZone, Utc};

use crate::{
  Error,
  profile::{Profile, ProfileUpdate},
  session::{Credential, SessionSubject},
  store::{BlobStore, IdentityProvider, ProfileCache, ProfileStore},
};

#[derive(Debug, thiserror::Error)]
#[error("fake backend unavailable")]
pub struct Unavailable;

impl From<Unavailable> for Error {
  fn from(e: Unavailable) -> Self { Error::upstream(e) }
}

pub fn profile(id: &str, name: &str) -> Profile {
  let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
  Profile {
    id:             id.to_string(),
    email:          format!("{id}@example.com"),
    email_verified: false,
    name:           Some(name.to_string()),
    image:          None,
    created_at:     at,
    updated_at:     at,
    username:       None,
    bio:            None,
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeIdentity {
  sessions:  HashMap<String, SessionSubject>,
  pub calls: AtomicUsize,
  pub fail:  AtomicBool,
}

impl FakeIdentity {
  pub fn with(token: &str, profile: &Profile) -> Self {
    let mut sessions = HashMap::new();
    sessions.insert(token.to_string(), profile.subject());
    Self { sessions, ..Default::default() }
  }
}

impl IdentityProvider for FakeIdentity {
  type Error = Unavailable;

  async fn get_session(
    &self,
    credential: &Credential,
  ) -> Result<Option<SessionSubject>, Unavailable> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.fail.load(Ordering::SeqCst) {
      return Err(Unavailable);
    }
    Ok(self.sessions.get(credential.token()).cloned())
  }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCache {
  entries:   Mutex<HashMap<String, String>>,
  pub reads: AtomicUsize,
  pub fail:  AtomicBool,
}

impl FakeCache {
  pub fn insert(&self, key: &str, value: &str) {
    self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
  }

  pub fn raw(&self, key: &str) -> Option<String> {
    self.entries.lock().unwrap().get(key).cloned()
  }

  pub fn contains(&self, key: &str) -> bool { self.raw(key).is_some() }
}

impl ProfileCache for FakeCache {
  type Error = Unavailable;

  async fn get(&self, key: &str) -> Result<Option<String>, Unavailable> {
    self.reads.fetch_add(1, Ordering::SeqCst);
    if self.fail.load(Ordering::SeqCst) {
      return Err(Unavailable);
    }
    Ok(self.raw(key))
  }

  async fn set(&self, key: &str, value: String, _ttl: Duration) -> Result<(), Unavailable> {
    if self.fail.load(Ordering::SeqCst) {
      return Err(Unavailable);
    }
    self.entries.lock().unwrap().insert(key.to_string(), value);
    Ok(())
  }

  async fn invalidate(&self, key: &str) -> Result<(), Unavailable> {
    if self.fail.load(Ordering::SeqCst) {
      return Err(Unavailable);
    }
    self.entries.lock().unwrap().remove(key);
    Ok(())
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeStore {
  rows:         Mutex<HashMap<String, Profile>>,
  pub reads:    AtomicUsize,
  pub writes:   AtomicUsize,
  /// Number of upcoming reads that fail before the store recovers.
  pub failures: AtomicUsize,
}

impl FakeStore {
  pub fn with(profiles: &[Profile]) -> Self {
    let rows = profiles.iter().map(|p| (p.id.clone(), p.clone())).collect();
    Self { rows: Mutex::new(rows), ..Default::default() }
  }

  pub fn get(&self, id: &str) -> Option<Profile> {
    self.rows.lock().unwrap().get(id).cloned()
  }

  fn edit(&self, id: &str, f: impl FnOnce(&mut Profile)) -> Option<Profile> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    let mut rows = self.rows.lock().unwrap();
    let row = rows.get_mut(id)?;
    f(row);
    row.updated_at = Utc::now();
    Some(row.clone())
  }
}

impl ProfileStore for FakeStore {
  type Error = Unavailable;

  async fn get_profile(&self, id: &str) -> Result<Option<Profile>, Unavailable> {
    self.reads.fetch_add(1, Ordering::SeqCst);
    let failing = self
      .failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if failing {
      return Err(Unavailable);
    }
    Ok(self.get(id))
  }

  async fn update_profile(
    &self,
    id: &str,
    update: ProfileUpdate,
  ) -> Result<Option<Profile>, Unavailable> {
    Ok(self.edit(id, |p| {
      if let Some(v) = update.username {
        p.username = Some(v);
      }
      if let Some(v) = update.name {
        p.name = Some(v);
      }
      if let Some(v) = update.email {
        p.email = v;
      }
      if let Some(v) = update.bio {
        p.bio = Some(v);
      }
    }))
  }

  async fn set_image(&self, id: &str, url: String) -> Result<Option<Profile>, Unavailable> {
    Ok(self.edit(id, |p| p.image = Some(url)))
  }
}

// ─── Blobs ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeBlobs {
  blobs:   Mutex<HashMap<String, Vec<u8>>>,
  deleted: AtomicUsize,
}

impl FakeBlobs {
  pub fn len(&self) -> usize { self.blobs.lock().unwrap().len() }

  pub fn deleted(&self) -> usize { self.deleted.load(Ordering::SeqCst) }
}

impl BlobStore for FakeBlobs {
  type Error = Unavailable;

  async fn put(
    &self,
    name: &str,
    bytes: Vec<u8>,
    _content_type: &str,
  ) -> Result<String, Unavailable> {
    self.blobs.lock().unwrap().insert(name.to_string(), bytes);
    Ok(format!("fake://{name}"))
  }

  async fn delete(&self, name: &str) -> Result<(), Unavailable> {
    self.blobs.lock().unwrap().remove(name);
    self.deleted.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}
