//! The profile write path: field edits and avatar uploads.
//!
//! Every successful write drops the subject's cache entry so the next read
//! goes back to the system of record.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  profile::{Profile, ProfileUpdate},
  store::{BlobStore, ProfileCache, ProfileStore},
};

/// Largest accepted avatar upload.
pub const AVATAR_MAX_BYTES: usize = 5 * 1024 * 1024;

pub struct ProfileUpdater<S, C, B> {
  store: Arc<S>,
  cache: Arc<C>,
  blobs: Arc<B>,
}

impl<S, C, B> ProfileUpdater<S, C, B>
where
  S: ProfileStore,
  C: ProfileCache,
  B: BlobStore,
{
  pub fn new(store: Arc<S>, cache: Arc<C>, blobs: Arc<B>) -> Self {
    Self { store, cache, blobs }
  }

  /// Validate and apply `update` to the subject's profile.
  pub async fn update_profile(
    &self,
    subject_id: &str,
    update: ProfileUpdate,
  ) -> Result<Profile> {
    let update = update.normalized()?;
    if update.is_empty() {
      return Err(Error::Invalid("no fields to update".to_string()));
    }

    let profile = self
      .store
      .update_profile(subject_id, update)
      .await
      .map_err(Into::<Error>::into)?
      .ok_or_else(|| Error::NotFound(subject_id.to_owned()))?;

    self.invalidate(subject_id).await;
    info!(subject_id = %subject_id, "profile updated");
    Ok(profile)
  }

  /// Store an uploaded image and make it the subject's profile picture.
  pub async fn upload_avatar(
    &self,
    subject_id: &str,
    file_name: &str,
    content_type: &str,
    bytes: Vec<u8>,
  ) -> Result<Profile> {
    let Some(extension) = avatar_extension(content_type) else {
      return Err(Error::Invalid(format!(
        "avatar must be a PNG, JPEG, GIF or WebP image, got {content_type:?}"
      )));
    };
    if bytes.is_empty() {
      return Err(Error::Invalid("avatar upload is empty".to_string()));
    }
    if bytes.len() > AVATAR_MAX_BYTES {
      return Err(Error::Invalid(format!(
        "avatar exceeds {} bytes",
        AVATAR_MAX_BYTES
      )));
    }

    // The stored extension comes from the checked content type; the blob
    // store serves files by extension.
    let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
    let name = format!(
      "{}/{}-{}.{extension}",
      sanitize_segment(subject_id),
      Uuid::new_v4().simple(),
      sanitize_segment(stem)
    );
    let size = bytes.len();
    let url = self
      .blobs
      .put(&name, bytes, content_type)
      .await
      .map_err(Error::upstream)?;

    let stored = self
      .store
      .set_image(subject_id, url)
      .await
      .map_err(Into::<Error>::into)
      .and_then(|p| p.ok_or_else(|| Error::NotFound(subject_id.to_owned())));
    let profile = match stored {
      Ok(profile) => profile,
      Err(e) => {
        self.discard_blob(&name).await;
        return Err(e);
      }
    };

    self.invalidate(subject_id).await;
    info!(subject_id = %subject_id, blob = %name, size, "avatar uploaded");
    Ok(profile)
  }

  /// Remove a blob no profile points at. Failure leaves an orphan file.
  async fn discard_blob(&self, name: &str) {
    if let Err(e) = self.blobs.delete(name).await {
      warn!(blob = %name, error = %e, "failed to discard orphaned avatar");
    }
  }

  async fn invalidate(&self, subject_id: &str) {
    if let Err(e) = self.cache.invalidate(subject_id).await {
      warn!(subject_id = %subject_id, error = %e, "profile cache invalidation failed");
    }
  }
}

/// Accepted avatar media types and the extension each is stored under.
/// SVG is excluded since it can carry script.
const AVATAR_TYPES: &[(&str, &str)] = &[
  ("image/png", "png"),
  ("image/jpeg", "jpg"),
  ("image/gif", "gif"),
  ("image/webp", "webp"),
];

/// Map a `Content-Type` value to a stored file extension, ignoring
/// parameters and case.
fn avatar_extension(content_type: &str) -> Option<&'static str> {
  let essence = content_type
    .split(';')
    .next()
    .unwrap_or_default()
    .trim()
    .to_ascii_lowercase();
  AVATAR_TYPES
    .iter()
    .find(|(mime, _)| *mime == essence)
    .map(|(_, ext)| *ext)
}

/// Reduce a user-supplied name to a single safe path segment.
fn sanitize_segment(raw: &str) -> String {
  let cleaned: String = raw
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
        c
      } else {
        '_'
      }
    })
    .take(64)
    .collect();
  let cleaned = cleaned.trim_start_matches('.');
  if cleaned.is_empty() {
    "avatar".to_string()
  } else {
    cleaned.to_string()
  }
}
