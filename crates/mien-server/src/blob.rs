//! Avatar storage on the local filesystem, served back under `/avatars`.

use std::{
  io,
  path::{Component, Path, PathBuf},
};

use mien_core::store::BlobStore;
use tracing::debug;

/// Writes blobs below `root` and hands out URLs under `public_base_url`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
  root:            PathBuf,
  public_base_url: String,
}

impl FsBlobStore {
  pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
    Self { root: root.into(), public_base_url: public_base_url.into() }
  }

  pub fn root(&self) -> &Path { &self.root }

  fn path_for(&self, name: &str) -> io::Result<PathBuf> {
    let relative = Path::new(name);
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("blob name {name:?} escapes the avatar directory"),
      ));
    }
    Ok(self.root.join(relative))
  }

  fn url_for(&self, name: &str) -> String {
    format!("{}/avatars/{name}", self.public_base_url.trim_end_matches('/'))
  }
}

impl BlobStore for FsBlobStore {
  type Error = io::Error;

  async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> io::Result<String> {
    let path = self.path_for(name)?;
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &bytes).await?;
    debug!(path = %path.display(), content_type, size = bytes.len(), "blob written");
    Ok(self.url_for(name))
  }

  async fn delete(&self, name: &str) -> io::Result<()> {
    let path = self.path_for(name)?;
    match tokio::fs::remove_file(&path).await {
      Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
      _ => {
        debug!(path = %path.display(), "blob removed");
        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("mien-blob-{}", uuid::Uuid::new_v4().simple()))
  }

  #[tokio::test]
  async fn put_writes_file_and_returns_public_url() {
    let dir = scratch_dir();
    let blobs = FsBlobStore::new(&dir, "http://localhost:3000/");
    let url = blobs.put("u1/abc-me.png", b"png".to_vec(), "image/png").await.unwrap();

    assert_eq!(url, "http://localhost:3000/avatars/u1/abc-me.png");
    assert_eq!(tokio::fs::read(dir.join("u1/abc-me.png")).await.unwrap(), b"png");
    tokio::fs::remove_dir_all(&dir).await.ok();
  }

  #[tokio::test]
  async fn delete_removes_file_and_tolerates_missing() {
    let dir = scratch_dir();
    let blobs = FsBlobStore::new(&dir, "http://localhost");
    blobs.put("u1/a.png", b"png".to_vec(), "image/png").await.unwrap();

    blobs.delete("u1/a.png").await.unwrap();
    assert!(!dir.join("u1/a.png").exists());
    blobs.delete("u1/a.png").await.unwrap();
    assert_eq!(
      blobs.delete("../a.png").await.unwrap_err().kind(),
      io::ErrorKind::InvalidInput
    );
    tokio::fs::remove_dir_all(&dir).await.ok();
  }

  #[tokio::test]
  async fn put_rejects_names_outside_root() {
    let blobs = FsBlobStore::new(scratch_dir(), "http://localhost");
    for name in ["../escape.png", "/etc/passwd", "u1/../../x"] {
      let err = blobs.put(name, b"x".to_vec(), "image/png").await.unwrap_err();
      assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{name}");
    }
  }
}
