//! Profile cache backends for Mien.
//!
//! - [`MemoryCache`]: single-instance, dashmap-backed, per-entry expiry.
//! - [`RedisCache`]: shared across instances, expiry enforced by Redis.
//!
//! [`CacheBackend`] picks one at runtime from configuration.

mod memory;
mod redis_cache;

pub mod error;

use std::time::Duration;

use mien_core::store::ProfileCache;
use serde::Deserialize;

pub use error::{Error, Result};
pub use memory::{CacheStats, MemoryCache};
pub use redis_cache::RedisCache;

/// `[cache]` section of the server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub backend:   CacheKind,
  /// Required when `backend = "redis"`, e.g. `redis://127.0.0.1:6379`.
  #[serde(default)]
  pub redis_url: Option<String>,
  /// Seconds a profile snapshot stays cached after it is written.
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs:  u64,
}

fn default_ttl_secs() -> u64 { 300 }

impl Default for CacheConfig {
  fn default() -> Self {
    Self { backend: CacheKind::default(), redis_url: None, ttl_secs: default_ttl_secs() }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration { Duration::from_secs(self.ttl_secs) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
  #[default]
  Memory,
  Redis,
}

/// Runtime-selected cache backend.
#[derive(Clone)]
pub enum CacheBackend {
  Memory(MemoryCache),
  Redis(RedisCache),
}

impl CacheBackend {
  /// Build the backend named by `config`, connecting to Redis if needed.
  pub async fn from_config(config: &CacheConfig) -> Result<Self> {
    match config.backend {
      CacheKind::Memory => Ok(Self::Memory(MemoryCache::new())),
      CacheKind::Redis => {
        let url = config.redis_url.as_deref().ok_or(Error::MissingRedisUrl)?;
        Ok(Self::Redis(RedisCache::connect(url).await?))
      }
    }
  }

  /// Drop expired in-process entries. Redis expires its own keys.
  pub fn purge_expired(&self) -> usize {
    match self {
      Self::Memory(m) => m.purge_expired(),
      Self::Redis(_) => 0,
    }
  }
}

impl ProfileCache for CacheBackend {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<String>> {
    match self {
      Self::Memory(m) => m.get(key).await,
      Self::Redis(r) => r.get(key).await,
    }
  }

  async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
    match self {
      Self::Memory(m) => m.set(key, value, ttl).await,
      Self::Redis(r) => r.set(key, value, ttl).await,
    }
  }

  async fn invalidate(&self, key: &str) -> Result<()> {
    match self {
      Self::Memory(m) => m.invalidate(key).await,
      Self::Redis(r) => r.invalidate(key).await,
    }
  }
}
