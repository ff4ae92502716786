//! In-process cache with per-entry expiry.
//!
//! Expired entries are dropped lazily on read and in bulk by
//! [`MemoryCache::purge_expired`], which the server calls on a timer.

use std::{
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use dashmap::DashMap;
use mien_core::store::ProfileCache;
use tokio::time::Instant;
use tracing::debug;

use crate::{Error, Result};

struct Entry {
  value:      String,
  expires_at: Instant,
}

impl Entry {
  fn is_expired(&self, now: Instant) -> bool { now >= self.expires_at }
}

/// Hit/miss counters for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub size:   usize,
  pub hits:   u64,
  pub misses: u64,
}

#[derive(Default)]
struct Inner {
  entries: DashMap<String, Entry>,
  hits:    AtomicU64,
  misses:  AtomicU64,
}

/// A dashmap-backed cache local to this process.
///
/// Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryCache {
  inner: Arc<Inner>,
}

impl MemoryCache {
  pub fn new() -> Self { Self::default() }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      size:   self.inner.entries.len(),
      hits:   self.inner.hits.load(Ordering::Relaxed),
      misses: self.inner.misses.load(Ordering::Relaxed),
    }
  }

  /// Remove every expired entry. Returns the number removed.
  pub fn purge_expired(&self) -> usize {
    let now = Instant::now();
    let before = self.inner.entries.len();
    self.inner.entries.retain(|_, entry| !entry.is_expired(now));
    let removed = before.saturating_sub(self.inner.entries.len());
    if removed > 0 {
      debug!(removed, "purged expired cache entries");
    }
    removed
  }

  fn lookup(&self, key: &str) -> Option<String> {
    let now = Instant::now();
    match self.inner.entries.get(key) {
      Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
      Some(_) => {}
      None => return None,
    }
    // The shard read guard must be released before removing.
    self
      .inner
      .entries
      .remove_if(key, |_, entry| entry.is_expired(now));
    None
  }
}

impl ProfileCache for MemoryCache {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<String>> {
    let found = self.lookup(key);
    let counter = if found.is_some() { &self.inner.hits } else { &self.inner.misses };
    counter.fetch_add(1, Ordering::Relaxed);
    Ok(found)
  }

  async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
    let entry = Entry { value, expires_at: Instant::now() + ttl };
    self.inner.entries.insert(key.to_owned(), entry);
    Ok(())
  }

  async fn invalidate(&self, key: &str) -> Result<()> {
    self.inner.entries.remove(key);
    Ok(())
  }
}
