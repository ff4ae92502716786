//! Redis-backed cache shared by every server instance.

use std::time::Duration;

use mien_core::store::ProfileCache;
use redis::{AsyncCommands as _, Client, aio::ConnectionManager};
use tracing::info;

use crate::{Error, Result};

const KEY_PREFIX: &str = "mien:profile:";

/// Profile snapshots stored as strings with `SET … EX`.
///
/// Cloning is cheap: the connection manager is shared and reconnects on
/// its own.
#[derive(Clone)]
pub struct RedisCache {
  conn: ConnectionManager,
}

impl RedisCache {
  pub async fn connect(url: &str) -> Result<Self> {
    let client = Client::open(url)?;
    let conn = client.get_connection_manager().await?;
    info!("connected to redis profile cache");
    Ok(Self { conn })
  }

  fn key(id: &str) -> String { format!("{KEY_PREFIX}{id}") }
}

impl ProfileCache for RedisCache {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<String>> {
    let mut conn = self.conn.clone();
    let raw: Option<String> = conn.get(Self::key(key)).await?;
    Ok(raw)
  }

  async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
    let mut conn = self.conn.clone();
    // Redis rejects a zero expiry.
    let secs = ttl.as_secs().max(1);
    conn.set_ex::<_, _, ()>(Self::key(key), value, secs).await?;
    Ok(())
  }

  async fn invalidate(&self, key: &str) -> Result<()> {
    let mut conn = self.conn.clone();
    conn.del::<_, ()>(Self::key(key)).await?;
    Ok(())
  }
}
