//! Error type for `mien-cache`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("redis error: {0}")]
  Redis(#[from] redis::RedisError),

  #[error("cache backend is redis but no redis_url is configured")]
  MissingRedisUrl,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
