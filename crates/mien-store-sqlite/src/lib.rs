//! SQLite system of record and session table for Mien.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. [`SqliteStore`] implements the profile,
//! account and identity-provider traits from `mien-core`.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, hash_token};

#[cfg(test)]
mod tests;
