//! Core types and trait definitions for Mien.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the session-resolution path (identity check, cache lookup, store fallback)
//! and the profile write path; concrete backends live in sibling crates.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod profile;
pub mod resolver;
pub mod session;
pub mod store;
pub mod update;

pub use error::{Error, Result};
pub use resolver::{RetryPolicy, SessionResolver};
pub use session::{Credential, Resolution};
pub use update::ProfileUpdater;

#[cfg(test)]
mod testing;
