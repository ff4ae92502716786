//! Route handlers, grouped by resource.

pub mod account;
pub mod profile;
