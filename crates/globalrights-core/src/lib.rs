//! Core types and trait definitions for global group memberships.
//!
//! A global group membership grants a subject (a central user id shared by
//! every wiki in a farm) a group on all of them at once. This crate holds the
//! membership model, the store contract, the read-side resolver, the audit
//! diff, and the rights-change orchestration. It is free of HTTP and database
//! dependencies; backends and transports depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod clock;
pub mod error;
pub mod identity;
pub mod membership;
pub mod permission;
pub mod resolver;
pub mod rights;
pub mod stats;
pub mod store;
pub mod subject;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use subject::SubjectId;
