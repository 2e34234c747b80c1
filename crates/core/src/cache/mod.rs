//! SQLite-backed versioned cache stores.
//!
//! Each cache generation owns one store of captured GET responses. This
//! module provides:
//!
//! - Deterministic cache keys from method + URL
//! - Idempotent store creation and single-point activation that reclaims
//!   every stale generation
//! - Best-effort entry writes that never fail the caller
//! - Automatic schema migrations and WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, WriteOutcome};
pub use hash::CacheKey;
pub use stores::{CacheStore, CacheVersion};
