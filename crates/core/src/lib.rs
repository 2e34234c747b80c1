//! Core types and shared functionality for shellcache.
//!
//! This crate provides:
//! - Versioned cache stores with a SQLite backend
//! - Request classification into caching policies
//! - Request/response exchange types
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod exchange;
pub mod policy;

pub use cache::{CacheDb, CacheEntry, CacheKey, CacheStore, CacheVersion, WriteOutcome};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use exchange::{ProxyRequest, ProxyResponse};
pub use policy::{Classifier, Policy};
