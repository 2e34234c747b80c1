//! Cache-related MCP tools.
//!
//! This module provides read access to the active cache store.

pub mod get;

pub use get::{CacheGetParams, get_impl};
