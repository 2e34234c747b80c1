//! Lifecycle notifications broadcast to the host.

use serde::Serialize;
use shellcache_core::CacheVersion;

/// Emitted on every lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A store exists for `version` and core paths were pre-populated.
    Installed { version: CacheVersion, cached: usize, requested: usize },
    /// `version` took control; `reclaimed` stores were deleted.
    Activated { version: CacheVersion, reclaimed: Vec<CacheVersion> },
    /// Open clients were adopted by `version`.
    ClientsClaimed { version: CacheVersion, count: usize },
}
