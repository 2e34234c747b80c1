//! Client code for shellcache.
//!
//! This crate provides the network transport, the response strategies and
//! the lifecycle worker that ties them to the versioned cache in
//! `shellcache-core`.

pub mod fetch;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use fetch::{FetchClient, FetchConfig, Network};
pub use strategy::{StrategyConfig, StrategyEngine};
pub use worker::{Disposition, LifecycleEvent, ProxyWorker, WorkerConfig, WorkerState};
