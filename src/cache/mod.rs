//! Caching layer: versioned request/response buckets plus the strategy
//! engine and lifecycle management that sit on top of them.
//!
//! - Buckets map normalized GET requests to their last stored response
//! - Strategies decide whether a read is served from cache, network, or both
//! - The lifecycle manager pre-populates static assets at install and deletes
//!   superseded buckets at activation

mod lifecycle;
mod store;
mod strategy;

pub use lifecycle::{CacheLifecycleManager, LifecycleState};
pub use store::CacheStore;
pub use strategy::FetchStrategyEngine;
