//! Process-wide cache of built dream models.
//!
//! Entries are created on first use and live until the cache is dropped.
//! Building a model (loading its pretrained network) happens at most once per
//! model type; concurrent first requests wait for the build in flight.

pub mod cache;
pub mod types;

pub use cache::DreamCache;
pub use types::{CacheStats, CachedDreamer};
