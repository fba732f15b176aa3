//! Freshness-aware request cache.
//!
//! This module provides a GitHub-agnostic caching mechanism that:
//! - Stores raw JSON responses keyed by (parent id, resource URL, watermark)
//! - Never overwrites an entry; a new watermark produces a new key
//! - Counts hits, misses and stores per storage instance
//! - Treats storage failures as misses rather than errors

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, FileStorage, NoopStorage};
pub use traits::{CacheKey, CacheStatsSnapshot, Fetched};
