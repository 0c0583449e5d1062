//! Cache orchestration over the remote catalog and the local store.
//!
//! This crate owns the population pipeline, per-scope freshness tracking
//! with deduplicated prefetching, the on-disk artwork cache, and handles
//! for the background tasks those spawn.

pub mod artwork;
pub mod error;
pub mod freshness;
pub mod key;
pub mod populate;
pub mod progress;
pub mod task;

#[cfg(test)]
pub(crate) mod testutil;

pub use artwork::{ArtworkCache, ArtworkStats, ValidateStats};
pub use error::CacheError;
pub use freshness::Freshness;
pub use key::CacheKey;
pub use populate::{
    MAX_CONCURRENT_FETCHES, MAX_REQUESTS_PER_KEY, PAGE_SIZE, PopulateStats, populate,
    refresh_collection, refresh_platform,
};
pub use progress::Progress;
pub use task::{TaskHandle, TaskState};
