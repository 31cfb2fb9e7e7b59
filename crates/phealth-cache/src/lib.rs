//! Partition health cache.
//!
//! Holds one [`PartitionHealthIndex`](phealth_index::PartitionHealthIndex)
//! per entity, tagged with the freshness hint it was fetched under, and
//! refreshes stale entries through a serialized, one-fetch-at-a-time worker.

mod cache;
pub mod config;
mod entry;
mod fetcher;
mod stats;
mod worker;

pub use cache::{PartitionHealthCache, RefreshJob, RefreshOutcome};
pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use fetcher::{InMemoryFetcher, PartitionHealthFetcher};
pub use stats::CacheStats;
