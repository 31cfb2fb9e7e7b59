//! Partition health for materialized, partitioned entities.
//!
//! [`PartitionHealthIndex`] answers "is this partition (or slice) materialized"
//! from a compact range payload. [`PartitionHealthCache`] keeps one index per
//! entity and refreshes entries as the caller's freshness hint moves.
//!
//! ```
//! use phealth::{Dimension, KeyRange, PartitionHealthIndex, PartitionState, RangePayload};
//!
//! let days = Dimension::with_keys("day", &["d1", "d2", "d3"])?;
//! let index = PartitionHealthIndex::new(
//!     vec![days],
//!     &RangePayload::OneDimensional(vec![KeyRange::new("d2", "d3")]),
//! )?;
//! assert_eq!(index.state_for_key(&["d1"])?, PartitionState::Missing);
//! assert_eq!(index.state_for_key(&["d3"])?, PartitionState::Success);
//! # Ok::<(), phealth::HealthError>(())
//! ```

pub mod logging;

pub use phealth_cache::{
    CacheConfig, CacheEntry, CacheStats, InMemoryFetcher, PartitionHealthCache,
    PartitionHealthFetcher, RefreshJob, RefreshOutcome,
};
pub use phealth_error::{HealthError, Result};
pub use phealth_index::{
    KeyPosition, MAX_DIMENSIONS, PartitionHealthIndex, PrimaryRange, SecondaryRange, StateRange,
};
pub use phealth_types::{
    Coverage, Dimension, DimensionKind, EntityKey, KeyRange, PartitionHealthPayload,
    PartitionState, PrimaryKeyRange, RangePayload,
};
