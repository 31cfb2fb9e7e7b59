//! Cache entries exposed to collaborators.

use std::sync::Arc;

use phealth_error::Result;
use phealth_index::{PartitionHealthIndex, StateRange};
use phealth_types::{Dimension, EntityKey, PartitionState};

/// One entity's current index and the freshness hint it was fetched under.
///
/// Cloning is cheap; the index is shared and immutable.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub entity_key: EntityKey,
    pub index: Arc<PartitionHealthIndex>,
    pub freshness_hint: String,
}

impl CacheEntry {
    #[must_use]
    pub fn dimensions(&self) -> &[Dimension] {
        self.index.dimensions()
    }

    pub fn state_for_key<S: AsRef<str>>(&self, keys: &[S]) -> Result<PartitionState> {
        self.index.state_for_key(keys)
    }

    pub fn state_for_single_dimension<S: AsRef<str>>(
        &self,
        dimension: usize,
        key: &str,
        other_selected: Option<&[S]>,
    ) -> Result<PartitionState> {
        self.index
            .state_for_single_dimension(dimension, key, other_selected)
    }

    pub fn ranges_for_single_dimension<S: AsRef<str>>(
        &self,
        dimension: usize,
        other_selected: Option<&[S]>,
    ) -> Result<Vec<StateRange>> {
        self.index
            .ranges_for_single_dimension(dimension, other_selected)
    }

    /// Whether this entry was fetched under `hint`.
    #[must_use]
    pub fn is_fresh_for(&self, hint: &str) -> bool {
        self.freshness_hint == hint
    }
}
