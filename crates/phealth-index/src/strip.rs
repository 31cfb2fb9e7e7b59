//! Run-length state strips along one dimension.
//!
//! Collaborators draw a partition strip per dimension; consecutive keys with
//! the same state collapse into one [`StateRange`].

use phealth_error::{HealthError, Result};
use phealth_types::PartitionState;
use serde::{Deserialize, Serialize};

use crate::index::PartitionHealthIndex;

/// Position and key of one end of a [`StateRange`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPosition {
    pub idx: usize,
    pub key: String,
}

/// Consecutive keys of one dimension sharing a state, inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRange {
    pub start: KeyPosition,
    pub end: KeyPosition,
    pub state: PartitionState,
}

impl PartitionHealthIndex {
    /// Group the keys of `dimension` (declared order) into runs of equal
    /// [`PartitionHealthIndex::state_for_single_dimension`] results.
    ///
    /// Every key is covered, `Missing` runs included.
    pub fn ranges_for_single_dimension<S: AsRef<str>>(
        &self,
        dimension: usize,
        other_selected: Option<&[S]>,
    ) -> Result<Vec<StateRange>> {
        let keys = &self
            .dimensions()
            .get(dimension)
            .ok_or(HealthError::UnsupportedDimensionality { dimension })?
            .partition_keys;

        let mut runs: Vec<StateRange> = Vec::new();
        for (idx, key) in keys.iter().enumerate() {
            let state = self.state_for_single_dimension(dimension, key, other_selected)?;
            match runs.last_mut() {
                Some(run) if run.state == state => {
                    run.end = KeyPosition {
                        idx,
                        key: key.clone(),
                    };
                }
                _ => runs.push(StateRange {
                    start: KeyPosition {
                        idx,
                        key: key.clone(),
                    },
                    end: KeyPosition {
                        idx,
                        key: key.clone(),
                    },
                    state,
                }),
            }
        }
        Ok(runs)
    }
}
