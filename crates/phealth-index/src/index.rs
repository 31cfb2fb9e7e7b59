//! The queryable partition health index.
//!
//! Built once from a fetch payload and immutable afterwards. Queries accept
//! keys in declared dimension order; internally ranges are stored in wire
//! order, where a time-like axis is always primary. The `inverted` flag and
//! the two translation helpers below are the only place that ordering is
//! reconciled.

use phealth_error::{HealthError, Result};
use phealth_types::{Dimension, PartitionHealthPayload, PartitionState, RangePayload};
use smallvec::SmallVec;
use tracing::debug;

use crate::decode::{AxisLookup, PrimaryRange, decode_ranges};

/// Highest supported number of partition dimensions.
pub const MAX_DIMENSIONS: usize = 2;

/// Health index over one entity's partitions.
#[derive(Debug, Clone)]
pub struct PartitionHealthIndex {
    /// Declared order, as reported by the backend.
    dimensions: Vec<Dimension>,
    /// Wire order.
    axes: SmallVec<[AxisLookup; MAX_DIMENSIONS]>,
    /// Wire order, sorted by start, non-overlapping.
    ranges: Vec<PrimaryRange>,
    inverted: bool,
}

impl PartitionHealthIndex {
    /// Build an index from declared dimensions and a wire range payload.
    pub fn new(dimensions: Vec<Dimension>, payload: &RangePayload) -> Result<Self> {
        if dimensions.len() > MAX_DIMENSIONS {
            return Err(HealthError::UnsupportedDimensionality {
                dimension: MAX_DIMENSIONS,
            });
        }

        let inverted = dimensions.len() == MAX_DIMENSIONS && dimensions[1].is_time_like();
        let mut axes = dimensions
            .iter()
            .map(AxisLookup::new)
            .collect::<Result<SmallVec<[AxisLookup; MAX_DIMENSIONS]>>>()?;
        if inverted {
            axes.swap(0, 1);
        }

        let ranges = decode_ranges(&axes, payload)?;
        debug!(
            dimensions = dimensions.len(),
            ranges = ranges.len(),
            inverted,
            "built partition health index"
        );
        Ok(Self {
            dimensions,
            axes,
            ranges,
            inverted,
        })
    }

    pub fn from_payload(payload: PartitionHealthPayload) -> Result<Self> {
        Self::new(payload.dimensions, &payload.ranges)
    }

    /// Dimensions in declared order regardless of internal storage order.
    #[must_use]
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Whether the wire payload's primary axis is declared dimension 1.
    #[must_use]
    pub const fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Decoded primary ranges in wire order.
    #[must_use]
    pub fn ranges(&self) -> &[PrimaryRange] {
        &self.ranges
    }

    /// Number of partition key combinations; 0 for an unpartitioned entity.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        if self.dimensions.is_empty() {
            return 0;
        }
        self.dimensions.iter().map(Dimension::len).product()
    }

    /// Number of materialized key combinations, computed from ranges alone.
    #[must_use]
    pub fn materialized_count(&self) -> usize {
        let secondary_len = self.axes.get(1).map_or(1, AxisLookup::len);
        self.ranges
            .iter()
            .map(|range| range.len() * range.secondary_width(secondary_len))
            .sum()
    }

    /// Map a declared dimension index to its wire axis. The mapping is its own
    /// inverse, so it also converts wire axes back to declared indices.
    #[inline]
    fn wire_axis(&self, dimension: usize) -> usize {
        if self.inverted { 1 - dimension } else { dimension }
    }

    /// Reorder a declared-order key pair into wire order.
    #[inline]
    fn to_wire_order<'k>(&self, keys: [&'k str; 2]) -> [&'k str; 2] {
        let [first, second] = keys;
        if self.inverted {
            [second, first]
        } else {
            [first, second]
        }
    }

    /// Binary search for the primary range containing `pos`.
    fn containing_range(&self, pos: usize) -> Option<&PrimaryRange> {
        let idx = self.ranges.partition_point(|range| range.end < pos);
        self.ranges.get(idx).filter(|range| range.contains(pos))
    }

    /// Point state for wire-order positions on a two-axis index.
    fn state_at(&self, primary: Option<usize>, secondary: Option<usize>) -> PartitionState {
        let (Some(primary), Some(secondary)) = (primary, secondary) else {
            return PartitionState::Missing;
        };
        match self.containing_range(primary) {
            Some(range) if range.covers_secondary(secondary) => PartitionState::Success,
            _ => PartitionState::Missing,
        }
    }

    /// State of one partition, keys given in declared order.
    ///
    /// Keys unknown to their dimension are reported as `Missing`.
    pub fn state_for_key<S: AsRef<str>>(&self, keys: &[S]) -> Result<PartitionState> {
        if keys.len() != self.dimensions.len() {
            return Err(HealthError::KeyArity {
                expected: self.dimensions.len(),
                actual: keys.len(),
            });
        }
        match keys {
            [key] => Ok(self
                .axes[0]
                .position(key.as_ref())
                .and_then(|pos| self.containing_range(pos))
                .map_or(PartitionState::Missing, |_| PartitionState::Success)),
            [first, second] => {
                let [primary, secondary] = self.to_wire_order([first.as_ref(), second.as_ref()]);
                Ok(self.state_at(
                    self.axes[0].position(primary),
                    self.axes[1].position(secondary),
                ))
            }
            _ => Err(HealthError::UnsupportedDimensionality {
                dimension: keys.len(),
            }),
        }
    }

    /// State of every partition sharing `key` along `dimension`.
    ///
    /// `other_selected` restricts the other dimension to the given keys; when
    /// absent, the other dimension is considered in full.
    pub fn state_for_single_dimension<S: AsRef<str>>(
        &self,
        dimension: usize,
        key: &str,
        other_selected: Option<&[S]>,
    ) -> Result<PartitionState> {
        if dimension >= MAX_DIMENSIONS {
            return Err(HealthError::UnsupportedDimensionality { dimension });
        }
        // With one dimension every slice is a single partition.
        if self.dimensions.len() == 1 {
            return self.state_for_key(&[key]);
        }
        if dimension >= self.dimensions.len() {
            return Err(HealthError::UnsupportedDimensionality { dimension });
        }

        if self.wire_axis(dimension) == 0 {
            let primary = self.axes[0].position(key);
            return Ok(match other_selected {
                None => primary
                    .and_then(|pos| self.containing_range(pos))
                    .map_or(PartitionState::Missing, |range| range.coverage.state()),
                Some(others) => PartitionState::merge(
                    others
                        .iter()
                        .map(|other| self.state_at(primary, self.axes[1].position(other.as_ref()))),
                ),
            });
        }

        let Some(secondary) = self.axes[1].position(key) else {
            return Ok(PartitionState::Missing);
        };
        let covers = |range: &PrimaryRange| range.covers_secondary(secondary);
        Ok(match other_selected {
            Some(others) => {
                let covered = others
                    .iter()
                    .filter(|other| {
                        self.axes[0]
                            .position(other.as_ref())
                            .and_then(|pos| self.containing_range(pos))
                            .is_some_and(covers)
                    })
                    .count();
                PartitionState::from_counts(covered, others.len())
            }
            None => {
                let matched = self.ranges.iter().filter(|&range| covers(range)).count();
                PartitionState::from_counts(matched, self.ranges.len())
            }
        })
    }
}
