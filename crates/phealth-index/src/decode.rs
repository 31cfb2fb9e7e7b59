//! Range decoding: boundary keys to index-addressed intervals.
//!
//! The wire payload names range boundaries by partition key. Decoding resolves
//! each boundary against its axis, normalizes nested intervals, and derives
//! per-range coverage. All inputs are in wire order (the primary axis first).

use hashbrown::HashMap;
use phealth_error::{HealthError, Result};
use phealth_types::{Coverage, Dimension, KeyRange, PrimaryKeyRange, RangePayload};
use smallvec::SmallVec;
use tracing::{debug, warn};

/// Key-to-position lookup for one axis.
#[derive(Debug, Clone)]
pub struct AxisLookup {
    name: String,
    positions: HashMap<String, usize>,
}

impl AxisLookup {
    pub fn new(dimension: &Dimension) -> Result<Self> {
        let mut positions = HashMap::with_capacity(dimension.partition_keys.len());
        for (idx, key) in dimension.partition_keys.iter().enumerate() {
            if positions.insert(key.clone(), idx).is_some() {
                return Err(HealthError::DuplicatePartitionKey {
                    dimension: dimension.name.clone(),
                    key: key.clone(),
                });
            }
        }
        Ok(Self {
            name: dimension.name.clone(),
            positions,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position of `key`, or `None` for keys unknown to this axis.
    #[inline]
    #[must_use]
    pub fn position(&self, key: &str) -> Option<usize> {
        self.positions.get(key).copied()
    }

    /// Resolve an interval's bounds. `Ok(None)` when either bound is not a
    /// partition of this axis (a renamed or not yet listed key); the caller
    /// skips such intervals.
    fn resolve_interval(&self, start: &str, end: &str) -> Result<Option<(usize, usize)>> {
        let (Some(lo), Some(hi)) = (self.position(start), self.position(end)) else {
            warn!(
                dimension = %self.name,
                start,
                end,
                "skipping range with a boundary key outside the dimension"
            );
            return Ok(None);
        };
        if lo > hi {
            return Err(HealthError::malformed(format!(
                "range {start:?}..={end:?} in dimension {:?} ends before it starts",
                self.name
            )));
        }
        Ok(Some((lo, hi)))
    }
}

/// Inclusive interval over the secondary axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryRange {
    pub start: usize,
    pub end: usize,
}

impl SecondaryRange {
    #[inline]
    #[must_use]
    pub const fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// Inclusive length; a reversed interval counts as one key.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

/// Inclusive interval over the primary axis.
///
/// An empty `secondary` list means every key of the secondary axis (if any)
/// is materialized for every primary key in the interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryRange {
    pub start: usize,
    pub end: usize,
    pub coverage: Coverage,
    /// Sorted, coalesced, non-adjacent.
    pub secondary: SmallVec<[SecondaryRange; 4]>,
}

impl PrimaryRange {
    #[inline]
    #[must_use]
    pub const fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// Inclusive length; a reversed interval counts as one key.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Whether the secondary position is materialized within this range.
    #[inline]
    #[must_use]
    pub fn covers_secondary(&self, pos: usize) -> bool {
        if self.secondary.is_empty() {
            return true;
        }
        let idx = self.secondary.partition_point(|range| range.end < pos);
        self.secondary
            .get(idx)
            .is_some_and(|range| range.contains(pos))
    }

    /// Number of secondary keys materialized per primary key.
    #[must_use]
    pub fn secondary_width(&self, secondary_axis_len: usize) -> usize {
        if self.secondary.is_empty() {
            secondary_axis_len
        } else {
            self.secondary.iter().map(SecondaryRange::len).sum()
        }
    }
}

/// Decode a payload against axes given in wire order.
///
/// Returns primary ranges sorted by start. Ranges naming a key outside their
/// axis are skipped. Fails on reversed bounds, overlapping primary ranges, or
/// a payload shape that does not match the axis count.
pub fn decode_ranges(axes: &[AxisLookup], payload: &RangePayload) -> Result<Vec<PrimaryRange>> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    let mut ranges = match (payload, axes) {
        (RangePayload::OneDimensional(ranges), [primary]) => decode_flat(primary, ranges)?,
        (RangePayload::TwoDimensional(ranges), [primary, secondary]) => {
            decode_nested(primary, secondary, ranges)?
        }
        _ => {
            return Err(HealthError::PayloadShapeMismatch {
                dimensions: axes.len(),
                shape: payload.shape(),
            });
        }
    };

    ranges.sort_by_key(|range| range.start);
    if let Some(pair) = ranges.windows(2).find(|pair| pair[1].start <= pair[0].end) {
        return Err(HealthError::malformed(format!(
            "primary ranges {}..={} and {}..={} overlap",
            pair[0].start, pair[0].end, pair[1].start, pair[1].end
        )));
    }

    debug!(
        axes = axes.len(),
        wire_ranges = payload.len(),
        decoded_ranges = ranges.len(),
        "decoded partition ranges"
    );
    Ok(ranges)
}

fn decode_flat(primary: &AxisLookup, ranges: &[KeyRange]) -> Result<Vec<PrimaryRange>> {
    let mut decoded = Vec::with_capacity(ranges.len());
    for range in ranges {
        let Some((start, end)) = primary.resolve_interval(&range.start, &range.end)? else {
            continue;
        };
        decoded.push(PrimaryRange {
            start,
            end,
            coverage: Coverage::Full,
            secondary: SmallVec::new(),
        });
    }
    Ok(decoded)
}

fn decode_nested(
    primary: &AxisLookup,
    secondary: &AxisLookup,
    ranges: &[PrimaryKeyRange],
) -> Result<Vec<PrimaryRange>> {
    let mut decoded = Vec::with_capacity(ranges.len());
    for range in ranges {
        let Some((start, end)) =
            primary.resolve_interval(&range.primary_dim_start, &range.primary_dim_end)?
        else {
            continue;
        };

        let mut nested: SmallVec<[SecondaryRange; 4]> = SmallVec::new();
        for inner in &range.secondary_dim_ranges {
            if let Some((start, end)) = secondary.resolve_interval(&inner.start, &inner.end)? {
                nested.push(SecondaryRange { start, end });
            }
        }

        if nested.is_empty() {
            // Nothing known to be materialized under this primary interval.
            continue;
        }
        coalesce(&mut nested);

        let spans_axis =
            nested.len() == 1 && nested[0].start == 0 && nested[0].end + 1 == secondary.len();
        decoded.push(PrimaryRange {
            start,
            end,
            coverage: if spans_axis {
                Coverage::Full
            } else {
                Coverage::Partial
            },
            secondary: nested,
        });
    }
    Ok(decoded)
}

/// Sort and merge overlapping or adjacent intervals in place.
fn coalesce(ranges: &mut SmallVec<[SecondaryRange; 4]>) {
    ranges.sort_by_key(|range| range.start);
    let mut merged: SmallVec<[SecondaryRange; 4]> = SmallVec::with_capacity(ranges.len());
    for range in ranges.drain(..) {
        match merged.last_mut() {
            Some(last) if range.start <= last.end + 1 => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    *ranges = merged;
}
