//! Wire shapes returned by the partition health fetch.
//!
//! Ranges carry boundary keys only; positions are resolved against the
//! declared dimensions when an index is built.

use serde::{Deserialize, Serialize};

use crate::dimension::Dimension;

/// Inclusive key interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: String,
    pub end: String,
}

impl KeyRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Primary interval with nested secondary intervals (2D payloads).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeyRange {
    pub primary_dim_start: String,
    pub primary_dim_end: String,
    pub secondary_dim_ranges: Vec<KeyRange>,
}

impl PrimaryKeyRange {
    pub fn new(
        start: impl Into<String>,
        end: impl Into<String>,
        secondary_dim_ranges: Vec<KeyRange>,
    ) -> Self {
        Self {
            primary_dim_start: start.into(),
            primary_dim_end: end.into(),
            secondary_dim_ranges,
        }
    }
}

/// Materialized ranges for one entity.
///
/// The two shapes are distinguished structurally; the 2D variant is tried
/// first because its fields are a strict superset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangePayload {
    TwoDimensional(Vec<PrimaryKeyRange>),
    OneDimensional(Vec<KeyRange>),
}

impl RangePayload {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::TwoDimensional(ranges) => ranges.len(),
            Self::OneDimensional(ranges) => ranges.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::TwoDimensional(_) => "2D",
            Self::OneDimensional(_) => "1D",
        }
    }
}

impl Default for RangePayload {
    fn default() -> Self {
        Self::OneDimensional(Vec::new())
    }
}

/// Result of one fetch: declared dimensions plus their ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionHealthPayload {
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub ranges: RangePayload,
}
