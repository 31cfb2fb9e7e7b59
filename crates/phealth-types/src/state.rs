//! Health states reported by index queries.

use serde::{Deserialize, Serialize};

/// Materialization state of one partition or a group of partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionState {
    Success,
    Missing,
    /// Some, but not all, of the addressed partitions are materialized.
    SuccessMissing,
}

impl PartitionState {
    /// Fold per-combination states: all `Success` stays `Success`, all
    /// `Missing` stays `Missing`, anything else is `SuccessMissing`.
    ///
    /// An empty input addresses no partitions and is `Missing`.
    pub fn merge<I>(states: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut any_success = false;
        let mut any_missing = false;
        for state in states {
            match state {
                Self::Success => any_success = true,
                Self::Missing => any_missing = true,
                Self::SuccessMissing => return Self::SuccessMissing,
            }
            if any_success && any_missing {
                return Self::SuccessMissing;
            }
        }
        if any_success {
            Self::Success
        } else {
            Self::Missing
        }
    }

    /// All/some/none classification of `matched` out of `total`.
    #[must_use]
    pub const fn from_counts(matched: usize, total: usize) -> Self {
        if matched == 0 {
            Self::Missing
        } else if matched >= total {
            Self::Success
        } else {
            Self::SuccessMissing
        }
    }
}

/// Whether a primary range is materialized across the whole second axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Coverage {
    Full,
    Partial,
}

impl Coverage {
    #[must_use]
    pub const fn state(self) -> PartitionState {
        match self {
            Self::Full => PartitionState::Success,
            Self::Partial => PartitionState::SuccessMissing,
        }
    }
}
