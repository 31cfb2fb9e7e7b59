//! Partitioning axes.

use std::collections::HashSet;

use phealth_error::{HealthError, Result};
use serde::{Deserialize, Serialize};

/// How the backend partitions along one axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    #[default]
    Static,
    TimeWindow,
    Dynamic,
}

impl DimensionKind {
    /// Time-like axes are always primary on the wire.
    #[must_use]
    pub const fn is_time_like(self) -> bool {
        matches!(self, Self::TimeWindow)
    }
}

/// One partitioning axis: a name plus its ordered, duplicate-free keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub name: String,
    pub partition_keys: Vec<String>,
    #[serde(default)]
    pub kind: DimensionKind,
}

impl Dimension {
    /// Build a dimension, rejecting duplicate keys.
    pub fn new(
        name: impl Into<String>,
        partition_keys: Vec<String>,
        kind: DimensionKind,
    ) -> Result<Self> {
        let dimension = Self {
            name: name.into(),
            partition_keys,
            kind,
        };
        dimension.validate()?;
        Ok(dimension)
    }

    /// Shorthand for a static dimension over string literals.
    pub fn with_keys<S: AsRef<str>>(name: impl Into<String>, keys: &[S]) -> Result<Self> {
        Self::new(
            name,
            keys.iter().map(|key| key.as_ref().to_owned()).collect(),
            DimensionKind::Static,
        )
    }

    /// Check the uniqueness invariant. Deserialized dimensions skip
    /// [`Dimension::new`], so decoders call this explicitly.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.partition_keys.len());
        for key in &self.partition_keys {
            if !seen.insert(key.as_str()) {
                return Err(HealthError::DuplicatePartitionKey {
                    dimension: self.name.clone(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.partition_keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partition_keys.is_empty()
    }

    /// Linear scan for a key's position.
    #[must_use]
    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.partition_keys.iter().position(|candidate| candidate == key)
    }

    #[must_use]
    pub fn is_time_like(&self) -> bool {
        self.kind.is_time_like()
    }
}
