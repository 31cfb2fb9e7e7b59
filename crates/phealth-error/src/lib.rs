//! Error types for the partition health crates.
//!
//! A single enum is shared by the index, the decoder and the cache so that
//! callers can match on one type regardless of which layer failed.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T, E = HealthError> = std::result::Result<T, E>;

/// Every failure the partition health layers can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
    /// A query addressed a dimension index the index does not support, or the
    /// index was declared with more than two dimensions.
    #[error("unsupported dimensionality: dimension {dimension} (at most 2 partition dimensions)")]
    UnsupportedDimensionality { dimension: usize },

    /// A point query supplied the wrong number of keys.
    #[error("expected {expected} partition keys, got {actual}")]
    KeyArity { expected: usize, actual: usize },

    /// A dimension declared the same partition key twice.
    #[error("duplicate partition key {key:?} in dimension {dimension:?}")]
    DuplicatePartitionKey { dimension: String, key: String },

    /// A range payload referenced unknown keys or had inverted/overlapping bounds.
    #[error("malformed range payload: {detail}")]
    MalformedRange { detail: String },

    /// The payload shape disagrees with the declared dimension count.
    #[error("{shape} range payload cannot describe {dimensions} dimension(s)")]
    PayloadShapeMismatch {
        dimensions: usize,
        shape: &'static str,
    },

    /// The collaborator's fetch function rejected.
    #[error("fetch failed for {entity}: {detail}")]
    FetchFailure { entity: String, detail: String },

    /// The fetch did not resolve within the configured timeout.
    #[error("fetch for {entity} timed out after {timeout_ms}ms")]
    FetchTimeout { entity: String, timeout_ms: u64 },

    /// Invalid cache configuration.
    #[error("invalid configuration: {detail}")]
    Config { detail: String },

    /// Invariant violation inside the crate.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HealthError {
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedRange {
            detail: detail.into(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    pub fn fetch_failure(entity: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::FetchFailure {
            entity: entity.into(),
            detail: detail.into(),
        }
    }

    /// Whether a later retry of the same operation could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::FetchFailure { .. } | Self::FetchTimeout { .. })
    }
}
