//! Core type definitions for partition health.
//!
//! Everything here is plain data: entity identity, partition dimensions, the
//! health states reported by queries, and the wire shapes a backend returns.

pub mod dimension;
pub mod entity;
pub mod payload;
pub mod state;

pub use dimension::{Dimension, DimensionKind};
pub use entity::EntityKey;
pub use payload::{KeyRange, PartitionHealthPayload, PrimaryKeyRange, RangePayload};
pub use state::{Coverage, PartitionState};
