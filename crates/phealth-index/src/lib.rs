//! Partition health index.
//!
//! Turns a sparse list of materialized partition ranges into a structure that
//! answers point and partial-key health queries in time proportional to the
//! number of ranges, for entities partitioned along one or two dimensions.
//!
//! - [`decode`]: boundary keys to index-addressed [`PrimaryRange`]s.
//! - [`PartitionHealthIndex`]: the immutable query structure.
//! - [`StateRange`]: run-length strips along one dimension.

pub mod decode;
mod index;
mod strip;

pub use decode::{AxisLookup, PrimaryRange, SecondaryRange};
pub use index::{MAX_DIMENSIONS, PartitionHealthIndex};
pub use strip::{KeyPosition, StateRange};
