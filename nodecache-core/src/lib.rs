//! Core types for the nodecache storage layer.
//!
//! The crate defines the fixed-point coordinate codec and the capability
//! traits shared by every storage medium. Concrete media live in
//! `nodecache-store`; this crate stays free of I/O so producers and
//! consumers can depend on the traits alone.

#![forbid(unsafe_code)]

pub mod cache;
pub mod coord;
pub mod point;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use cache::{ElementCacheReader, ElementCacheWriter};
pub use coord::{Axis, COORDINATE_SCALE, CoordinateError, FIXED_LAT_LON_SIZE, FixedLatLon};
pub use point::{PointReader, PointWriter};

/// Upper bound on OSM node ids sized into dense in-memory stores by default.
///
/// OSM had around 4.1 billion nodes in late 2017; 2^33 leaves headroom.
pub const DEFAULT_DENSE_CAPACITY: u64 = 1 << 33;
