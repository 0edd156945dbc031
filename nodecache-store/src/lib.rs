//! Storage media for node coordinates and cached OSM elements.
//!
//! Responsibilities:
//! - Implement the point storage and element cache capabilities defined in
//!   `nodecache-core` over files, memory and SQLite.
//! - Share SQLite connections between media through an injectable pool.
//! - Select a medium at start-up from its configured kind.
//!
//! Boundaries:
//! - Do not parse OSM input; producers feed ids and coordinates in.
//! - Keep the on-disk formats stable; files outlive a single run.
//!
//! Invariants:
//! - All multi-byte fields are little-endian.
//! - Data is visible to readers only after the writer flushes.
//! - No global mutable state; connection sharing is scoped to a pool value.

#![deny(unsafe_code)]

pub mod element_cache;
mod error;
pub mod offset_index;
pub mod paths;
pub mod point;
#[cfg(feature = "store-sqlite")]
pub mod sqlite;
pub mod variant;

pub use element_cache::ElementCacheError;
pub use error::PointStoreError;
pub use offset_index::{BlobLocation, IndexValue, OffsetIndexError, OffsetIndexReader, OffsetIndexWriter};
pub use variant::{
    BoxedCacheReader, BoxedCacheWriter, BoxedPointReader, BoxedPointWriter, ElementCacheKind,
    ParseKindError, PointStorageKind, StoreOptions, open_cache_reader, open_cache_writer,
    open_point_reader, open_point_writer,
};
