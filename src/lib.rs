//! Facade crate for the nodecache storage layer.
//!
//! Re-exports the coordinate codec and capability traits from
//! `nodecache-core` together with the storage media from `nodecache-store`.
//! SQLite-backed media sit behind the `store-sqlite` feature.

#![forbid(unsafe_code)]

pub use nodecache_core::{
    Axis, COORDINATE_SCALE, CoordinateError, DEFAULT_DENSE_CAPACITY, ElementCacheReader,
    ElementCacheWriter, FIXED_LAT_LON_SIZE, FixedLatLon, PointReader, PointWriter,
};
pub use nodecache_store::element_cache::typed::{TypedCacheError, read_decoded, write_encoded};
pub use nodecache_store::{
    BlobLocation, BoxedCacheReader, BoxedCacheWriter, BoxedPointReader, BoxedPointWriter,
    ElementCacheError, ElementCacheKind, OffsetIndexError, ParseKindError, PointStorageKind,
    PointStoreError, StoreOptions, open_cache_reader, open_cache_writer, open_point_reader,
    open_point_writer,
};

#[cfg(feature = "store-sqlite")]
pub use nodecache_store::sqlite::{
    BlobFileError, BlobFileMode, ConnectionPool, PoolError, PoolOptions, SqliteBlobFile,
};

#[cfg(feature = "test-support")]
pub use nodecache_core::test_support;
