//! Write-once, read-many caches of serialised OSM elements.
//!
//! The file-backed cache appends blobs to a data file and records their
//! locations in an offset index next to it. The relational cache keeps blobs
//! in a table keyed by id. [`typed`] layers `bincode` encoding over either.

mod file;
#[cfg(feature = "store-sqlite")]
mod sqlite;
pub mod typed;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::offset_index::OffsetIndexError;
#[cfg(feature = "store-sqlite")]
use crate::sqlite::PoolError;

pub use file::{FileElementCacheReader, FileElementCacheWriter, offsets_path};
#[cfg(feature = "store-sqlite")]
pub use sqlite::{SqliteElementCacheReader, SqliteElementCacheWriter, sqlite_cache_path};

/// Errors raised by element caches.
#[derive(Debug, Error)]
pub enum ElementCacheError {
    /// Opening or creating the data file failed.
    #[error("failed to open element cache {path}")]
    Open {
        /// Data file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Reading or writing the data file failed.
    #[error("I/O failure on element cache {path}")]
    Io {
        /// Data file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The offset index failed.
    #[error(transparent)]
    Index(#[from] OffsetIndexError),
    /// A blob is too large for the index's 32-bit length field.
    #[error("element {key} is {len} bytes, larger than a cache entry can describe")]
    BlobTooLarge {
        /// Element key.
        key: u64,
        /// Blob length in bytes.
        len: usize,
    },
    /// The index points past the end of the data file.
    #[error("element {key} at offset {offset} ({len} bytes) lies beyond the end of {path}")]
    Truncated {
        /// Data file path.
        path: Utf8PathBuf,
        /// Element key.
        key: u64,
        /// Recorded offset.
        offset: u64,
        /// Recorded length.
        len: u32,
    },
    /// The key cannot be stored as an SQLite integer.
    #[error("element key {key} exceeds the SQLite integer range")]
    KeyOutOfRange {
        /// Element key.
        key: u64,
    },
    /// Acquiring a pooled SQLite connection failed.
    #[cfg(feature = "store-sqlite")]
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// A SQLite statement failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to {operation} in {path}")]
    Sqlite {
        /// Short description of the statement that failed.
        operation: &'static str,
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
}
