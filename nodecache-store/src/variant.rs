//! Choosing a storage medium at start-up.
//!
//! Pipelines pick a [`PointStorageKind`] and an [`ElementCacheKind`] once,
//! typically from configuration, and then talk to the boxed trait objects
//! returned here.

use std::fmt;
use std::str::FromStr;

use camino::Utf8Path;
use nodecache_core::{
    DEFAULT_DENSE_CAPACITY, ElementCacheReader, ElementCacheWriter, PointReader, PointWriter,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element_cache::{ElementCacheError, FileElementCacheReader, FileElementCacheWriter};
use crate::point::{
    DenseFilePointReader, DenseFilePointWriter, DenseMemoryPointReader, DenseMemoryPointWriter,
    SparsePointReader, SparsePointWriter,
};
use crate::PointStoreError;
#[cfg(feature = "store-sqlite")]
use crate::element_cache::{SqliteElementCacheReader, SqliteElementCacheWriter};
#[cfg(feature = "store-sqlite")]
use crate::point::{SqlitePointReader, SqlitePointWriter};
#[cfg(feature = "store-sqlite")]
use crate::sqlite::ConnectionPool;

/// Point writer behind dynamic dispatch.
pub type BoxedPointWriter = Box<dyn PointWriter<Error = PointStoreError> + Send>;
/// Point reader behind dynamic dispatch.
pub type BoxedPointReader = Box<dyn PointReader<Error = PointStoreError> + Send>;
/// Element cache writer behind dynamic dispatch.
pub type BoxedCacheWriter = Box<dyn ElementCacheWriter<Error = ElementCacheError> + Send>;
/// Element cache reader behind dynamic dispatch.
pub type BoxedCacheReader = Box<dyn ElementCacheReader<Error = ElementCacheError> + Send>;

/// Raised when a storage kind name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {family} kind `{value}`; expected one of: {expected}")]
pub struct ParseKindError {
    family: &'static str,
    value: String,
    expected: &'static str,
}

/// Node coordinate storage media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointStorageKind {
    /// One 8-byte slot per id in a file, read through a memory map.
    DenseFile,
    /// One 8-byte slot per id held in memory and bulk-written on flush.
    DenseMemory,
    /// `(id, coordinate)` records loaded into a hash map.
    #[default]
    Sparse,
    /// Rows in a SQLite `nodes` table.
    #[cfg(feature = "store-sqlite")]
    Sqlite,
}

impl PointStorageKind {
    #[cfg(feature = "store-sqlite")]
    const EXPECTED: &'static str = "dense-file, dense-memory, sparse, sqlite";
    #[cfg(not(feature = "store-sqlite"))]
    const EXPECTED: &'static str = "dense-file, dense-memory, sparse";

    /// Name used in configuration and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DenseFile => "dense-file",
            Self::DenseMemory => "dense-memory",
            Self::Sparse => "sparse",
            #[cfg(feature = "store-sqlite")]
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for PointStorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointStorageKind {
    type Err = ParseKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dense-file" => Ok(Self::DenseFile),
            "dense-memory" => Ok(Self::DenseMemory),
            "sparse" => Ok(Self::Sparse),
            #[cfg(feature = "store-sqlite")]
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(ParseKindError {
                family: "point storage",
                value: value.to_owned(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// Element cache media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementCacheKind {
    /// Data file plus a `.offs` index.
    #[default]
    File,
    /// Rows in a SQLite `element_cache` table.
    #[cfg(feature = "store-sqlite")]
    Sqlite,
}

impl ElementCacheKind {
    #[cfg(feature = "store-sqlite")]
    const EXPECTED: &'static str = "file, sqlite";
    #[cfg(not(feature = "store-sqlite"))]
    const EXPECTED: &'static str = "file";

    /// Name used in configuration and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            #[cfg(feature = "store-sqlite")]
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for ElementCacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementCacheKind {
    type Err = ParseKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            #[cfg(feature = "store-sqlite")]
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(ParseKindError {
                family: "element cache",
                value: value.to_owned(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// Settings shared by the factory functions.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Slots allocated by dense in-memory writers.
    pub dense_capacity: u64,
    /// Read file-backed element caches into memory on open.
    pub preload_cache: bool,
    /// Pool through which SQLite media share connections.
    #[cfg(feature = "store-sqlite")]
    pub pool: ConnectionPool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            dense_capacity: DEFAULT_DENSE_CAPACITY,
            preload_cache: false,
            #[cfg(feature = "store-sqlite")]
            pool: ConnectionPool::default(),
        }
    }
}

/// Open a point writer of `kind` for the artefact named `name`.
pub fn open_point_writer(
    kind: PointStorageKind,
    name: &Utf8Path,
    options: &StoreOptions,
) -> Result<BoxedPointWriter, PointStoreError> {
    Ok(match kind {
        PointStorageKind::DenseFile => Box::new(DenseFilePointWriter::create(name)?),
        PointStorageKind::DenseMemory => {
            Box::new(DenseMemoryPointWriter::create(name, options.dense_capacity)?)
        }
        PointStorageKind::Sparse => Box::new(SparsePointWriter::create(name)?),
        #[cfg(feature = "store-sqlite")]
        PointStorageKind::Sqlite => Box::new(SqlitePointWriter::create(&options.pool, name)?),
    })
}

/// Open a point reader of `kind` for the artefact named `name`.
pub fn open_point_reader(
    kind: PointStorageKind,
    name: &Utf8Path,
    options: &StoreOptions,
) -> Result<BoxedPointReader, PointStoreError> {
    #[cfg(not(feature = "store-sqlite"))]
    let _ = options;
    Ok(match kind {
        PointStorageKind::DenseFile => Box::new(DenseFilePointReader::open(name)?),
        PointStorageKind::DenseMemory => Box::new(DenseMemoryPointReader::open(name)?),
        PointStorageKind::Sparse => Box::new(SparsePointReader::open(name)?),
        #[cfg(feature = "store-sqlite")]
        PointStorageKind::Sqlite => Box::new(SqlitePointReader::open(&options.pool, name)?),
    })
}

/// Open an element cache writer of `kind` for the artefact named `name`.
pub fn open_cache_writer(
    kind: ElementCacheKind,
    name: &Utf8Path,
    options: &StoreOptions,
) -> Result<BoxedCacheWriter, ElementCacheError> {
    #[cfg(not(feature = "store-sqlite"))]
    let _ = options;
    Ok(match kind {
        ElementCacheKind::File => Box::new(FileElementCacheWriter::create(name)?),
        #[cfg(feature = "store-sqlite")]
        ElementCacheKind::Sqlite => Box::new(SqliteElementCacheWriter::create(&options.pool, name)?),
    })
}

/// Open an element cache reader of `kind` for the artefact named `name`.
///
/// Offsets are not loaded; call `load_offsets` before reading.
pub fn open_cache_reader(
    kind: ElementCacheKind,
    name: &Utf8Path,
    options: &StoreOptions,
) -> Result<BoxedCacheReader, ElementCacheError> {
    Ok(match kind {
        ElementCacheKind::File => Box::new(FileElementCacheReader::open(name, options.preload_cache)?),
        #[cfg(feature = "store-sqlite")]
        ElementCacheKind::Sqlite => Box::new(SqliteElementCacheReader::open(&options.pool, name)?),
    })
}
