//! Error type shared by every point storage medium.

use camino::Utf8PathBuf;
use nodecache_core::CoordinateError;
use thiserror::Error;

#[cfg(feature = "store-sqlite")]
use crate::sqlite::PoolError;

/// Errors raised by point storage writers and readers.
///
/// All four media report through this one type so callers can hold any of
/// them behind a `Box<dyn PointWriter<Error = PointStoreError>>`.
#[derive(Debug, Error)]
pub enum PointStoreError {
    /// Opening or creating the backing file failed.
    #[error("failed to open point store at {path}")]
    Open {
        /// Path of the backing file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Reading or writing the backing file failed after it was opened.
    #[error("I/O failure on point store {path}")]
    Io {
        /// Path of the backing file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The coordinate could not be represented in fixed point.
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
    /// A dense in-memory store received an id past its capacity.
    #[error("node id {id} exceeds the dense store capacity of {capacity} entries")]
    CapacityExceeded {
        /// Offending node id.
        id: u64,
        /// Configured number of slots.
        capacity: u64,
    },
    /// The dense in-memory array could not be allocated.
    #[error("failed to allocate {capacity} dense point slots")]
    Allocation {
        /// Requested number of slots.
        capacity: u64,
    },
    /// The node id cannot be addressed by this medium.
    #[error("node id {id} cannot be addressed by this point store")]
    IdOutOfRange {
        /// Offending node id.
        id: u64,
    },
    /// The backing file length is not a whole number of records.
    #[error("{path} holds {len} bytes, which is not a multiple of the {record_size}-byte record")]
    Corrupt {
        /// Path of the backing file.
        path: Utf8PathBuf,
        /// Observed file length.
        len: u64,
        /// Expected record size.
        record_size: usize,
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

impl PointStoreError {
    /// Whether the error means the store cannot hold the input at all.
    ///
    /// Fatal errors cover misconfiguration and unrepresentable data. The
    /// remaining variants are environmental and may succeed on retry.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Coordinate(_)
                | Self::CapacityExceeded { .. }
                | Self::Allocation { .. }
                | Self::IdOutOfRange { .. }
                | Self::Corrupt { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodecache_core::FixedLatLon;
    use rstest::rstest;

    #[rstest]
    fn capacity_errors_are_fatal() {
        let err = PointStoreError::CapacityExceeded { id: 9, capacity: 8 };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("capacity of 8"));
    }

    #[rstest]
    fn codec_errors_convert_and_stay_fatal() {
        let source = FixedLatLon::encode(300.0, 0.0).expect_err("overflow");
        let err = PointStoreError::from(source);
        assert!(err.is_fatal());
    }

    #[rstest]
    fn io_errors_are_not_fatal() {
        let err = PointStoreError::Io {
            path: Utf8PathBuf::from("nodes.bin"),
            source: std::io::Error::other("disk full"),
        };
        assert!(!err.is_fatal());
    }
}
