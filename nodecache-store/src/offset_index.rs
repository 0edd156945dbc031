//! Append-only `(key, value)` index with sorted, binary-searched lookups.
//!
//! Writers buffer pairs and append them to disk in batches. Readers load the
//! whole file, sort it by key and answer lookups by binary search. Records
//! are a little-endian `u64` key followed by the value's fixed-size encoding.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use thiserror::Error;

/// Pending entries kept in memory before a writer appends them to disk.
pub const FLUSH_THRESHOLD: usize = 1024;

const KEY_SIZE: usize = 8;

/// Fixed-size value stored alongside each key.
pub trait IndexValue: Copy + std::fmt::Debug {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the little-endian encoding to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode from exactly [`Self::SIZE`] bytes.
    fn decode(bytes: &[u8]) -> Option<Self>;
}

impl IndexValue for u64 {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        Some(Self::from_le_bytes(bytes.try_into().ok()?))
    }
}

/// Position and length of a blob in an element cache data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlobLocation {
    /// Byte offset of the blob.
    pub offset: u64,
    /// Blob length in bytes.
    pub len: u32,
}

impl IndexValue for BlobLocation {
    // u64 offset, u32 length, four reserved zero bytes.
    const SIZE: usize = 16;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.len.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let (offset, rest) = bytes.split_first_chunk::<8>()?;
        let (len, _) = rest.split_first_chunk::<4>()?;
        Some(Self {
            offset: u64::from_le_bytes(*offset),
            len: u32::from_le_bytes(*len),
        })
    }
}

/// Size in bytes of one index record holding `V`.
#[must_use]
pub const fn record_size<V: IndexValue>() -> usize {
    KEY_SIZE + V::SIZE
}

/// Errors raised by offset index files.
#[derive(Debug, Error)]
pub enum OffsetIndexError {
    /// Opening or creating the index file failed.
    #[error("failed to open offset index {path}")]
    Open {
        /// Index path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Reading or writing the index failed.
    #[error("I/O failure on offset index {path}")]
    Io {
        /// Index path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file length is not a whole number of records.
    #[error("offset index {path} holds {len} bytes, which is not a multiple of {record_size}")]
    Corrupt {
        /// Index path.
        path: Utf8PathBuf,
        /// Observed file length.
        len: u64,
        /// Expected record size.
        record_size: usize,
    },
    /// The index does not fit in memory.
    #[error("failed to allocate {len} bytes to load offset index {path}")]
    Allocation {
        /// Index path.
        path: Utf8PathBuf,
        /// Bytes requested.
        len: u64,
    },
}

/// Buffers index entries and appends them to disk in batches.
#[derive(Debug)]
pub struct OffsetIndexWriter<V: IndexValue = BlobLocation> {
    path: Utf8PathBuf,
    file: File,
    pending: Vec<(u64, V)>,
}

impl<V: IndexValue> OffsetIndexWriter<V> {
    /// Create (or truncate) the index file at `path`.
    pub fn create(path: impl AsRef<Utf8Path>) -> Result<Self, OffsetIndexError> {
        let path = path.as_ref().to_path_buf();
        let file = nodecache_fs::create_file(&path).map_err(|source| OffsetIndexError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            file,
            pending: Vec::with_capacity(FLUSH_THRESHOLD + 1),
        })
    }

    /// Buffer one entry, appending earlier ones once the buffer is full.
    pub fn add(&mut self, key: u64, value: V) -> Result<(), OffsetIndexError> {
        if self.pending.len() > FLUSH_THRESHOLD {
            self.write_all()?;
        }
        self.pending.push((key, value));
        Ok(())
    }

    /// Append every buffered entry to the file.
    pub fn write_all(&mut self) -> Result<(), OffsetIndexError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut bytes = Vec::with_capacity(self.pending.len() * record_size::<V>());
        for (key, value) in &self.pending {
            bytes.extend_from_slice(&key.to_le_bytes());
            value.encode(&mut bytes);
        }
        self.file
            .write_all(&bytes)
            .map_err(|source| OffsetIndexError::Io {
                path: self.path.clone(),
                source,
            })?;
        debug!("appended {} entries to {}", self.pending.len(), self.path);
        self.pending.clear();
        Ok(())
    }

    /// Entries buffered but not yet on disk.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl<V: IndexValue> Drop for OffsetIndexWriter<V> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "offset index {} dropped with {} unsaved entries",
                self.path,
                self.pending.len()
            );
        }
    }
}

/// Loads an index file and answers key lookups.
#[derive(Debug)]
pub struct OffsetIndexReader<V: IndexValue = BlobLocation> {
    path: Utf8PathBuf,
    file: File,
    entries: Vec<(u64, V)>,
}

impl<V: IndexValue> OffsetIndexReader<V> {
    /// Open the index at `path` without loading it.
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, OffsetIndexError> {
        let path = path.as_ref().to_path_buf();
        let file = nodecache_fs::open_file(&path).map_err(|source| OffsetIndexError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            file,
            entries: Vec::new(),
        })
    }

    /// Load and sort every entry, replacing anything loaded before.
    ///
    /// Entries sharing a key keep their file order, so lookups return the
    /// one written first.
    pub fn read_all(&mut self) -> Result<(), OffsetIndexError> {
        self.entries.clear();
        let io_error = |source| OffsetIndexError::Io {
            path: self.path.clone(),
            source,
        };
        let len = self.file.metadata().map_err(io_error)?.len();
        let size = record_size::<V>();
        if len % size as u64 != 0 {
            return Err(OffsetIndexError::Corrupt {
                path: self.path.clone(),
                len,
                record_size: size,
            });
        }
        if len == 0 {
            return Ok(());
        }

        info!("loading offset index {}", self.path);
        let allocation = || OffsetIndexError::Allocation {
            path: self.path.clone(),
            len,
        };
        let byte_len = usize::try_from(len).map_err(|_| allocation())?;
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(byte_len).map_err(|_| allocation())?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0)).map_err(io_error)?;
        file.read_to_end(&mut bytes).map_err(io_error)?;

        let mut entries = Vec::new();
        entries
            .try_reserve_exact(byte_len / size)
            .map_err(|_| allocation())?;
        for record in bytes.chunks_exact(size) {
            let (key, value) = record.split_at(KEY_SIZE);
            let key = u64::decode(key);
            let value = V::decode(value);
            if let (Some(key), Some(value)) = (key, value) {
                entries.push((key, value));
            }
        }
        entries.sort_by_key(|&(key, _)| key);
        info!("loaded {} entries from {}", entries.len(), self.path);
        self.entries = entries;
        Ok(())
    }

    /// Value stored under `key`, if any.
    #[must_use]
    pub fn get_value_by_key(&self, key: u64) -> Option<V> {
        let index = self.entries.partition_point(|&(candidate, _)| candidate < key);
        self.entries
            .get(index)
            .filter(|&&(candidate, _)| candidate == key)
            .map(|&(_, value)| value)
    }

    /// Number of entries loaded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
