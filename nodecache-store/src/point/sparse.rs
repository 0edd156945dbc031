//! Sparse point storage as an append-only list of `(id, coordinate)` records.
//!
//! Each record is 16 bytes: `u64 id` followed by the fixed-point pair, all
//! little-endian. The reader streams the file into a hash map, so memory use
//! tracks the number of nodes written rather than the largest id.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use log::{debug, error, info, warn};
use nodecache_core::{FIXED_LAT_LON_SIZE, FixedLatLon, PointReader, PointWriter};

use crate::PointStoreError;
use crate::paths::{SPARSE_SUFFIX, with_suffix};

/// Size in bytes of one sparse record.
pub const SPARSE_RECORD_SIZE: usize = 8 + FIXED_LAT_LON_SIZE;

/// Record file used by the sparse store opened from `name`.
#[must_use]
pub fn sparse_path(name: &Utf8Path) -> Utf8PathBuf {
    with_suffix(name, SPARSE_SUFFIX)
}

fn encode_record(id: u64, record: FixedLatLon) -> [u8; SPARSE_RECORD_SIZE] {
    let mut bytes = [0_u8; SPARSE_RECORD_SIZE];
    let (key, value) = bytes.split_at_mut(8);
    key.copy_from_slice(&id.to_le_bytes());
    value.copy_from_slice(&record.to_le_bytes());
    bytes
}

fn decode_record(bytes: &[u8; SPARSE_RECORD_SIZE]) -> Option<(u64, FixedLatLon)> {
    let (key, value) = bytes.split_at(8);
    let id = u64::from_le_bytes(key.try_into().ok()?);
    Some((id, FixedLatLon::from_slice(value)?))
}

/// Appends sparse records to `<name>.short`.
#[derive(Debug)]
pub struct SparsePointWriter {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
    processed: u64,
}

impl SparsePointWriter {
    /// Create (or truncate) the record file for `name`.
    pub fn create(name: impl AsRef<Utf8Path>) -> Result<Self, PointStoreError> {
        let path = sparse_path(name.as_ref());
        let file = nodecache_fs::create_file(&path).map_err(|source| PointStoreError::Open {
            path: path.clone(),
            source,
        })?;
        debug!("writing sparse point file {path}");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            processed: 0,
        })
    }

    /// Path of the record file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl PointWriter for SparsePointWriter {
    type Error = PointStoreError;

    fn add_point(&mut self, id: u64, lat: f64, lon: f64) -> Result<(), Self::Error> {
        let record = FixedLatLon::encode(lat, lon)?;
        self.writer
            .write_all(&encode_record(id, record))
            .map_err(|source| PointStoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.processed += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.writer.flush().map_err(|source| PointStoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn processed_points(&self) -> u64 {
        self.processed
    }
}

impl Drop for SparsePointWriter {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            warn!("failed to flush sparse point file {}: {err}", self.path);
        }
    }
}

/// Serves lookups from a sparse record file loaded into a hash map.
#[derive(Debug)]
pub struct SparsePointReader {
    path: Utf8PathBuf,
    points: HashMap<u64, FixedLatLon>,
}

impl SparsePointReader {
    /// Load every record of `<name>.short`.
    ///
    /// When an id repeats, the record written last wins.
    pub fn open(name: impl AsRef<Utf8Path>) -> Result<Self, PointStoreError> {
        let path = sparse_path(name.as_ref());
        let file = nodecache_fs::open_file(&path).map_err(|source| PointStoreError::Open {
            path: path.clone(),
            source,
        })?;
        let io_error = |source| PointStoreError::Io {
            path: path.clone(),
            source,
        };
        let len = file.metadata().map_err(io_error)?.len();
        let record_size = SPARSE_RECORD_SIZE as u64;
        if len % record_size != 0 {
            return Err(PointStoreError::Corrupt {
                path: path.clone(),
                len,
                record_size: SPARSE_RECORD_SIZE,
            });
        }

        info!("loading sparse point file {path}");
        let count = len / record_size;
        let mut points = HashMap::with_capacity(usize::try_from(count).unwrap_or_default());
        let mut reader = BufReader::new(file);
        let mut bytes = [0_u8; SPARSE_RECORD_SIZE];
        for _ in 0..count {
            reader.read_exact(&mut bytes).map_err(io_error)?;
            if let Some((id, record)) = decode_record(&bytes) {
                points.insert(id, record);
            }
        }
        info!("loaded {} distinct nodes from {path}", points.len());
        Ok(Self { path, points })
    }

    /// Number of distinct ids loaded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the file held no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl PointReader for SparsePointReader {
    type Error = PointStoreError;

    fn get_point(&self, id: u64) -> Result<Option<Coord<f64>>, Self::Error> {
        let Some(record) = self.points.get(&id) else {
            error!("node {id} is not present in sparse point file {}", self.path);
            return Ok(None);
        };
        let coord = record.decode();
        if coord.is_none() {
            error!("node {id} is recorded in {} without a coordinate", self.path);
        }
        Ok(coord)
    }
}
