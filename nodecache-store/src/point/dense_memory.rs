//! Dense point storage held entirely in memory.
//!
//! The writer sizes one slot per possible node id up front and persists the
//! whole array in one bulk write. The reader loads the same file back into
//! memory. Both trade a very large fixed footprint for the fastest lookups.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use log::{error, info, warn};
use nodecache_core::{FIXED_LAT_LON_SIZE, FixedLatLon, PointReader, PointWriter};

use crate::PointStoreError;

const RECORD_SIZE: u64 = FIXED_LAT_LON_SIZE as u64;
const BULK_BUFFER: usize = 1 << 20;

/// Reserve room for `capacity` records without initialising them.
fn allocate(capacity: u64) -> Result<(Vec<FixedLatLon>, usize), PointStoreError> {
    let slots = usize::try_from(capacity).map_err(|_| PointStoreError::Allocation { capacity })?;
    let mut records = Vec::new();
    records
        .try_reserve_exact(slots)
        .map_err(|_| PointStoreError::Allocation { capacity })?;
    Ok((records, slots))
}

/// Accumulates coordinates in a preallocated array and writes it out on flush.
#[derive(Debug)]
pub struct DenseMemoryPointWriter {
    path: Utf8PathBuf,
    file: File,
    records: Vec<FixedLatLon>,
    processed: u64,
    dirty: bool,
}

impl DenseMemoryPointWriter {
    /// Create the output file and allocate `capacity` slots.
    ///
    /// Allocation failure is reported here, before any point is accepted.
    pub fn create(path: impl AsRef<Utf8Path>, capacity: u64) -> Result<Self, PointStoreError> {
        let path = path.as_ref().to_path_buf();
        let file = nodecache_fs::create_file(&path).map_err(|source| PointStoreError::Open {
            path: path.clone(),
            source,
        })?;
        let (mut records, slots) = allocate(capacity)?;
        records.resize(slots, FixedLatLon::ABSENT);
        info!("allocated {capacity} dense point slots for {path}");
        Ok(Self {
            path,
            file,
            records,
            processed: 0,
            dirty: false,
        })
    }

    /// Number of slots in the array.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.records.len() as u64
    }

    fn write_records(&mut self) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut out = BufWriter::with_capacity(BULK_BUFFER, &self.file);
        for record in &self.records {
            out.write_all(&record.to_le_bytes())?;
        }
        out.flush()
    }
}

impl PointWriter for DenseMemoryPointWriter {
    type Error = PointStoreError;

    fn add_point(&mut self, id: u64, lat: f64, lon: f64) -> Result<(), Self::Error> {
        let capacity = self.capacity();
        let slot = usize::try_from(id)
            .ok()
            .and_then(|index| self.records.get_mut(index))
            .ok_or(PointStoreError::CapacityExceeded { id, capacity })?;
        *slot = FixedLatLon::encode(lat, lon)?;
        self.processed += 1;
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.write_records().map_err(|source| PointStoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.dirty = false;
        Ok(())
    }

    fn processed_points(&self) -> u64 {
        self.processed
    }
}

impl Drop for DenseMemoryPointWriter {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        warn!(
            "dense point store {} dropped without flush; writing it now",
            self.path
        );
        if let Err(err) = self.write_records() {
            error!("failed to persist dense point store {}: {err}", self.path);
        }
    }
}

/// Loads a dense array file into memory and serves lookups from it.
#[derive(Debug)]
pub struct DenseMemoryPointReader {
    path: Utf8PathBuf,
    records: Vec<FixedLatLon>,
}

impl DenseMemoryPointReader {
    /// Load the file at `path`; its length fixes the capacity.
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, PointStoreError> {
        let path = path.as_ref().to_path_buf();
        let file = nodecache_fs::open_file(&path).map_err(|source| PointStoreError::Open {
            path: path.clone(),
            source,
        })?;
        let io_error = |source| PointStoreError::Io {
            path: path.clone(),
            source,
        };
        let len = file.metadata().map_err(io_error)?.len();
        if len % RECORD_SIZE != 0 {
            return Err(PointStoreError::Corrupt {
                path: path.clone(),
                len,
                record_size: FIXED_LAT_LON_SIZE,
            });
        }
        let capacity = len / RECORD_SIZE;
        let (mut records, _) = allocate(capacity)?;
        let mut reader = BufReader::with_capacity(BULK_BUFFER, file);
        let mut record = [0_u8; FIXED_LAT_LON_SIZE];
        for _ in 0..capacity {
            reader.read_exact(&mut record).map_err(io_error)?;
            records.push(FixedLatLon::from_le_bytes(record));
        }
        info!("loaded {capacity} dense point slots from {path}");
        Ok(Self { path, records })
    }

    /// Number of slots loaded.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.records.len() as u64
    }
}

impl PointReader for DenseMemoryPointReader {
    type Error = PointStoreError;

    fn get_point(&self, id: u64) -> Result<Option<Coord<f64>>, Self::Error> {
        let coord = usize::try_from(id)
            .ok()
            .and_then(|index| self.records.get(index))
            .and_then(|record| record.decode());
        if coord.is_none() {
            error!("node {id} is not present in dense point store {}", self.path);
        }
        Ok(coord)
    }
}
