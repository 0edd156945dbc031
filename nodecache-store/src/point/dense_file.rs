//! Dense, file-backed point storage.
//!
//! Node `id` lives at byte offset `id * 8` of a single file. Gaps between ids
//! read back as the absent sentinel, so the file is only practical on
//! filesystems with sparse-file support. Readers memory-map the file.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use log::{debug, error, warn};
use memmap2::Mmap;
use nodecache_core::{FIXED_LAT_LON_SIZE, FixedLatLon, PointReader, PointWriter};

use crate::PointStoreError;

const RECORD_SIZE: u64 = FIXED_LAT_LON_SIZE as u64;

/// Byte offset of node `id` in a dense file.
pub(crate) fn record_offset(id: u64) -> Result<u64, PointStoreError> {
    id.checked_mul(RECORD_SIZE)
        .ok_or(PointStoreError::IdOutOfRange { id })
}

/// Writes coordinates straight to their slot in a dense file.
#[derive(Debug)]
pub struct DenseFilePointWriter {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
    position: u64,
    processed: u64,
}

impl DenseFilePointWriter {
    /// Create (or truncate) the dense file at `path`.
    pub fn create(path: impl AsRef<Utf8Path>) -> Result<Self, PointStoreError> {
        let path = path.as_ref().to_path_buf();
        let file = nodecache_fs::create_file(&path).map_err(|source| PointStoreError::Open {
            path: path.clone(),
            source,
        })?;
        debug!("writing dense point file {path}");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            position: 0,
            processed: 0,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PointStoreError {
        PointStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl PointWriter for DenseFilePointWriter {
    type Error = PointStoreError;

    fn add_point(&mut self, id: u64, lat: f64, lon: f64) -> Result<(), Self::Error> {
        let record = FixedLatLon::encode(lat, lon)?;
        let offset = record_offset(id)?;
        // Sequential ids stay inside the write buffer.
        if offset != self.position {
            self.writer
                .seek(SeekFrom::Start(offset))
                .map_err(|source| self.io_error(source))?;
        }
        self.writer
            .write_all(&record.to_le_bytes())
            .map_err(|source| self.io_error(source))?;
        self.position = offset + RECORD_SIZE;
        self.processed += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.writer.flush().map_err(|source| self.io_error(source))
    }

    fn processed_points(&self) -> u64 {
        self.processed
    }
}

impl Drop for DenseFilePointWriter {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            warn!("failed to flush dense point file {}: {err}", self.path);
        }
    }
}

/// Reads coordinates from a memory-mapped dense file.
#[derive(Debug)]
pub struct DenseFilePointReader {
    path: Utf8PathBuf,
    map: Option<Mmap>,
}

impl DenseFilePointReader {
    /// Map the dense file at `path`.
    ///
    /// An empty file is valid and answers every lookup with `None`.
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, PointStoreError> {
        let path = path.as_ref().to_path_buf();
        let file = nodecache_fs::open_file(&path).map_err(|source| PointStoreError::Open {
            path: path.clone(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| PointStoreError::Io {
                path: path.clone(),
                source,
            })?
            .len();
        if len % RECORD_SIZE != 0 {
            return Err(PointStoreError::Corrupt {
                path,
                len,
                record_size: FIXED_LAT_LON_SIZE,
            });
        }
        let map = if len == 0 {
            None
        } else {
            Some(map_file(&file).map_err(|source| PointStoreError::Io {
                path: path.clone(),
                source,
            })?)
        };
        Ok(Self { path, map })
    }

    /// Number of slots covered by the file.
    #[must_use]
    pub fn slots(&self) -> u64 {
        self.map
            .as_ref()
            .map_or(0, |map| map.len() as u64 / RECORD_SIZE)
    }

    fn record(&self, id: u64) -> Option<FixedLatLon> {
        let map = self.map.as_ref()?;
        let offset = usize::try_from(record_offset(id).ok()?).ok()?;
        map.get(offset..).and_then(FixedLatLon::from_slice)
    }
}

#[expect(unsafe_code, reason = "memory maps can only be created through an unsafe constructor")]
fn map_file(file: &File) -> std::io::Result<Mmap> {
    // SAFETY: the mapping is read-only and dense files are never modified
    // while a reader holds them open.
    unsafe { Mmap::map(file) }
}

impl PointReader for DenseFilePointReader {
    type Error = PointStoreError;

    fn get_point(&self, id: u64) -> Result<Option<Coord<f64>>, Self::Error> {
        let coord = self.record(id).and_then(FixedLatLon::decode);
        if coord.is_none() {
            error!("node {id} is not present in dense point file {}", self.path);
        }
        Ok(coord)
    }
}
