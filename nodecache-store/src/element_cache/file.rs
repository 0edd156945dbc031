//! File-backed element cache: a data file plus a `.offs` index.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::sync::{Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, error, info, warn};
use nodecache_core::{ElementCacheReader, ElementCacheWriter};

use super::ElementCacheError;
use crate::offset_index::{BlobLocation, OffsetIndexReader, OffsetIndexWriter};
use crate::paths::{OFFSETS_SUFFIX, with_suffix};

/// Offset index stored next to the data file `name`.
#[must_use]
pub fn offsets_path(name: &Utf8Path) -> Utf8PathBuf {
    with_suffix(name, OFFSETS_SUFFIX)
}

/// Appends blobs to a data file and records where each one starts.
#[derive(Debug)]
pub struct FileElementCacheWriter {
    path: Utf8PathBuf,
    data: BufWriter<File>,
    position: u64,
    offsets: OffsetIndexWriter<BlobLocation>,
}

impl FileElementCacheWriter {
    /// Create (or truncate) the data file `name` and its index.
    pub fn create(name: impl AsRef<Utf8Path>) -> Result<Self, ElementCacheError> {
        let path = name.as_ref().to_path_buf();
        let data = nodecache_fs::create_file(&path).map_err(|source| ElementCacheError::Open {
            path: path.clone(),
            source,
        })?;
        let offsets = OffsetIndexWriter::create(offsets_path(&path))?;
        debug!("writing element cache {path}");
        Ok(Self {
            path,
            data: BufWriter::new(data),
            position: 0,
            offsets,
        })
    }

    /// Path of the data file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl ElementCacheWriter for FileElementCacheWriter {
    type Error = ElementCacheError;

    fn write(&mut self, key: u64, data: &[u8]) -> Result<(), Self::Error> {
        let len = u32::try_from(data.len()).map_err(|_| ElementCacheError::BlobTooLarge {
            key,
            len: data.len(),
        })?;
        let offset = self.position;
        self.data
            .write_all(data)
            .map_err(|source| ElementCacheError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.position += u64::from(len);
        self.offsets.add(key, BlobLocation { offset, len })?;
        Ok(())
    }

    fn save_offsets(&mut self) -> Result<(), Self::Error> {
        self.data.flush().map_err(|source| ElementCacheError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.offsets.write_all()?;
        Ok(())
    }
}

impl Drop for FileElementCacheWriter {
    fn drop(&mut self) {
        if let Err(err) = self.data.flush() {
            warn!("failed to flush element cache {}: {err}", self.path);
        }
    }
}

#[derive(Debug)]
enum BlobSource {
    Preloaded(Vec<u8>),
    File(Mutex<File>),
}

/// Reads blobs located through the offset index.
///
/// With `preload` the data file is read into memory on open; otherwise each
/// lookup issues a positioned read.
#[derive(Debug)]
pub struct FileElementCacheReader {
    path: Utf8PathBuf,
    source: BlobSource,
    offsets: OffsetIndexReader<BlobLocation>,
}

impl FileElementCacheReader {
    /// Open the data file `name` and its index.
    pub fn open(name: impl AsRef<Utf8Path>, preload: bool) -> Result<Self, ElementCacheError> {
        let path = name.as_ref().to_path_buf();
        let mut file = nodecache_fs::open_file(&path).map_err(|source| ElementCacheError::Open {
            path: path.clone(),
            source,
        })?;
        let offsets = OffsetIndexReader::open(offsets_path(&path))?;
        let source = if preload {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)
                .map_err(|source| ElementCacheError::Io {
                    path: path.clone(),
                    source,
                })?;
            info!("preloaded {} bytes from element cache {path}", bytes.len());
            BlobSource::Preloaded(bytes)
        } else {
            BlobSource::File(Mutex::new(file))
        };
        Ok(Self {
            path,
            source,
            offsets,
        })
    }

    /// Number of indexed elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether no elements are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn fetch(&self, key: u64, location: BlobLocation) -> Result<Vec<u8>, ElementCacheError> {
        let truncated = || ElementCacheError::Truncated {
            path: self.path.clone(),
            key,
            offset: location.offset,
            len: location.len,
        };
        match &self.source {
            BlobSource::Preloaded(bytes) => {
                let start = usize::try_from(location.offset).map_err(|_| truncated())?;
                let len = usize::try_from(location.len).map_err(|_| truncated())?;
                let end = start.checked_add(len).ok_or_else(truncated)?;
                bytes.get(start..end).map(<[u8]>::to_vec).ok_or_else(truncated)
            }
            BlobSource::File(file) => {
                let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
                let len = usize::try_from(location.len).map_err(|_| truncated())?;
                let mut blob = vec![0_u8; len];
                file.seek(SeekFrom::Start(location.offset))
                    .and_then(|_| file.read_exact(&mut blob))
                    .map_err(|source| match source.kind() {
                        std::io::ErrorKind::UnexpectedEof => truncated(),
                        _ => ElementCacheError::Io {
                            path: self.path.clone(),
                            source,
                        },
                    })?;
                Ok(blob)
            }
        }
    }
}

impl ElementCacheReader for FileElementCacheReader {
    type Error = ElementCacheError;

    fn load_offsets(&mut self) -> Result<(), Self::Error> {
        self.offsets.read_all()?;
        Ok(())
    }

    fn read(&self, key: u64) -> Result<Option<Vec<u8>>, Self::Error> {
        let Some(location) = self.offsets.get_value_by_key(key) else {
            error!("element {key} is not cached in {}", self.path);
            return Ok(None);
        };
        self.fetch(key, location).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().expect("create temp dir")
    }

    fn cache_name(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("ways.cache")).expect("utf-8 path")
    }

    fn populate(name: &Utf8Path) {
        let mut writer = FileElementCacheWriter::create(name).expect("create");
        writer.write(20, b"second").expect("write");
        writer.write(10, b"first").expect("write");
        writer.write(30, b"").expect("write empty");
        writer.save_offsets().expect("save");
    }

    #[rstest]
    #[case::preloaded(true)]
    #[case::positioned(false)]
    fn blobs_round_trip(temp_dir: TempDir, #[case] preload: bool) {
        let name = cache_name(&temp_dir);
        populate(&name);
        let mut reader = FileElementCacheReader::open(&name, preload).expect("open");
        reader.load_offsets().expect("load");
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.read(10).expect("read"), Some(b"first".to_vec()));
        assert_eq!(reader.read(20).expect("read"), Some(b"second".to_vec()));
        assert_eq!(reader.read(30).expect("read"), Some(Vec::new()));
        assert_eq!(reader.read(40).expect("read"), None);
    }

    #[rstest]
    fn reads_before_loading_offsets_find_nothing(temp_dir: TempDir) {
        let name = cache_name(&temp_dir);
        populate(&name);
        let reader = FileElementCacheReader::open(&name, false).expect("open");
        assert_eq!(reader.read(10).expect("read"), None);
    }

    #[rstest]
    fn unsaved_offsets_locate_nothing(temp_dir: TempDir) {
        let name = cache_name(&temp_dir);
        let mut writer = FileElementCacheWriter::create(&name).expect("create");
        writer.write(1, b"lost").expect("write");
        drop(writer);

        assert_eq!(std::fs::read(&name).expect("data"), b"lost");
        let mut reader = FileElementCacheReader::open(&name, false).expect("open");
        reader.load_offsets().expect("load");
        assert!(reader.is_empty());
    }

    #[rstest]
    fn failed_writes_leave_no_index_entry(temp_dir: TempDir) {
        let name = cache_name(&temp_dir);
        let mut writer = FileElementCacheWriter::create(&name).expect("create");
        writer.write(1, b"first").expect("write");
        writer.save_offsets().expect("flush data");

        let read_only = File::open(name.as_std_path()).expect("open read-only handle");
        let writable = std::mem::replace(&mut writer.data, BufWriter::with_capacity(0, read_only));
        let err = writer.write(2, b"rejected").expect_err("read-only handle");
        assert!(matches!(err, ElementCacheError::Io { .. }));
        writer.data = writable;

        writer.write(3, b"third").expect("write");
        writer.save_offsets().expect("save");
        drop(writer);

        let mut reader = FileElementCacheReader::open(&name, false).expect("open");
        reader.load_offsets().expect("load");
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.read(2).expect("read"), None);
        assert_eq!(reader.read(3).expect("read"), Some(b"third".to_vec()));
    }

    #[rstest]
    #[case::preloaded(true)]
    #[case::positioned(false)]
    fn truncated_data_is_reported(temp_dir: TempDir, #[case] preload: bool) {
        let name = cache_name(&temp_dir);
        populate(&name);
        std::fs::write(&name, b"sec").expect("truncate data file");
        let mut reader = FileElementCacheReader::open(&name, preload).expect("open");
        reader.load_offsets().expect("load");
        let err = reader.read(20).expect_err("truncated");
        assert!(matches!(err, ElementCacheError::Truncated { key: 20, .. }));
    }

    #[rstest]
    fn index_lives_next_to_the_data(temp_dir: TempDir) {
        let name = cache_name(&temp_dir);
        populate(&name);
        assert!(offsets_path(&name).as_std_path().exists());
        assert_eq!(offsets_path(&name).file_name(), Some("ways.cache.offs"));
    }
}
