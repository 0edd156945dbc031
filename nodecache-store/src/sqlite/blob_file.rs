//! Files emulated as ordered chunks in a SQLite database.
//!
//! Every emulated file in a directory that shares an extension lives in one
//! database (`<dir>/<ext>.db`). Content is kept as a sequence of chunks, one
//! per append, so sequential writers never rewrite earlier data. Writes at a
//! position below the current size patch the overlapping chunks in place.
//! Files opened for writing are materialised on disk when dropped.

use std::io::{self, SeekFrom, Write};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use super::{ConnectionPool, PoolError, PooledConnection};
use crate::paths::blob_database_path;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS blob_files (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS blob_chunks (
        file_id INTEGER NOT NULL REFERENCES blob_files(id),
        sequence INTEGER NOT NULL,
        offset INTEGER NOT NULL,
        data BLOB NOT NULL,
        PRIMARY KEY (file_id, sequence)
    );
";

/// How an emulated file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobFileMode {
    /// Read an existing file.
    Read,
    /// Create the file, discarding any previous content.
    WriteTruncate,
    /// Open for writing at the start, keeping existing content.
    WriteExisting,
    /// Open for writing at the end, keeping existing content.
    Append,
}

/// Errors raised by [`SqliteBlobFile`].
#[derive(Debug, Error)]
pub enum BlobFileError {
    /// The emulated path has no file name component.
    #[error("emulated path {path} has no file name")]
    NoFileName {
        /// Path as supplied by the caller.
        path: Utf8PathBuf,
    },
    /// Acquiring the backing database failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// A SQLite statement failed.
    #[error("failed to {operation} for emulated file {path}")]
    Sqlite {
        /// Short description of the statement that failed.
        operation: &'static str,
        /// Emulated file path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A read-mode open named a file that was never written.
    #[error("emulated file {path} does not exist")]
    NotFound {
        /// Emulated file path.
        path: Utf8PathBuf,
    },
    /// A write was attempted on a file opened for reading.
    #[error("emulated file {path} was opened read-only")]
    ReadOnly {
        /// Emulated file path.
        path: Utf8PathBuf,
    },
    /// Seeking past the end of the file.
    #[error("cannot seek {path} to {position}; the file holds {size} bytes")]
    SeekOutOfRange {
        /// Emulated file path.
        path: Utf8PathBuf,
        /// Requested position.
        position: u64,
        /// Current file size.
        size: u64,
    },
    /// A stored chunk is shorter than the range its offset claims.
    #[error("emulated file {path} holds a damaged chunk at offset {offset}")]
    DamagedChunk {
        /// Emulated file path.
        path: Utf8PathBuf,
        /// File offset recorded for the chunk.
        offset: u64,
    },
    /// Materialising the file on disk failed.
    #[error("failed to write emulated file {path} to disk")]
    Io {
        /// Emulated file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// A file stored as chunks in a shared SQLite database.
///
/// Dropping a handle opened in any write mode writes the emulated content to
/// a real file at its path, as [`SqliteBlobFile::flush_to_disk`] does.
#[derive(Debug)]
pub struct SqliteBlobFile {
    connection: PooledConnection,
    path: Utf8PathBuf,
    file_id: i64,
    mode: BlobFileMode,
    position: u64,
    size: u64,
    next_sequence: u64,
}

impl SqliteBlobFile {
    /// Open the emulated file at `path` in `mode`.
    pub fn open(
        pool: &ConnectionPool,
        path: impl AsRef<Utf8Path>,
        mode: BlobFileMode,
    ) -> Result<Self, BlobFileError> {
        let path = path.as_ref().to_path_buf();
        let Some(name) = path.file_name().map(str::to_owned) else {
            return Err(BlobFileError::NoFileName { path });
        };
        let connection = pool.acquire(&blob_database_path(&path))?;
        let located = {
            let conn = connection.lock();
            locate(&conn, &name, mode).map_err(|source| BlobFileError::Sqlite {
                operation: "open blob file",
                path: path.clone(),
                source,
            })?
        };
        let Some((file_id, size, next_sequence)) = located else {
            return Err(BlobFileError::NotFound { path });
        };
        debug!("opened emulated file {path} ({size} bytes, mode {mode:?})");
        Ok(Self {
            connection,
            path,
            file_id,
            mode,
            position: if mode == BlobFileMode::Append { size } else { 0 },
            size,
            next_sequence,
        })
    }

    /// Emulated path of the file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Current read/write position.
    #[must_use]
    pub const fn pos(&self) -> u64 {
        self.position
    }

    /// Total length of the file in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Move to `position`, which may not lie past the end.
    pub fn seek_to(&mut self, position: u64) -> Result<(), BlobFileError> {
        if position > self.size {
            return Err(BlobFileError::SeekOutOfRange {
                path: self.path.clone(),
                position,
                size: self.size,
            });
        }
        self.position = position;
        Ok(())
    }

    /// Write `data` at the current position and advance past it.
    ///
    /// Bytes that overlap existing content replace it; the rest is appended
    /// as a new chunk. The whole write is applied atomically.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), BlobFileError> {
        if self.mode == BlobFileMode::Read {
            return Err(BlobFileError::ReadOnly {
                path: self.path.clone(),
            });
        }
        if data.is_empty() {
            return Ok(());
        }
        let start = self.position;
        let end = start + data.len() as u64;
        let overlap = usize::try_from(self.size.min(end).saturating_sub(start)).unwrap_or(data.len());
        let (patch, tail) = data.split_at(overlap.min(data.len()));
        {
            let mut conn = self.connection.lock();
            let path = self.path.as_path();
            let apply = |conn: &mut Connection| -> Result<(), BlobFileError> {
                let savepoint = conn
                    .savepoint()
                    .map_err(sqlite_error("start blob write", path))?;
                if !patch.is_empty() {
                    patch_chunks(&savepoint, path, self.file_id, start, patch)?;
                }
                if !tail.is_empty() {
                    savepoint
                        .prepare_cached(
                            "INSERT INTO blob_chunks (file_id, sequence, offset, data) \
                             VALUES (?1, ?2, ?3, ?4)",
                        )
                        .and_then(|mut insert| {
                            insert.execute(params![self.file_id, self.next_sequence, self.size, tail])
                        })
                        .map_err(sqlite_error("write blob chunk", path))?;
                }
                savepoint
                    .commit()
                    .map_err(sqlite_error("commit blob write", path))
            };
            apply(&mut *conn)?;
        }
        if !tail.is_empty() {
            self.next_sequence += 1;
        }
        self.position = end;
        self.size = self.size.max(end);
        Ok(())
    }

    /// Read up to `buf.len()` bytes from the current position.
    ///
    /// Returns the number of bytes read; zero at end of file.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, BlobFileError> {
        let start = self.position;
        let end = self.size.min(start + buf.len() as u64);
        if end <= start {
            return Ok(0);
        }
        let chunks = {
            let conn = self.connection.lock();
            overlapping_chunks(&conn, self.file_id, start, end)
                .map_err(sqlite_error("read blob chunks", &self.path))?
        };
        for (offset, bytes) in chunks {
            let from = start.max(offset);
            let to = end.min(offset + bytes.len() as u64);
            if from >= to {
                continue;
            }
            copy_range(buf, from - start, &bytes, from - offset, to - from).ok_or_else(|| {
                BlobFileError::DamagedChunk {
                    path: self.path.clone(),
                    offset,
                }
            })?;
        }
        let read = usize::try_from(end - start).unwrap_or(buf.len());
        self.position = end;
        Ok(read)
    }

    /// Read everything from the current position to the end.
    pub fn read_remaining(&mut self) -> Result<Vec<u8>, BlobFileError> {
        let remaining = usize::try_from(self.size - self.position).unwrap_or(0);
        let mut buf = vec![0_u8; remaining];
        let read = self.read_into(&mut buf)?;
        buf.truncate(read);
        Ok(buf)
    }

    /// Materialise the emulated file as a real file at its path.
    pub fn flush_to_disk(&self) -> Result<(), BlobFileError> {
        let chunks = {
            let conn = self.connection.lock();
            overlapping_chunks(&conn, self.file_id, 0, self.size)
                .map_err(sqlite_error("read blob chunks", &self.path))?
        };
        let io_error = |source| BlobFileError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = nodecache_fs::create_file(&self.path).map_err(io_error)?;
        for (_, bytes) in chunks {
            file.write_all(&bytes).map_err(io_error)?;
        }
        file.flush().map_err(io_error)
    }
}

impl Drop for SqliteBlobFile {
    fn drop(&mut self) {
        if self.mode == BlobFileMode::Read {
            return;
        }
        if let Err(err) = self.flush_to_disk() {
            warn!("failed to write emulated file {} to disk: {err}", self.path);
        }
    }
}

fn sqlite_error<'a>(
    operation: &'static str,
    path: &'a Utf8Path,
) -> impl FnOnce(rusqlite::Error) -> BlobFileError + 'a {
    move |source| BlobFileError::Sqlite {
        operation,
        path: path.to_path_buf(),
        source,
    }
}

/// Copy `len` bytes from `source[source_from..]` into `target[target_from..]`.
///
/// `None` when either range falls outside its slice.
fn copy_range(
    target: &mut [u8],
    target_from: u64,
    source: &[u8],
    source_from: u64,
    len: u64,
) -> Option<()> {
    let len = usize::try_from(len).ok()?;
    let target_from = usize::try_from(target_from).ok()?;
    let source_from = usize::try_from(source_from).ok()?;
    let dst = target.get_mut(target_from..target_from.checked_add(len)?)?;
    let src = source.get(source_from..source_from.checked_add(len)?)?;
    dst.copy_from_slice(src);
    Some(())
}

/// Find or create the file row; `None` when reading a missing file.
fn locate(
    conn: &Connection,
    name: &str,
    mode: BlobFileMode,
) -> rusqlite::Result<Option<(i64, u64, u64)>> {
    conn.execute_batch(SCHEMA)?;
    let existing: Option<i64> = conn
        .prepare_cached("SELECT id FROM blob_files WHERE name = ?1")?
        .query_row([name], |row| row.get(0))
        .optional()?;
    let file_id = match (existing, mode) {
        (Some(id), _) => id,
        (None, BlobFileMode::Read) => return Ok(None),
        (None, _) => {
            conn.prepare_cached("INSERT INTO blob_files (name) VALUES (?1)")?
                .execute([name])?;
            conn.last_insert_rowid()
        }
    };
    if mode == BlobFileMode::WriteTruncate {
        conn.prepare_cached("DELETE FROM blob_chunks WHERE file_id = ?1")?
            .execute([file_id])?;
    }
    let (size, next_sequence) = conn
        .prepare_cached(
            "SELECT COALESCE(SUM(length(data)), 0), COALESCE(MAX(sequence) + 1, 0) \
             FROM blob_chunks WHERE file_id = ?1",
        )?
        .query_row([file_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(Some((file_id, size, next_sequence)))
}

/// Chunks intersecting `[start, end)` in file order.
fn overlapping_chunks(
    conn: &Connection,
    file_id: i64,
    start: u64,
    end: u64,
) -> rusqlite::Result<Vec<(u64, Vec<u8>)>> {
    let mut statement = conn.prepare_cached(
        "SELECT offset, data FROM blob_chunks \
         WHERE file_id = ?1 AND offset < ?3 AND offset + length(data) > ?2 \
         ORDER BY sequence",
    )?;
    let rows = statement.query_map(params![file_id, start, end], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    rows.collect()
}

fn patch_chunks(
    conn: &Connection,
    path: &Utf8Path,
    file_id: i64,
    start: u64,
    patch: &[u8],
) -> Result<(), BlobFileError> {
    let end = start + patch.len() as u64;
    let mut update = conn
        .prepare_cached("UPDATE blob_chunks SET data = ?3 WHERE file_id = ?1 AND offset = ?2")
        .map_err(sqlite_error("prepare chunk update", path))?;
    let chunks = overlapping_chunks(conn, file_id, start, end)
        .map_err(sqlite_error("read blob chunks", path))?;
    for (offset, mut bytes) in chunks {
        let from = start.max(offset);
        let to = end.min(offset + bytes.len() as u64);
        copy_range(&mut bytes, from - offset, patch, from - start, to - from).ok_or_else(|| {
            BlobFileError::DamagedChunk {
                path: path.to_path_buf(),
                offset,
            }
        })?;
        update
            .execute(params![file_id, offset, bytes])
            .map_err(sqlite_error("patch blob chunk", path))?;
    }
    Ok(())
}

impl io::Read for SqliteBlobFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(io::Error::other)
    }
}

impl io::Write for SqliteBlobFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for SqliteBlobFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;
        self.seek_to(target)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        Ok(target)
    }
}
