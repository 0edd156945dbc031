//! Element cache stored in an `element_cache` table.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, error, warn};
use nodecache_core::{ElementCacheReader, ElementCacheWriter};
use rusqlite::{Connection, OptionalExtension, params};

use super::ElementCacheError;
use crate::paths::{SQLITE_SUFFIX, with_suffix};
use crate::sqlite::{ConnectionPool, PooledConnection, WriteBatch};

const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS element_cache (id INTEGER PRIMARY KEY, data BLOB NOT NULL)";
const INSERT: &str = "INSERT OR IGNORE INTO element_cache (id, data) VALUES (?1, ?2)";
const SELECT: &str = "SELECT data FROM element_cache WHERE id = ?1";

/// Database used by the relational element cache opened from `name`.
#[must_use]
pub fn sqlite_cache_path(name: &Utf8Path) -> Utf8PathBuf {
    with_suffix(name, SQLITE_SUFFIX)
}

fn sqlite_error<'a>(
    operation: &'static str,
    path: &'a Utf8Path,
) -> impl FnOnce(rusqlite::Error) -> ElementCacheError + 'a {
    move |source| ElementCacheError::Sqlite {
        operation,
        path: path.to_path_buf(),
        source,
    }
}

fn sql_key(key: u64) -> Result<i64, ElementCacheError> {
    i64::try_from(key).map_err(|_| ElementCacheError::KeyOutOfRange { key })
}

/// Inserts blobs into the `element_cache` table inside one transaction.
///
/// The first blob written under a key is kept.
#[derive(Debug)]
pub struct SqliteElementCacheWriter {
    connection: PooledConnection,
    batch: WriteBatch,
}

impl SqliteElementCacheWriter {
    /// Open `<name>.db` through `pool` and start a write batch.
    pub fn create(
        pool: &ConnectionPool,
        name: impl AsRef<Utf8Path>,
    ) -> Result<Self, ElementCacheError> {
        let connection = pool.acquire(&sqlite_cache_path(name.as_ref()))?;
        let batch = {
            let conn = connection.lock();
            conn.execute_batch(CREATE_TABLE)
                .map_err(sqlite_error("create element_cache table", connection.path()))?;
            WriteBatch::begin(&conn).map_err(sqlite_error("begin transaction", connection.path()))?
        };
        debug!("writing element cache {}", connection.path());
        Ok(Self { connection, batch })
    }
}

impl ElementCacheWriter for SqliteElementCacheWriter {
    type Error = ElementCacheError;

    fn write(&mut self, key: u64, data: &[u8]) -> Result<(), Self::Error> {
        let id = sql_key(key)?;
        let path = self.connection.path();
        self.connection
            .lock()
            .prepare_cached(INSERT)
            .and_then(|mut insert| insert.execute(params![id, data]))
            .map_err(sqlite_error("insert element", path))?;
        Ok(())
    }

    fn save_offsets(&mut self) -> Result<(), Self::Error> {
        let conn = self.connection.lock();
        self.batch
            .checkpoint(&conn)
            .map_err(sqlite_error("commit elements", self.connection.path()))
    }
}

impl Drop for SqliteElementCacheWriter {
    fn drop(&mut self) {
        let conn = self.connection.lock();
        if let Err(err) = self.batch.commit(&conn) {
            warn!(
                "failed to commit element cache {}: {err}",
                self.connection.path()
            );
        }
    }
}

/// Reads blobs from the `element_cache` table.
#[derive(Debug)]
pub struct SqliteElementCacheReader {
    connection: PooledConnection,
}

impl SqliteElementCacheReader {
    /// Open `<name>.db` through `pool`.
    ///
    /// Fails when the database holds no `element_cache` table.
    pub fn open(
        pool: &ConnectionPool,
        name: impl AsRef<Utf8Path>,
    ) -> Result<Self, ElementCacheError> {
        let connection = pool.acquire(&sqlite_cache_path(name.as_ref()))?;
        {
            let conn = connection.lock();
            conn.prepare_cached(SELECT)
                .map_err(sqlite_error("prepare element lookup", connection.path()))?;
        }
        Ok(Self { connection })
    }

    fn lookup(conn: &Connection, id: i64) -> rusqlite::Result<Option<Vec<u8>>> {
        conn.prepare_cached(SELECT)?
            .query_row([id], |row| row.get(0))
            .optional()
    }
}

impl ElementCacheReader for SqliteElementCacheReader {
    type Error = ElementCacheError;

    // The table is its own index.
    fn load_offsets(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn read(&self, key: u64) -> Result<Option<Vec<u8>>, Self::Error> {
        let path = self.connection.path();
        let Ok(id) = i64::try_from(key) else {
            error!("element {key} is not cached in {path}");
            return Ok(None);
        };
        let blob =
            Self::lookup(&self.connection.lock(), id).map_err(sqlite_error("look up element", path))?;
        if blob.is_none() {
            error!("element {key} is not cached in {path}");
        }
        Ok(blob)
    }
}
