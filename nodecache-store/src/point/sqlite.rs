//! Point storage in a relational table.
//!
//! Rows live in `nodes(id, lat, lon)` inside `<name>.db`. Writers batch
//! inserts into one long transaction that commits on flush. The table keeps
//! the degrees supplied by the producer once the fixed-point codec has
//! accepted them.

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use log::{debug, error, warn};
use nodecache_core::{FixedLatLon, PointReader, PointWriter};
use rusqlite::{Connection, OptionalExtension, params};

use crate::PointStoreError;
use crate::paths::{SQLITE_SUFFIX, with_suffix};
use crate::sqlite::{ConnectionPool, PooledConnection, WriteBatch};

const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS nodes (id INTEGER PRIMARY KEY, lat REAL NOT NULL, lon REAL NOT NULL)";
const INSERT: &str = "INSERT OR REPLACE INTO nodes (id, lat, lon) VALUES (?1, ?2, ?3)";
const SELECT: &str = "SELECT lat, lon FROM nodes WHERE id = ?1";

/// Database used by the relational point store opened from `name`.
#[must_use]
pub fn sqlite_point_path(name: &Utf8Path) -> Utf8PathBuf {
    with_suffix(name, SQLITE_SUFFIX)
}

fn sqlite_error<'a>(
    operation: &'static str,
    path: &'a Utf8Path,
) -> impl FnOnce(rusqlite::Error) -> PointStoreError + 'a {
    move |source| PointStoreError::Sqlite {
        operation,
        path: path.to_path_buf(),
        source,
    }
}

/// Inserts points into the `nodes` table.
#[derive(Debug)]
pub struct SqlitePointWriter {
    connection: PooledConnection,
    batch: WriteBatch,
    processed: u64,
}

impl SqlitePointWriter {
    /// Open `<name>.db` through `pool`, create the table and start a batch.
    pub fn create(pool: &ConnectionPool, name: impl AsRef<Utf8Path>) -> Result<Self, PointStoreError> {
        let connection = pool.acquire(&sqlite_point_path(name.as_ref()))?;
        let batch = {
            let conn = connection.lock();
            conn.execute_batch(CREATE_TABLE)
                .map_err(sqlite_error("create nodes table", connection.path()))?;
            WriteBatch::begin(&conn).map_err(sqlite_error("begin transaction", connection.path()))?
        };
        debug!("writing points to {}", connection.path());
        Ok(Self {
            connection,
            batch,
            processed: 0,
        })
    }

    /// Canonical database path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.connection.path()
    }
}

impl PointWriter for SqlitePointWriter {
    type Error = PointStoreError;

    fn add_point(&mut self, id: u64, lat: f64, lon: f64) -> Result<(), Self::Error> {
        FixedLatLon::encode(lat, lon)?;
        let key = i64::try_from(id).map_err(|_| PointStoreError::IdOutOfRange { id })?;
        let path = self.connection.path();
        self.connection
            .lock()
            .prepare_cached(INSERT)
            .and_then(|mut insert| insert.execute(params![key, lat, lon]))
            .map_err(sqlite_error("insert node", path))?;
        self.processed += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        let conn = self.connection.lock();
        self.batch
            .checkpoint(&conn)
            .map_err(sqlite_error("commit nodes", self.connection.path()))
    }

    fn processed_points(&self) -> u64 {
        self.processed
    }
}

impl Drop for SqlitePointWriter {
    fn drop(&mut self) {
        let conn = self.connection.lock();
        if let Err(err) = self.batch.commit(&conn) {
            warn!("failed to commit nodes to {}: {err}", self.connection.path());
        }
    }
}

/// Looks points up in the `nodes` table.
#[derive(Debug)]
pub struct SqlitePointReader {
    connection: PooledConnection,
}

impl SqlitePointReader {
    /// Open `<name>.db` through `pool`.
    ///
    /// Fails when the database holds no `nodes` table.
    pub fn open(pool: &ConnectionPool, name: impl AsRef<Utf8Path>) -> Result<Self, PointStoreError> {
        let connection = pool.acquire(&sqlite_point_path(name.as_ref()))?;
        {
            let conn = connection.lock();
            conn.prepare_cached(SELECT)
                .map_err(sqlite_error("prepare node lookup", connection.path()))?;
        }
        Ok(Self { connection })
    }

    fn lookup(conn: &Connection, key: i64) -> rusqlite::Result<Option<(f64, f64)>> {
        conn.prepare_cached(SELECT)?
            .query_row([key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
    }
}

impl PointReader for SqlitePointReader {
    type Error = PointStoreError;

    fn get_point(&self, id: u64) -> Result<Option<Coord<f64>>, Self::Error> {
        let Ok(key) = i64::try_from(id) else {
            return Ok(None);
        };
        let path = self.connection.path();
        let row = Self::lookup(&self.connection.lock(), key)
            .map_err(sqlite_error("look up node", path))?;
        // The origin is the absent sentinel in every other medium.
        let coord = row
            .filter(|&(lat, lon)| lat != 0.0 || lon != 0.0)
            .map(|(lat, lon)| Coord { x: lon, y: lat });
        if coord.is_none() {
            error!("node {id} is not present in {path}");
        }
        Ok(coord)
    }
}
