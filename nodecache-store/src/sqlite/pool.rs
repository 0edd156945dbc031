//! Reference-counted sharing of SQLite connections by database path.
//!
//! Components that open the same database through one [`ConnectionPool`]
//! share a single connection. The connection closes when the last
//! [`PooledConnection`] for its path is dropped; acquiring the path again
//! afterwards opens a fresh one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

type SharedConnection = Arc<Mutex<Connection>>;

/// Errors raised while acquiring a pooled connection.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The database path could not be canonicalised.
    #[error("failed to resolve database path {path}")]
    Resolve {
        /// Path as supplied by the caller.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// SQLite refused to open the database.
    #[error("failed to open SQLite database at {path}")]
    Open {
        /// Canonical database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
}

/// Connection tuning applied when a database is first opened.
///
/// Pragma failures are logged and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Disable fsync on commit.
    pub synchronous_off: bool,
    /// Journal mode to select, such as `MEMORY` or `WAL`.
    pub journal_mode: Option<String>,
    /// Bytes of the database to memory-map, when set.
    pub mmap_size: Option<u64>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            synchronous_off: true,
            journal_mode: Some("MEMORY".to_owned()),
            mmap_size: None,
        }
    }
}

struct PoolEntry {
    connection: SharedConnection,
    references: usize,
}

#[derive(Default)]
struct PoolInner {
    options: PoolOptions,
    registry: Mutex<HashMap<Utf8PathBuf, PoolEntry>>,
}

/// Shares one SQLite connection per canonical database path.
///
/// Cloning the pool is cheap and every clone sees the same registry.
#[derive(Clone, Default)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("options", &self.inner.options)
            .field("open_connections", &self.open_connections())
            .finish()
    }
}

impl ConnectionPool {
    /// Create an empty pool applying `options` to every new connection.
    #[must_use]
    pub fn new(options: PoolOptions) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                options,
                registry: Mutex::default(),
            }),
        }
    }

    /// Options applied to new connections.
    #[must_use]
    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    /// Borrow the shared connection for `path`, opening it if needed.
    ///
    /// Paths are canonicalised first so different spellings of one file
    /// share a connection. Parent directories are created on demand.
    pub fn acquire(&self, path: &Utf8Path) -> Result<PooledConnection, PoolError> {
        let canonical =
            nodecache_fs::canonical_path(path).map_err(|source| PoolError::Resolve {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(connection) = self.reuse(&canonical) {
            return Ok(self.handle(canonical, connection));
        }

        // Open outside the registry lock; a racing acquire may win, in which
        // case the freshly opened connection is discarded.
        let opened = Arc::new(Mutex::new(self.open(&canonical)?));
        let connection = {
            let mut registry = self.registry();
            let entry = registry.entry(canonical.clone()).or_insert_with(|| {
                info!("opened SQLite database {canonical}");
                PoolEntry {
                    connection: opened,
                    references: 0,
                }
            });
            entry.references += 1;
            Arc::clone(&entry.connection)
        };
        Ok(self.handle(canonical, connection))
    }

    /// Return a connection to the pool.
    ///
    /// Equivalent to dropping the handle.
    pub fn release(&self, connection: PooledConnection) {
        drop(connection);
    }

    /// Whether a connection for `path` is currently open.
    #[must_use]
    pub fn is_open(&self, path: &Utf8Path) -> bool {
        self.reference_count(path) > 0
    }

    /// Number of live handles for `path`.
    #[must_use]
    pub fn reference_count(&self, path: &Utf8Path) -> usize {
        let Ok(canonical) = nodecache_fs::canonical_path(path) else {
            return 0;
        };
        self.registry()
            .get(&canonical)
            .map_or(0, |entry| entry.references)
    }

    /// Number of distinct databases with an open connection.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Utf8PathBuf, PoolEntry>> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn reuse(&self, canonical: &Utf8Path) -> Option<SharedConnection> {
        let mut registry = self.registry();
        let entry = registry.get_mut(canonical)?;
        entry.references += 1;
        debug!(
            "sharing SQLite connection for {canonical} ({} handles)",
            entry.references
        );
        Some(Arc::clone(&entry.connection))
    }

    fn handle(&self, path: Utf8PathBuf, connection: SharedConnection) -> PooledConnection {
        PooledConnection {
            pool: self.clone(),
            path,
            connection,
        }
    }

    fn open(&self, canonical: &Utf8Path) -> Result<Connection, PoolError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(canonical.as_std_path(), flags).map_err(
            |source| PoolError::Open {
                path: canonical.to_path_buf(),
                source,
            },
        )?;
        tune(&connection, &self.inner.options, canonical);
        Ok(connection)
    }

    fn release_path(&self, canonical: &Utf8Path) {
        let mut registry = self.registry();
        let Some(entry) = registry.get_mut(canonical) else {
            return;
        };
        entry.references = entry.references.saturating_sub(1);
        if entry.references == 0 {
            registry.remove(canonical);
            info!("closed SQLite database {canonical}");
        }
    }
}

fn tune(connection: &Connection, options: &PoolOptions, path: &Utf8Path) {
    if options.synchronous_off {
        if let Err(err) = connection.pragma_update(None, "synchronous", "OFF") {
            warn!("failed to disable synchronous writes on {path}: {err}");
        }
    }
    if let Some(mode) = &options.journal_mode {
        let applied = connection.pragma_update_and_check(None, "journal_mode", mode, |row| {
            row.get::<_, String>(0)
        });
        match applied {
            Ok(applied) => debug!("journal mode for {path} is {applied}"),
            Err(err) => warn!("failed to set journal mode {mode} on {path}: {err}"),
        }
    }
    if let Some(size) = options.mmap_size {
        let Ok(size) = i64::try_from(size) else {
            warn!("mmap size {size} for {path} exceeds the SQLite range");
            return;
        };
        let applied =
            connection.pragma_update_and_check(None, "mmap_size", size, |row| row.get::<_, i64>(0));
        if let Err(err) = applied {
            warn!("failed to set mmap size on {path}: {err}");
        }
    }
}

/// Handle to a pooled connection.
///
/// Dropping the handle releases one reference.
pub struct PooledConnection {
    pool: ConnectionPool,
    path: Utf8PathBuf,
    connection: SharedConnection,
}

impl PooledConnection {
    /// Canonical path of the database.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Lock the connection for exclusive use.
    ///
    /// A poisoned lock is recovered; SQLite keeps its own consistency.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles refer to the same underlying connection.
    #[must_use]
    pub fn shares_connection_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.connection, &other.connection)
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.release_path(&self.path);
    }
}
