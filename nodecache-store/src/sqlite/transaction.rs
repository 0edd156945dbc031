//! Long-running write batches on a possibly shared connection.

use log::debug;
use rusqlite::Connection;

/// Tracks whether this writer opened the transaction it is writing into.
///
/// Connections are shared through the pool, so a second writer on the same
/// database joins the transaction the first one opened and leaves committing
/// to its owner.
#[derive(Debug)]
pub(crate) struct WriteBatch {
    owned: bool,
}

impl WriteBatch {
    /// Open a transaction unless one is already running on `connection`.
    pub(crate) fn begin(connection: &Connection) -> rusqlite::Result<Self> {
        if connection.is_autocommit() {
            connection.execute_batch("BEGIN")?;
            Ok(Self { owned: true })
        } else {
            debug!("joining the transaction already open on a shared connection");
            Ok(Self { owned: false })
        }
    }

    /// Commit the owned transaction, if any.
    pub(crate) fn commit(&mut self, connection: &Connection) -> rusqlite::Result<()> {
        if self.owned && !connection.is_autocommit() {
            connection.execute_batch("COMMIT")?;
        }
        self.owned = false;
        Ok(())
    }

    /// Commit, then start a new batch so writes keep their fast path.
    pub(crate) fn checkpoint(&mut self, connection: &Connection) -> rusqlite::Result<()> {
        self.commit(connection)?;
        *self = Self::begin(connection)?;
        Ok(())
    }

    /// Whether this batch owns an open transaction.
    pub(crate) const fn is_owned(&self) -> bool {
        self.owned
    }
}
