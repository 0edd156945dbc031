//! SQLite-backed media and the connection pool they share.

mod blob_file;
mod pool;
mod transaction;

pub use blob_file::{BlobFileError, BlobFileMode, SqliteBlobFile};
pub use pool::{ConnectionPool, PoolError, PoolOptions, PooledConnection};
pub(crate) use transaction::WriteBatch;
