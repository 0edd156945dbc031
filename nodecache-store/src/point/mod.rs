//! Node coordinate storage media.
//!
//! | Medium         | Artefact       | Memory          | Best for                  |
//! |----------------|----------------|-----------------|---------------------------|
//! | dense file     | `name`         | page cache      | planet files              |
//! | dense memory   | `name`         | 8 B × capacity  | planet files, fast lookup |
//! | sparse         | `name.short`   | ~per node       | regional extracts         |
//! | SQLite         | `name.db`      | SQLite cache    | shared or inspectable DBs |

mod dense_file;
mod dense_memory;
mod sparse;
#[cfg(feature = "store-sqlite")]
mod sqlite;

pub use dense_file::{DenseFilePointReader, DenseFilePointWriter};
pub use dense_memory::{DenseMemoryPointReader, DenseMemoryPointWriter};
pub use sparse::{SPARSE_RECORD_SIZE, SparsePointReader, SparsePointWriter, sparse_path};
#[cfg(feature = "store-sqlite")]
pub use sqlite::{SqlitePointReader, SqlitePointWriter, sqlite_point_path};
