//! Artefact naming shared by the storage media.
//!
//! Every medium is opened from a base name; the media that need a distinct
//! artefact derive it by appending a fixed suffix.

use camino::{Utf8Path, Utf8PathBuf};

/// Suffix of the sparse point store's record file.
pub const SPARSE_SUFFIX: &str = ".short";
/// Suffix of the element cache's offset index.
pub const OFFSETS_SUFFIX: &str = ".offs";
/// Suffix of relational databases.
pub const SQLITE_SUFFIX: &str = ".db";

/// Append `suffix` to the final component of `name`.
///
/// ```rust
/// use camino::Utf8Path;
/// use nodecache_store::paths::with_suffix;
///
/// assert_eq!(with_suffix(Utf8Path::new("out/nodes"), ".short"), "out/nodes.short");
/// ```
#[must_use]
pub fn with_suffix(name: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{name}{suffix}"))
}

/// Database backing the emulated file at `path`.
///
/// Files sharing a directory and an extension share one database named
/// after that extension; files without an extension use `default.db`.
#[must_use]
pub fn blob_database_path(path: &Utf8Path) -> Utf8PathBuf {
    let extension = path.extension().filter(|ext| !ext.is_empty()).unwrap_or("default");
    let file_name = format!("{extension}{SQLITE_SUFFIX}");
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.join(file_name),
        _ => Utf8PathBuf::from(file_name),
    }
}
