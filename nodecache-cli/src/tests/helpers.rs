//! Test helpers for temporary workspaces and small stores.

use camino::{Utf8Path, Utf8PathBuf};
use nodecache_core::PointWriter;
use nodecache_store::{PointStorageKind, StoreOptions, open_point_writer};
use tempfile::TempDir;

/// Temporary directory addressed through a UTF-8 root.
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    std::fs::write(path.as_std_path(), contents).expect("write fixture file");
}

/// Write `points` into a store of `kind` named `name` and flush it.
pub(super) fn write_store(kind: PointStorageKind, name: &Utf8Path, points: &[(u64, f64, f64)]) {
    let mut writer =
        open_point_writer(kind, name, &StoreOptions::default()).expect("open point writer");
    for &(id, lat, lon) in points {
        writer.add_point(id, lat, lon).expect("write point");
    }
    writer.flush().expect("flush point writer");
}
