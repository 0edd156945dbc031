//! Connection sharing between SQLite-backed media.
#![cfg(feature = "store-sqlite")]

use camino::Utf8PathBuf;
use nodecache_core::{ElementCacheReader, ElementCacheWriter, PointReader, PointWriter};
use nodecache_store::element_cache::{SqliteElementCacheReader, SqliteElementCacheWriter};
use nodecache_store::point::{SqlitePointReader, SqlitePointWriter, sqlite_point_path};
use nodecache_store::sqlite::{BlobFileMode, ConnectionPool, SqliteBlobFile};
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}

fn base_name(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("region")).expect("utf-8 path")
}

#[rstest]
fn points_and_elements_share_one_database(temp_dir: TempDir) {
    let pool = ConnectionPool::default();
    let name = base_name(&temp_dir);
    let db = sqlite_point_path(&name);

    let mut points = SqlitePointWriter::create(&pool, &name).expect("point writer");
    let mut ways = SqliteElementCacheWriter::create(&pool, &name).expect("cache writer");
    assert_eq!(pool.reference_count(&db), 2);

    points.add_point(1, 51.5, -0.125).expect("add point");
    ways.write(100, b"1,2,3").expect("write way");
    // The cache writer joined the point writer's transaction; only the owner
    // commits it.
    drop(ways);
    drop(points);
    assert!(!pool.is_open(&db));

    let reader = SqlitePointReader::open(&pool, &name).expect("point reader");
    let mut cache = SqliteElementCacheReader::open(&pool, &name).expect("cache reader");
    cache.load_offsets().expect("load");
    assert!(reader.get_point(1).expect("lookup").is_some());
    assert_eq!(cache.read(100).expect("read"), Some(b"1,2,3".to_vec()));
    assert_eq!(pool.open_connections(), 1);
}

#[rstest]
fn three_acquisitions_need_three_releases(temp_dir: TempDir) {
    let pool = ConnectionPool::default();
    let db = sqlite_point_path(&base_name(&temp_dir));
    let first = pool.acquire(&db).expect("first");
    let second = pool.acquire(&db).expect("second");
    let third = pool.acquire(&db).expect("third");

    pool.release(first);
    pool.release(second);
    assert!(pool.is_open(&db));
    assert_eq!(pool.reference_count(&db), 1);

    pool.release(third);
    assert!(!pool.is_open(&db));
    assert!(pool.acquire(&db).is_ok(), "reopening after close succeeds");
}

#[rstest]
fn independent_pools_do_not_share(temp_dir: TempDir) {
    let db = sqlite_point_path(&base_name(&temp_dir));
    let left = ConnectionPool::default();
    let right = ConnectionPool::default();
    let a = left.acquire(&db).expect("left");
    let b = right.acquire(&db).expect("right");
    assert!(!a.shares_connection_with(&b));
}

#[rstest]
fn blob_files_survive_connection_close(temp_dir: TempDir) {
    let pool = ConnectionPool::default();
    let path = Utf8PathBuf::from_path_buf(temp_dir.path().join("tiles/7.mwm")).expect("utf-8");
    let mut file = SqliteBlobFile::open(&pool, &path, BlobFileMode::WriteTruncate).expect("create");
    file.write_bytes(b"tile payload").expect("write");
    drop(file);
    assert_eq!(pool.open_connections(), 0);

    let mut file = SqliteBlobFile::open(&pool, &path, BlobFileMode::Read).expect("reopen");
    assert_eq!(file.size(), 12);
    assert_eq!(file.read_remaining().expect("read"), b"tile payload");
}
