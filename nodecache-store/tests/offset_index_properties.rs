//! Batch and randomised checks for the offset index and element cache.

use camino::Utf8PathBuf;
use nodecache_core::{ElementCacheReader, ElementCacheWriter};
use nodecache_store::element_cache::{FileElementCacheReader, FileElementCacheWriter};
use nodecache_store::{OffsetIndexReader, OffsetIndexWriter};
use proptest::prelude::*;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use rstest::{fixture, rstest};
use std::collections::HashMap;
use tempfile::TempDir;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}

fn path_in(dir: &TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("utf-8 path")
}

fn shuffled_keys(count: u64, seed: u64) -> Vec<u64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut keys: Vec<u64> = (0..count).map(|i| i * 7 + 3).collect();
    keys.shuffle(&mut rng);
    keys
}

#[rstest]
#[case::below_threshold(5)]
#[case::just_past_threshold(1025)]
#[case::two_batches(2048)]
fn every_key_is_found_after_reload(temp_dir: TempDir, #[case] count: u64) {
    let path = path_in(&temp_dir, "ids.offs");
    let keys = shuffled_keys(count, count);
    let mut writer = OffsetIndexWriter::<u64>::create(&path).expect("create");
    for &key in &keys {
        writer.add(key, key * 2).expect("add");
    }
    writer.write_all().expect("write");
    drop(writer);

    let mut reader = OffsetIndexReader::<u64>::open(&path).expect("open");
    reader.read_all().expect("load");
    assert_eq!(reader.len() as u64, count);
    for &key in &keys {
        assert_eq!(reader.get_value_by_key(key), Some(key * 2), "key {key}");
    }
    assert_eq!(reader.get_value_by_key(0), None);
    assert_eq!(reader.get_value_by_key(count * 7 + 3), None);

    reader.read_all().expect("reload");
    assert_eq!(reader.len() as u64, count);
}

#[rstest]
#[case::positioned(false)]
#[case::preloaded(true)]
fn random_blobs_round_trip_through_the_cache(temp_dir: TempDir, #[case] preload: bool) {
    let name = path_in(&temp_dir, "ways.cache");
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    let mut expected = HashMap::new();
    let mut writer = FileElementCacheWriter::create(&name).expect("create");
    for key in shuffled_keys(1_500, 42) {
        let len = rng.gen_range(0..64);
        let blob: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
        writer.write(key, &blob).expect("write");
        expected.insert(key, blob);
    }
    writer.save_offsets().expect("save");
    drop(writer);

    let mut reader = FileElementCacheReader::open(&name, preload).expect("open");
    reader.load_offsets().expect("load");
    for (key, blob) in &expected {
        assert_eq!(reader.read(*key).expect("read").as_ref(), Some(blob), "key {key}");
    }
}

proptest! {
    #[test]
    fn lookups_return_the_first_value_written(
        entries in prop::collection::vec((0_u64..64, any::<u64>()), 0..300),
    ) {
        let dir = TempDir::new().expect("create temp dir");
        let path = path_in(&dir, "prop.offs");
        let mut writer = OffsetIndexWriter::<u64>::create(&path).expect("create");
        let mut first = HashMap::new();
        for &(key, value) in &entries {
            writer.add(key, value).expect("add");
            first.entry(key).or_insert(value);
        }
        writer.write_all().expect("write");
        drop(writer);

        let mut reader = OffsetIndexReader::<u64>::open(&path).expect("open");
        reader.read_all().expect("load");
        for key in 0..64 {
            prop_assert_eq!(reader.get_value_by_key(key), first.get(&key).copied());
        }
    }
}
