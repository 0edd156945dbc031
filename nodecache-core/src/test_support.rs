//! Test-only, in-memory stores implementing the capability traits.
//!
//! They apply the same fixed-point codec as the real media so tests observe
//! identical precision and sentinel behaviour.

use std::collections::HashMap;
use std::convert::Infallible;

use geo::Coord;

use crate::{CoordinateError, ElementCacheReader, ElementCacheWriter, FixedLatLon};
use crate::{PointReader, PointWriter};

/// In-memory point store used in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryPointStore {
    points: HashMap<u64, FixedLatLon>,
    processed: u64,
}

impl MemoryPointStore {
    /// Create a store pre-populated with `(id, lat, lon)` triples.
    pub fn with_points<I>(points: I) -> Result<Self, CoordinateError>
    where
        I: IntoIterator<Item = (u64, f64, f64)>,
    {
        let mut store = Self::default();
        for (id, lat, lon) in points {
            store.add_point(id, lat, lon)?;
        }
        Ok(store)
    }
}

impl PointWriter for MemoryPointStore {
    type Error = CoordinateError;

    fn add_point(&mut self, id: u64, lat: f64, lon: f64) -> Result<(), Self::Error> {
        self.points.insert(id, FixedLatLon::encode(lat, lon)?);
        self.processed += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn processed_points(&self) -> u64 {
        self.processed
    }
}

impl PointReader for MemoryPointStore {
    type Error = Infallible;

    fn get_point(&self, id: u64) -> Result<Option<Coord<f64>>, Self::Error> {
        Ok(self.points.get(&id).and_then(|fixed| fixed.decode()))
    }
}

/// In-memory element cache used in tests.
///
/// `read` returns nothing until `load_offsets` has been called, mirroring
/// the file-backed cache contract.
#[derive(Debug, Default, Clone)]
pub struct MemoryElementCache {
    elements: HashMap<u64, Vec<u8>>,
    loaded: bool,
}

impl ElementCacheWriter for MemoryElementCache {
    type Error = Infallible;

    fn write(&mut self, key: u64, data: &[u8]) -> Result<(), Self::Error> {
        self.elements.entry(key).or_insert_with(|| data.to_vec());
        Ok(())
    }

    fn save_offsets(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ElementCacheReader for MemoryElementCache {
    type Error = Infallible;

    fn load_offsets(&mut self) -> Result<(), Self::Error> {
        self.loaded = true;
        Ok(())
    }

    fn read(&self, key: u64) -> Result<Option<Vec<u8>>, Self::Error> {
        if !self.loaded {
            return Ok(None);
        }
        Ok(self.elements.get(&key).cloned())
    }
}
