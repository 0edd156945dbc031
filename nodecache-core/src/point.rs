//! Capability traits for node coordinate storage.
//!
//! Every storage medium exposes the same pair of capabilities: a writer that
//! records `(id, lat, lon)` triples during ingestion and a reader that looks
//! coordinates up by id afterwards. The variant is chosen once at pipeline
//! start-up and never switched while running.

use geo::Coord;

/// Write side of a node coordinate store.
///
/// Writers are single-owner. Data only becomes visible to readers once
/// [`PointWriter::flush`] has returned; implementations also flush when
/// dropped, logging rather than surfacing any failure at that point.
///
/// # Examples
///
/// ```rust
/// use nodecache_core::{FixedLatLon, PointReader, PointWriter};
/// use std::{collections::HashMap, convert::Infallible};
///
/// #[derive(Default)]
/// struct MapStore {
///     points: HashMap<u64, FixedLatLon>,
/// }
///
/// impl PointWriter for MapStore {
///     type Error = nodecache_core::CoordinateError;
///
///     fn add_point(&mut self, id: u64, lat: f64, lon: f64) -> Result<(), Self::Error> {
///         self.points.insert(id, FixedLatLon::encode(lat, lon)?);
///         Ok(())
///     }
///
///     fn flush(&mut self) -> Result<(), Self::Error> {
///         Ok(())
///     }
///
///     fn processed_points(&self) -> u64 {
///         self.points.len() as u64
///     }
/// }
///
/// impl PointReader for MapStore {
///     type Error = Infallible;
///
///     fn get_point(&self, id: u64) -> Result<Option<geo::Coord<f64>>, Self::Error> {
///         Ok(self.points.get(&id).and_then(|fixed| fixed.decode()))
///     }
/// }
///
/// let mut store = MapStore::default();
/// store.add_point(5, 55.75, 37.61).expect("valid coordinate");
/// let coord = store.get_point(5).expect("infallible").expect("present");
/// assert!((coord.y - 55.75).abs() < 1.0e-7);
/// ```
pub trait PointWriter {
    /// Error raised by the backing medium.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Record the coordinate of node `id`.
    ///
    /// Ids may arrive in any order. Writing the same id twice is not
    /// deduplicated; which value survives depends on the medium.
    fn add_point(&mut self, id: u64, lat: f64, lon: f64) -> Result<(), Self::Error>;

    /// Persist everything written so far.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Number of `add_point` calls that succeeded.
    fn processed_points(&self) -> u64;
}

/// Read side of a node coordinate store.
pub trait PointReader {
    /// Error raised by the backing medium.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Look up node `id`, returning `x = longitude`, `y = latitude`.
    ///
    /// `Ok(None)` means the node was never written, or was written at
    /// exactly `(0, 0)`. Absence is an expected outcome for regional
    /// extracts and never an error.
    fn get_point(&self, id: u64) -> Result<Option<Coord<f64>>, Self::Error>;
}

impl<W: PointWriter + ?Sized> PointWriter for Box<W> {
    type Error = W::Error;

    fn add_point(&mut self, id: u64, lat: f64, lon: f64) -> Result<(), Self::Error> {
        (**self).add_point(id, lat, lon)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        (**self).flush()
    }

    fn processed_points(&self) -> u64 {
        (**self).processed_points()
    }
}

impl<R: PointReader + ?Sized> PointReader for Box<R> {
    type Error = R::Error;

    fn get_point(&self, id: u64) -> Result<Option<Coord<f64>>, Self::Error> {
        (**self).get_point(id)
    }
}
