//! Fixed-point coordinate codec shared by every point storage variant.
//!
//! Coordinates are stored as a pair of `i32` values holding degrees scaled by
//! 10^7, which keeps seven decimal places (roughly one centimetre). The pair
//! `(0, 0)` doubles as the "no coordinate recorded" sentinel, so a genuine
//! point where the equator meets the prime meridian decodes as absent. Files
//! written by earlier pipeline runs rely on that encoding, so it is kept.

use std::fmt;

use geo::Coord;
use thiserror::Error;

/// Scale factor between degrees and the fixed-point representation.
pub const COORDINATE_SCALE: f64 = 1.0e7;

/// Encoded size in bytes of a [`FixedLatLon`] record.
pub const FIXED_LAT_LON_SIZE: usize = 8;

/// Coordinate axis named in codec errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// North/south component.
    Latitude,
    /// East/west component.
    Longitude,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latitude => f.write_str("latitude"),
            Self::Longitude => f.write_str("longitude"),
        }
    }
}

/// Errors raised when a coordinate cannot be represented in fixed point.
///
/// Both variants indicate a producer bug: the input is not a coordinate on
/// this planet. Callers are expected to abort the run rather than skip the
/// node.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum CoordinateError {
    /// The value was NaN or infinite.
    #[error("{axis} {value} is not a finite number of degrees")]
    NonFinite {
        /// Axis carrying the invalid value.
        axis: Axis,
        /// Value supplied by the producer.
        value: f64,
    },
    /// The scaled value does not fit in a signed 32-bit integer.
    #[error("{axis} {value} overflows the 32-bit fixed-point range (scaled to {scaled})")]
    OutOfRange {
        /// Axis carrying the invalid value.
        axis: Axis,
        /// Value supplied by the producer.
        value: f64,
        /// Truncated 64-bit intermediate that failed the range check.
        scaled: i64,
    },
}

/// A latitude/longitude pair in 10^-7 degree units.
///
/// # Examples
///
/// ```
/// use nodecache_core::FixedLatLon;
///
/// # fn main() -> Result<(), nodecache_core::CoordinateError> {
/// let encoded = FixedLatLon::encode(55.75, 37.61)?;
/// assert_eq!(encoded.lat, 557_500_000);
///
/// let coord = encoded.decode().expect("non-zero coordinates are present");
/// assert!((coord.y - 55.75).abs() < 1.0e-7);
/// assert!((coord.x - 37.61).abs() < 1.0e-7);
///
/// // The origin is indistinguishable from "never written".
/// assert_eq!(FixedLatLon::encode(0.0, 0.0)?.decode(), None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixedLatLon {
    /// Latitude multiplied by 10^7.
    pub lat: i32,
    /// Longitude multiplied by 10^7.
    pub lon: i32,
}

impl FixedLatLon {
    /// Sentinel stored wherever no coordinate has been recorded.
    pub const ABSENT: Self = Self { lat: 0, lon: 0 };

    /// Encode degrees into fixed point, truncating toward zero.
    ///
    /// Only arithmetic bounds are checked: latitudes up to roughly ±214
    /// degrees encode without complaint.
    pub fn encode(lat: f64, lon: f64) -> Result<Self, CoordinateError> {
        Ok(Self {
            lat: scale(Axis::Latitude, lat)?,
            lon: scale(Axis::Longitude, lon)?,
        })
    }

    /// Encode a WGS84 coordinate (`x = longitude`, `y = latitude`).
    pub fn from_coord(coord: Coord<f64>) -> Result<Self, CoordinateError> {
        Self::encode(coord.y, coord.x)
    }

    /// Whether this record holds the sentinel.
    #[must_use]
    pub const fn is_absent(self) -> bool {
        self.lat == 0 && self.lon == 0
    }

    /// Decode into degrees, returning `None` for the sentinel.
    ///
    /// The result uses `x = longitude`, `y = latitude`.
    #[expect(
        clippy::float_arithmetic,
        reason = "fixed-point decoding divides by the scale factor"
    )]
    #[must_use]
    pub fn decode(self) -> Option<Coord<f64>> {
        if self.is_absent() {
            return None;
        }
        Some(Coord {
            x: f64::from(self.lon) / COORDINATE_SCALE,
            y: f64::from(self.lat) / COORDINATE_SCALE,
        })
    }

    /// Serialise as `i32 lat, i32 lon`, little-endian.
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; FIXED_LAT_LON_SIZE] {
        let [a0, a1, a2, a3] = self.lat.to_le_bytes();
        let [b0, b1, b2, b3] = self.lon.to_le_bytes();
        [a0, a1, a2, a3, b0, b1, b2, b3]
    }

    /// Inverse of [`FixedLatLon::to_le_bytes`].
    #[must_use]
    pub const fn from_le_bytes(bytes: [u8; FIXED_LAT_LON_SIZE]) -> Self {
        let [a0, a1, a2, a3, b0, b1, b2, b3] = bytes;
        Self {
            lat: i32::from_le_bytes([a0, a1, a2, a3]),
            lon: i32::from_le_bytes([b0, b1, b2, b3]),
        }
    }

    /// Decode the record at the start of `bytes`, if there are enough bytes.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let record: [u8; FIXED_LAT_LON_SIZE] = bytes.get(..FIXED_LAT_LON_SIZE)?.try_into().ok()?;
        Some(Self::from_le_bytes(record))
    }
}

fn scale(axis: Axis, value: f64) -> Result<i32, CoordinateError> {
    if !value.is_finite() {
        return Err(CoordinateError::NonFinite { axis, value });
    }
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_possible_truncation,
        reason = "truncation toward zero is the persisted encoding; range is checked below"
    )]
    let scaled = (value * COORDINATE_SCALE) as i64;
    i32::try_from(scaled).map_err(|_| CoordinateError::OutOfRange {
        axis,
        value,
        scaled,
    })
}
