//! Coordinate types shared by the geo conversions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metres spanned by one degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Smallest accepted `cos(lat0)` for a reference point.
///
/// Below this the longitude scale blows up; at 89.9° the cosine is ~1.7e-3,
/// so this only rejects references within a few metres of a pole.
pub const MIN_LATITUDE_COSINE: f64 = 1e-6;

/// Errors from coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// The reference latitude is so close to a pole that longitude offsets diverge.
    #[error("Reference latitude {0} is too close to a pole for the flat-earth approximation")]
    PolarReference(f64),

    /// An input coordinate was NaN or infinite.
    #[error("Non-finite coordinate: {0}")]
    NonFinite(&'static str),

    /// Latitude outside [-90, 90].
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180].
    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),

    /// Scale factor must be finite and strictly positive.
    #[error("Invalid scale: {0} metres per unit")]
    InvalidScale(f64),
}

/// A WGS84 geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Create a coordinate without validation.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Create a coordinate, rejecting out-of-range or non-finite values.
    pub fn checked(lat: f64, lng: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() {
            return Err(GeoError::NonFinite("lat"));
        }
        if !lng.is_finite() {
            return Err(GeoError::NonFinite("lng"));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::InvalidLatitude(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(GeoError::InvalidLongitude(lng));
        }
        Ok(Self { lat, lng })
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// A position on the local plane (pixels or metre offsets, camera-defined).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalPoint {
    pub x: f64,
    pub y: f64,
}

impl LocalPoint {
    /// The coordinate-system zero.
    pub const ORIGIN: LocalPoint = LocalPoint { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in local units.
    pub fn distance_to(&self, other: &LocalPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}
