//! Coordinate conversion module
//!
//! Maps positions on a camera's local plane (pixels or metre offsets) to
//! geographic coordinates, and measures short distances between geographic
//! points.
//!
//! # Approximation
//!
//! All conversions use an equirectangular (flat-earth) approximation around a
//! reference point: one degree of latitude is [`METERS_PER_DEGREE`] metres and
//! one degree of longitude is that value scaled by `cos(lat0)`. This is
//! accurate for offsets of a few kilometres, which covers a camera's field of
//! view. It is not a geodesic calculation and drifts noticeably over hundreds
//! of kilometres.

mod types;

pub use types::{GeoError, LatLng, LocalPoint, METERS_PER_DEGREE, MIN_LATITUDE_COSINE};

use serde::{Deserialize, Serialize};

/// Converts a planar position to geographic coordinates.
///
/// # Arguments
///
/// * `point` - Position on the local plane
/// * `origin` - Planar position that coincides with `reference` (coordinate
///   zero, or the frame centre for pixel sources)
/// * `reference` - Geographic coordinate of `origin`
/// * `meters_per_unit` - Metres represented by one planar unit
///
/// # Errors
///
/// Returns [`GeoError::PolarReference`] when `cos(reference.lat)` is below
/// [`MIN_LATITUDE_COSINE`], and [`GeoError::NonFinite`] for NaN/infinite input.
#[inline]
pub fn to_geo(
    point: LocalPoint,
    origin: LocalPoint,
    reference: LatLng,
    meters_per_unit: f64,
) -> Result<LatLng, GeoError> {
    if !point.is_finite() {
        return Err(GeoError::NonFinite("point"));
    }
    let lng_scale = longitude_scale(reference.lat)?;

    let dx_m = (point.x - origin.x) * meters_per_unit;
    let dy_m = (point.y - origin.y) * meters_per_unit;

    Ok(LatLng {
        lat: reference.lat + dy_m / METERS_PER_DEGREE,
        lng: reference.lng + dx_m / lng_scale,
    })
}

/// Metres per degree of longitude at the given latitude.
fn longitude_scale(lat: f64) -> Result<f64, GeoError> {
    if !lat.is_finite() {
        return Err(GeoError::NonFinite("reference latitude"));
    }
    let cos_lat = lat.to_radians().cos();
    if cos_lat.abs() < MIN_LATITUDE_COSINE {
        return Err(GeoError::PolarReference(lat));
    }
    Ok(METERS_PER_DEGREE * cos_lat)
}

/// Flat-earth distance in metres from `point` to `center`.
///
/// Longitude offsets are scaled by the cosine of the centre's latitude, the
/// same conversion [`to_geo`] uses.
pub fn flat_distance_meters(point: LatLng, center: LatLng) -> f64 {
    let dlat_m = (point.lat - center.lat) * METERS_PER_DEGREE;
    let dlng_m = (point.lng - center.lng) * METERS_PER_DEGREE * center.lat.to_radians().cos();
    (dlat_m * dlat_m + dlng_m * dlng_m).sqrt()
}

/// Axis-aligned square containment on the local plane.
///
/// The span on each axis is half-open, `[center - size/2, center + size/2)`,
/// so adjacent squares never both claim a shared edge.
#[inline]
pub fn square_contains(center: LocalPoint, size: f64, point: LocalPoint) -> bool {
    let half = size / 2.0;
    let within = |c: f64, v: f64| v >= c - half && v < c + half;
    within(center.x, point.x) && within(center.y, point.y)
}

/// Corners of an axis-aligned square, counter-clockwise from bottom-left.
pub fn square_corners(center: LocalPoint, size: f64) -> [LocalPoint; 4] {
    let half = size / 2.0;
    [
        LocalPoint::new(center.x - half, center.y - half),
        LocalPoint::new(center.x + half, center.y - half),
        LocalPoint::new(center.x + half, center.y + half),
        LocalPoint::new(center.x - half, center.y + half),
    ]
}

/// Camera calibration: ties a local plane to the globe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceFrame {
    /// Geographic position of `origin`.
    pub reference: LatLng,
    /// Metres per planar unit.
    pub meters_per_unit: f64,
    /// Planar position that maps onto `reference`.
    pub origin: LocalPoint,
}

impl Default for ReferenceFrame {
    fn default() -> Self {
        // Masai Mara, 1 unit = 1 metre
        Self {
            reference: LatLng::new(-1.2921, 34.7617),
            meters_per_unit: 1.0,
            origin: LocalPoint::ORIGIN,
        }
    }
}

impl ReferenceFrame {
    /// Create a frame anchored at the coordinate-system zero.
    pub fn new(reference: LatLng, meters_per_unit: f64) -> Result<Self, GeoError> {
        Self::with_origin(reference, meters_per_unit, LocalPoint::ORIGIN)
    }

    /// Create a frame with an explicit origin (e.g. a frame-centre offset).
    pub fn with_origin(
        reference: LatLng,
        meters_per_unit: f64,
        origin: LocalPoint,
    ) -> Result<Self, GeoError> {
        let reference = LatLng::checked(reference.lat, reference.lng)?;
        if !meters_per_unit.is_finite() || meters_per_unit <= 0.0 {
            return Err(GeoError::InvalidScale(meters_per_unit));
        }
        if !origin.is_finite() {
            return Err(GeoError::NonFinite("origin"));
        }
        longitude_scale(reference.lat)?;
        Ok(Self {
            reference,
            meters_per_unit,
            origin,
        })
    }

    /// Convert a planar position to geographic coordinates.
    pub fn to_geo(&self, point: LocalPoint) -> Result<LatLng, GeoError> {
        to_geo(point, self.origin, self.reference, self.meters_per_unit)
    }

    /// Convert a geographic coordinate back onto the local plane.
    pub fn to_local(&self, coord: LatLng) -> Result<LocalPoint, GeoError> {
        if !coord.lat.is_finite() || !coord.lng.is_finite() {
            return Err(GeoError::NonFinite("coordinate"));
        }
        let lng_scale = longitude_scale(self.reference.lat)?;
        let dy_m = (coord.lat - self.reference.lat) * METERS_PER_DEGREE;
        let dx_m = (coord.lng - self.reference.lng) * lng_scale;
        Ok(LocalPoint {
            x: self.origin.x + dx_m / self.meters_per_unit,
            y: self.origin.y + dy_m / self.meters_per_unit,
        })
    }

    /// Geographic corners of a local square, for map overlays.
    pub fn square_outline(&self, center: LocalPoint, size: f64) -> Result<Vec<LatLng>, GeoError> {
        square_corners(center, size)
            .iter()
            .map(|corner| self.to_geo(*corner))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARA: LatLng = LatLng {
        lat: -1.2921,
        lng: 34.7617,
    };

    #[test]
    fn test_origin_maps_to_reference() {
        let coord = to_geo(LocalPoint::ORIGIN, LocalPoint::ORIGIN, MARA, 10.0).unwrap();
        assert_eq!(coord, MARA);
    }

    #[test]
    fn test_frame_center_origin_maps_to_reference() {
        let center = LocalPoint::new(640.0, 360.0);
        let coord = to_geo(center, center, MARA, 0.1).unwrap();
        assert_eq!(coord, MARA);
    }

    #[test]
    fn test_north_offset_changes_latitude_only() {
        // 111.32 m north is exactly 0.001°
        let coord = to_geo(LocalPoint::new(0.0, 111.32), LocalPoint::ORIGIN, MARA, 1.0).unwrap();
        assert!((coord.lat - (MARA.lat + 0.001)).abs() < 1e-12);
        assert_eq!(coord.lng, MARA.lng);
    }

    #[test]
    fn test_east_offset_scaled_by_latitude_cosine() {
        let reference = LatLng::new(60.0, 10.0);
        // cos(60°) = 0.5, so 55.66 m east is 0.001° of longitude
        let coord = to_geo(
            LocalPoint::new(55.66, 0.0),
            LocalPoint::ORIGIN,
            reference,
            1.0,
        )
        .unwrap();
        assert!((coord.lng - 10.001).abs() < 1e-9, "got {}", coord.lng);
        assert_eq!(coord.lat, 60.0);
    }

    #[test]
    fn test_polar_reference_fails_loudly() {
        let result = to_geo(
            LocalPoint::new(1.0, 1.0),
            LocalPoint::ORIGIN,
            LatLng::new(90.0, 0.0),
            1.0,
        );
        assert!(matches!(result, Err(GeoError::PolarReference(_))));
    }

    #[test]
    fn test_non_finite_point_rejected() {
        let result = to_geo(
            LocalPoint::new(f64::NAN, 0.0),
            LocalPoint::ORIGIN,
            MARA,
            1.0,
        );
        assert!(matches!(result, Err(GeoError::NonFinite(_))));
    }

    #[test]
    fn test_flat_distance_along_meridian() {
        let a = LatLng::new(0.0, 0.0);
        let b = LatLng::new(0.001, 0.0);
        assert!((flat_distance_meters(b, a) - 111.32).abs() < 1e-6);
    }

    #[test]
    fn test_square_contains_spec_examples() {
        let center = LocalPoint::new(200.0, 250.0);
        assert!(!square_contains(center, 100.0, LocalPoint::new(250.0, 300.0)));
        assert!(square_contains(center, 100.0, LocalPoint::new(220.0, 260.0)));
    }

    #[test]
    fn test_square_lower_edge_is_inside() {
        let center = LocalPoint::new(200.0, 250.0);
        assert!(square_contains(center, 100.0, LocalPoint::new(150.0, 200.0)));
        assert!(!square_contains(center, 100.0, LocalPoint::new(149.9, 200.0)));
    }

    mod reference_frame {
        use super::*;

        #[test]
        fn test_rejects_invalid_scale() {
            assert!(matches!(
                ReferenceFrame::new(MARA, 0.0),
                Err(GeoError::InvalidScale(_))
            ));
            assert!(matches!(
                ReferenceFrame::new(MARA, f64::INFINITY),
                Err(GeoError::InvalidScale(_))
            ));
        }

        #[test]
        fn test_rejects_invalid_latitude() {
            assert!(matches!(
                ReferenceFrame::new(LatLng::new(95.0, 0.0), 1.0),
                Err(GeoError::InvalidLatitude(_))
            ));
        }

        #[test]
        fn test_to_local_inverts_to_geo() {
            let frame =
                ReferenceFrame::with_origin(MARA, 10.0, LocalPoint::new(320.0, 240.0)).unwrap();
            let point = LocalPoint::new(412.0, 101.5);
            let back = frame.to_local(frame.to_geo(point).unwrap()).unwrap();
            assert!(back.distance_to(&point) < 1e-6, "got {:?}", back);
        }

        #[test]
        fn test_square_outline_has_four_corners() {
            let frame = ReferenceFrame::default();
            let outline = frame
                .square_outline(LocalPoint::new(200.0, 250.0), 100.0)
                .unwrap();
            assert_eq!(outline.len(), 4);
            // Bottom-left is south-west of top-right
            assert!(outline[0].lat < outline[2].lat);
            assert!(outline[0].lng < outline[2].lng);
        }
    }
}
