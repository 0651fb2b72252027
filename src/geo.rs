/*!
 * Geographic calculations.
 *
 * Everything here works on a spherical Earth. That is plenty accurate for deciding which warehouse
 * is closest to a damaged neighborhood, and it keeps the math simple enough to reason about.
 */

use crate::error::{ReliefError, ReliefResult};
use serde::{Deserialize, Serialize};

/// Mean radius of the Earth in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude used for the coarse area estimates.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Grid cells are never finer than this many decimal places.
const MAX_GRID_PRECISION: u8 = 12;

/// A location on the Earth's surface in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a point, rejecting coordinates that are out of range.
    pub fn new(latitude: f64, longitude: f64) -> ReliefResult<Self> {
        let pnt = GeoPoint {
            latitude,
            longitude,
        };
        pnt.validate()?;
        Ok(pnt)
    }

    /// Check the latitude is in [-90, 90] and the longitude is in [-180, 180].
    pub fn validate(&self) -> ReliefResult<()> {
        let GeoPoint {
            latitude,
            longitude,
        } = *self;

        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ReliefError::invalid(format!(
                "latitude out of range (-90.0 to 90.0): {}",
                latitude
            )));
        }

        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ReliefError::invalid(format!(
                "longitude out of range (-180.0 to 180.0): {}",
                longitude
            )));
        }

        Ok(())
    }

    /// Great circle distance to another point in kilometers.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_km(*self, *other)
    }

    /// Arithmetic mean of the coordinates, or `None` for an empty iterator.
    pub fn mean<I: IntoIterator<Item = GeoPoint>>(points: I) -> Option<GeoPoint> {
        let (mut lat, mut lon, mut count) = (0.0, 0.0, 0usize);
        for pnt in points {
            lat += pnt.latitude;
            lon += pnt.longitude;
            count += 1;
        }

        if count == 0 {
            None
        } else {
            Some(GeoPoint {
                latitude: lat / count as f64,
                longitude: lon / count as f64,
            })
        }
    }
}

/**
 * The haversine great circle distance calculation.
 *
 * #Arguments
 * * a - the first point, degrees.
 * * b - the second point, degrees.
 *
 * #Returns
 * The distance between the points in kilometers.
 */
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    const DEG2RAD: f64 = 2.0 * std::f64::consts::PI / 360.0;

    let lat1_r = a.latitude * DEG2RAD;
    let lon1_r = a.longitude * DEG2RAD;
    let lat2_r = b.latitude * DEG2RAD;
    let lon2_r = b.longitude * DEG2RAD;

    // Absolute values and the grouped cosine product keep the result exactly symmetric.
    let dlat2 = (lat2_r - lat1_r).abs() / 2.0;
    let dlon2 = (lon2_r - lon1_r).abs() / 2.0;

    let sin2_dlat = f64::powf(f64::sin(dlat2), 2.0);
    let sin2_dlon = f64::powf(f64::sin(dlon2), 2.0);
    let cos_prod = f64::cos(lat1_r) * f64::cos(lat2_r);

    // Rounding can push this a hair past 1.0 for antipodal points, which asin doesn't like.
    let h = (sin2_dlat + sin2_dlon * cos_prod).min(1.0);

    let arc = 2.0 * f64::asin(f64::sqrt(h));

    arc * EARTH_RADIUS_KM
}

/**
 * Quantize a point to a grid cell identifier.
 *
 * The latitude and longitude are rounded to `precision` decimal places and formatted as
 * `cell_{lat}_{lon}`. The same point at the same precision always maps to the same id.
 */
pub fn grid_cell_id(p: GeoPoint, precision: u8) -> String {
    let precision = precision.min(MAX_GRID_PRECISION);
    let scale = 10f64.powi(i32::from(precision));

    let quantize = |val: f64| {
        let rounded = (val * scale).round() / scale;
        // Avoid a "-0.000" cell sitting next to the "0.000" cell.
        if rounded == 0.0 {
            0.0
        } else {
            rounded
        }
    };

    let prec = usize::from(precision);
    format!(
        "cell_{:.*}_{:.*}",
        prec,
        quantize(p.latitude),
        prec,
        quantize(p.longitude)
    )
}

/// A latitude / longitude aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// The lower left (southwest) corner.
    pub ll: GeoPoint,
    /// The upper right (northeast) corner.
    pub ur: GeoPoint,
}

impl BoundingBox {
    /// The smallest box containing all the points, `None` if there are none.
    pub fn enclosing<I: IntoIterator<Item = GeoPoint>>(points: I) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;

        let mut bbox = BoundingBox {
            ll: first,
            ur: first,
        };

        for pnt in points {
            bbox.ll.latitude = bbox.ll.latitude.min(pnt.latitude);
            bbox.ll.longitude = bbox.ll.longitude.min(pnt.longitude);
            bbox.ur.latitude = bbox.ur.latitude.max(pnt.latitude);
            bbox.ur.longitude = bbox.ur.longitude.max(pnt.longitude);
        }

        Some(bbox)
    }

    pub fn lat_span(&self) -> f64 {
        self.ur.latitude - self.ll.latitude
    }

    pub fn lon_span(&self) -> f64 {
        self.ur.longitude - self.ll.longitude
    }

    /// Area of the box using a flat 111 km per degree in both directions.
    ///
    /// This ignores the narrowing of longitude toward the poles. It is a rough estimate of how
    /// much ground a zone covers, not a survey.
    pub fn approx_area_km2(&self) -> f64 {
        self.lat_span() * self.lon_span() * KM_PER_DEGREE * KM_PER_DEGREE
    }

    pub fn contains(&self, pnt: GeoPoint) -> bool {
        pnt.latitude >= self.ll.latitude
            && pnt.latitude <= self.ur.latitude
            && pnt.longitude >= self.ll.longitude
            && pnt.longitude <= self.ur.longitude
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pt(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_haversine_known_distances() {
        // One degree of latitude along a meridian.
        let d = haversine_km(pt(0.0, 0.0), pt(1.0, 0.0));
        assert!((d - 111.194_926_6).abs() < 1.0e-3);

        // New York to Los Angeles is a bit under 4,000 km.
        let nyc = pt(40.7128, -74.0060);
        let la = pt(34.0522, -118.2437);
        let d = haversine_km(nyc, la);
        assert!((d - 3935.7).abs() < 5.0, "{}", d);

        // Antipodal points are half way around.
        let d = haversine_km(pt(0.0, 0.0), pt(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1.0e-6);
    }

    #[test]
    fn test_haversine_symmetric_and_zero() {
        let points = [
            pt(40.0, -74.0),
            pt(-33.8688, 151.2093),
            pt(89.9, 179.9),
            pt(-90.0, -180.0),
            pt(0.0, 0.0),
        ];

        for a in points.iter() {
            assert_eq!(haversine_km(*a, *a), 0.0);
            for b in points.iter() {
                assert_eq!(haversine_km(*a, *b), haversine_km(*b, *a));
            }
        }
    }

    #[test]
    fn test_haversine_triangle_inequality() {
        let points = [
            pt(40.0, -74.0),
            pt(41.5, -73.2),
            pt(34.0522, -118.2437),
            pt(-12.0, 45.0),
        ];

        for a in points.iter() {
            for b in points.iter() {
                for c in points.iter() {
                    let ab = haversine_km(*a, *b);
                    let bc = haversine_km(*b, *c);
                    let ac = haversine_km(*a, *c);
                    assert!(ac <= ab + bc + 1.0e-9);
                }
            }
        }
    }

    #[test]
    fn test_grid_cell_id() {
        let p = pt(40.712_845, -74.006_049);

        assert_eq!(grid_cell_id(p, 3), "cell_40.713_-74.006");
        assert_eq!(grid_cell_id(p, 3), grid_cell_id(p, 3));
        assert_eq!(grid_cell_id(p, 0), "cell_41_-74");

        // Neighbors in the same cell share an id.
        let q = pt(40.712_9, -74.005_9);
        assert_eq!(grid_cell_id(p, 3), grid_cell_id(q, 3));
        assert_ne!(grid_cell_id(p, 6), grid_cell_id(q, 6));

        // No negative zero cells.
        assert_eq!(grid_cell_id(pt(-0.0001, 0.0001), 2), "cell_0.00_0.00");
    }

    #[test]
    fn test_validation() {
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(-90.0, -180.0).is_ok());
        assert!(GeoPoint::new(90.01, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_bounding_box() {
        assert!(BoundingBox::enclosing(Vec::new()).is_none());

        let bbox = BoundingBox::enclosing([pt(40.0, -74.0), pt(40.01, -74.02), pt(39.99, -73.99)])
            .unwrap();

        assert!((bbox.lat_span() - 0.02).abs() < 1.0e-12);
        assert!((bbox.lon_span() - 0.03).abs() < 1.0e-12);
        assert!((bbox.approx_area_km2() - 0.02 * 0.03 * 111.0 * 111.0).abs() < 1.0e-9);
        assert!(bbox.contains(pt(40.0, -74.0)));
        assert!(!bbox.contains(pt(41.0, -74.0)));
    }
}
