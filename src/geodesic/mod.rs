//! Geodesic interpolation and bounding-box region queries.
//!
//! This module provides:
//!
//! - [`GeodesicInterpolator`]: the geodesic capability consumed by the
//!   bounding-box layer, with a spherical great-circle default
//! - [`BBox`]: a closed 3-D manifold built from a geodesic quadrilateral,
//!   used for robust interior/exterior point and cell classification
//! - [`panel`]: cubed-sphere panel convenience constructors
//!
//! An ellipsoid-aware geodesic library can supply its own
//! [`GeodesicInterpolator`] implementation; nothing in the core requires
//! one beyond the spherical default.

mod bbox;

pub use bbox::{
    panel, BBox, Containment, EnclosedOptions, Panel, Preference, BBOX_C, BBOX_RADIUS_RATIO,
    ENCLOSED_TOLERANCE,
};

use nalgebra::Vector3;

use crate::coords::RADIUS;

/// A reference ellipsoid, reduced to its semi-major radius on the sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major radius.
    pub semimajor: f64,
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self { semimajor: RADIUS }
    }
}

/// Capability: equally spaced points along the geodesic between two
/// longitude/latitude positions.
pub trait GeodesicInterpolator: std::fmt::Debug {
    /// Return `n` points (including both endpoints, so `n` is clamped to a
    /// minimum of 2) along the geodesic from `start` to `end`, as
    /// (longitude, latitude) degrees.
    fn npoints(&self, start: (f64, f64), end: (f64, f64), n: usize) -> Vec<(f64, f64)>;
}

/// Great-circle interpolation on the sphere (slerp between unit vectors).
#[derive(Debug, Clone, Copy, Default)]
pub struct SphericalGeodesic;

fn unit_vector(lon: f64, lat: f64) -> Vector3<f64> {
    let (lon, lat) = (lon.to_radians(), lat.to_radians());
    Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

fn lonlat_of(v: &Vector3<f64>) -> (f64, f64) {
    let lon = v.y.atan2(v.x).to_degrees();
    let lat = (v.z / v.norm()).clamp(-1.0, 1.0).asin().to_degrees();
    (lon, lat)
}

impl GeodesicInterpolator for SphericalGeodesic {
    fn npoints(&self, start: (f64, f64), end: (f64, f64), n: usize) -> Vec<(f64, f64)> {
        let n = n.max(2);
        let a = unit_vector(start.0, start.1);
        let b = unit_vector(end.0, end.1);
        let angle = a.dot(&b).clamp(-1.0, 1.0).acos();
        let sin_angle = angle.sin();

        (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1) as f64;
                if sin_angle < 1e-12 {
                    // Coincident endpoints; chord interpolation degenerates
                    // to the endpoints themselves.
                    if t < 0.5 {
                        start
                    } else {
                        end
                    }
                } else {
                    let v = a * ((1.0 - t) * angle).sin() / sin_angle
                        + b * (t * angle).sin() / sin_angle;
                    lonlat_of(&v)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npoints_endpoints() {
        let geodesic = SphericalGeodesic;
        let points = geodesic.npoints((0.0, 0.0), (90.0, 0.0), 5);
        assert_eq!(points.len(), 5);
        assert!((points[0].0 - 0.0).abs() < 1e-9);
        assert!((points[4].0 - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_npoints_clamps_short_counts() {
        let geodesic = SphericalGeodesic;
        for n in [0, 1] {
            let points = geodesic.npoints((0.0, 0.0), (90.0, 0.0), n);
            assert_eq!(points.len(), 2);
            assert!(points.iter().all(|(lon, lat)| lon.is_finite() && lat.is_finite()));
        }
    }

    #[test]
    fn test_npoints_equator_spacing() {
        let geodesic = SphericalGeodesic;
        let points = geodesic.npoints((0.0, 0.0), (90.0, 0.0), 4);
        for (i, (lon, lat)) in points.iter().enumerate() {
            assert!((lon - 30.0 * i as f64).abs() < 1e-9);
            assert!(lat.abs() < 1e-9);
        }
    }

    #[test]
    fn test_npoints_meridian() {
        let geodesic = SphericalGeodesic;
        let points = geodesic.npoints((10.0, -45.0), (10.0, 45.0), 3);
        assert!((points[1].0 - 10.0).abs() < 1e-9);
        assert!(points[1].1.abs() < 1e-9);
    }

    #[test]
    fn test_npoints_great_circle_sag() {
        // Between two mid-latitude points the geodesic runs poleward of the
        // parallel joining them.
        let geodesic = SphericalGeodesic;
        let points = geodesic.npoints((-60.0, 45.0), (60.0, 45.0), 3);
        assert!(points[1].1 > 45.0);
    }
}
