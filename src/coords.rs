//! Geographic/Cartesian coordinate conversion on the sphere.
//!
//! This module provides the numeric foundation of the library: conversion
//! between geographic coordinates (longitude/latitude in degrees) and
//! Cartesian coordinates on a sphere of a given radius, plus canonicalization
//! of longitude values into a half-open wrap interval.
//!
//! The wrap tolerances are load-bearing: the antimeridian remesh engine
//! relies on two numerically-almost-equal seam longitudes (e.g. `179.999999`
//! and `-180.0`) canonicalizing to the same value, otherwise cells that
//! should be whole are fractured at the seam.

use nalgebra::Point3;

use crate::error::{GeoError, Result};

/// Default sphere radius (unit sphere).
pub const RADIUS: f64 = 1.0;

/// Lower bound of the canonical longitude interval, in degrees.
pub const BASE: f64 = -180.0;

/// Width of the canonical longitude interval, in degrees.
pub const PERIOD: f64 = 360.0;

/// Default relative tolerance for longitude comparisons.
pub const WRAP_RTOL: f64 = 1e-5;

/// Default absolute tolerance for longitude comparisons.
pub const WRAP_ATOL: f64 = 1e-8;

/// Default proportional scale applied per vertical level.
///
/// A point at `zlevel` sits at an effective radius of
/// `radius * (1 + zlevel * ZLEVEL_SCALE)`.
pub const ZLEVEL_SCALE: f64 = 1e-4;

/// Relative closeness test in the style of `a ≈ b` with combined tolerances.
#[inline]
pub(crate) fn close(a: f64, b: f64, rtol: f64, atol: f64) -> bool {
    (a - b).abs() <= atol + rtol * b.abs()
}

/// Options controlling [`wrap_with`].
#[derive(Debug, Clone, Copy)]
pub struct WrapOptions {
    /// Lower bound of the target interval.
    pub base: f64,
    /// Width of the target interval.
    pub period: f64,
    /// Relative tolerance for the upper-boundary snap.
    pub rtol: f64,
    /// Absolute tolerance for the upper-boundary snap.
    pub atol: f64,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            base: BASE,
            period: PERIOD,
            rtol: WRAP_RTOL,
            atol: WRAP_ATOL,
        }
    }
}

impl WrapOptions {
    /// Set the lower bound of the target interval.
    pub fn with_base(mut self, base: f64) -> Self {
        self.base = base;
        self
    }

    /// Set the interval width.
    pub fn with_period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    /// Set the snap tolerances.
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }
}

/// Wrap a single longitude into `[base, base + period)`.
///
/// Values within tolerance of the upper boundary are snapped down to `base`,
/// so `179.999999999` and `-180.0` canonicalize to the same longitude.
pub fn wrap_value(lon: f64, options: &WrapOptions) -> f64 {
    let upper = options.base + options.period;
    let wrapped = (lon - options.base).rem_euclid(options.period) + options.base;
    if close(wrapped, upper, options.rtol, options.atol) {
        options.base
    } else {
        wrapped
    }
}

/// Wrap longitudes into `[base, base + period)` with the given options.
pub fn wrap_with(lons: &[f64], options: &WrapOptions) -> Vec<f64> {
    lons.iter().map(|&lon| wrap_value(lon, options)).collect()
}

/// Wrap longitudes into the canonical interval `[-180, 180)`.
///
/// # Example
/// ```
/// use cartomesh::coords::wrap;
///
/// let lons = wrap(&[0.0, 180.0, 360.0, -540.0]);
/// assert_eq!(lons, vec![0.0, -180.0, 0.0, -180.0]);
/// ```
pub fn wrap(lons: &[f64]) -> Vec<f64> {
    wrap_with(lons, &WrapOptions::default())
}

/// A vertical level offset, either uniform or per point.
///
/// Levels broadcast against the coordinate arrays: a surface mesh uses a
/// uniform level, while a point cloud may carry one level per point.
#[derive(Debug, Clone, Copy)]
pub enum ZLevel<'a> {
    /// The same level for every point.
    Uniform(f64),
    /// One level per point; the slice length must match the coordinates.
    PerPoint(&'a [f64]),
}

impl Default for ZLevel<'_> {
    fn default() -> Self {
        ZLevel::Uniform(0.0)
    }
}

/// Convert geographic coordinates to Cartesian points on a sphere.
///
/// The effective radius of each point is `radius * (1 + zlevel * zscale)`,
/// which encodes vertical levels (e.g. atmospheric layers) as proportional
/// radial offsets. Uses the standard spherical formula with colatitude
/// `90° - lat`.
///
/// # Errors
/// Returns an error if `lons` and `lats` differ in length, or if a per-point
/// `zlevel` cannot broadcast against them.
///
/// # Example
/// ```
/// use cartomesh::coords::{to_cartesian, ZLevel};
///
/// let points = to_cartesian(&[0.0], &[0.0], 1.0, ZLevel::Uniform(0.0), 0.0).unwrap();
/// assert!((points[0].x - 1.0).abs() < 1e-12);
/// ```
pub fn to_cartesian(
    lons: &[f64],
    lats: &[f64],
    radius: f64,
    zlevel: ZLevel<'_>,
    zscale: f64,
) -> Result<Vec<Point3<f64>>> {
    if lons.len() != lats.len() {
        return Err(GeoError::ShapeMismatch {
            context: "lons/lats",
            expected: format!("{} longitudes", lats.len()),
            actual: format!("{} longitudes", lons.len()),
        });
    }
    if let ZLevel::PerPoint(levels) = zlevel {
        if levels.len() != lons.len() {
            return Err(GeoError::Broadcast {
                name: "zlevel",
                length: levels.len(),
                n_points: lons.len(),
            });
        }
    }

    let points = lons
        .iter()
        .zip(lats.iter())
        .enumerate()
        .map(|(i, (&lon, &lat))| {
            let level = match zlevel {
                ZLevel::Uniform(level) => level,
                ZLevel::PerPoint(levels) => levels[i],
            };
            let r = radius + radius * level * zscale;
            let colat = (90.0 - lat).to_radians();
            let lon = lon.to_radians();
            Point3::new(
                r * colat.sin() * lon.cos(),
                r * colat.sin() * lon.sin(),
                r * colat.cos(),
            )
        })
        .collect();

    Ok(points)
}

/// Options controlling [`to_lonlat`].
#[derive(Debug, Clone, Copy)]
pub struct LonLatOptions {
    /// Sphere radius; when `None`, each point's own distance from the origin
    /// is used (point clouds with varying distance).
    pub radius: Option<f64>,
    /// Keep seam longitudes as `180` instead of wrapping them to `-180`.
    pub closed_interval: bool,
    /// Relative tolerance for seam/pole detection.
    pub rtol: f64,
    /// Absolute tolerance for seam/pole detection.
    pub atol: f64,
}

impl Default for LonLatOptions {
    fn default() -> Self {
        Self {
            radius: None,
            closed_interval: false,
            rtol: WRAP_RTOL,
            atol: WRAP_ATOL,
        }
    }
}

impl LonLatOptions {
    /// Set a fixed sphere radius.
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    /// Honor the closed interval `[-180, 180]` at the seam.
    pub fn with_closed_interval(mut self, closed: bool) -> Self {
        self.closed_interval = closed;
        self
    }
}

/// Convert Cartesian points back to geographic (longitude, latitude) degrees.
///
/// Longitude is `atan2(y, x)` wrapped into the canonical interval; latitude
/// is `asin(clamp(z / r, -1, 1))`. The clamp guards against floating-point
/// values marginally outside `[-1, 1]` produced by prior transforms.
///
/// Pole handling is provisional and preserved as-is: any point within
/// tolerance of a pole has its longitude collapsed to `0` to avoid an
/// arbitrary meridian choice at a true singularity, except for the special
/// case of exactly two points forming a polar line, where the polar point
/// unfolds to the longitude of its partner.
pub fn to_lonlat(points: &[Point3<f64>], options: &LonLatOptions) -> (Vec<f64>, Vec<f64>) {
    let wrap_options = WrapOptions::default().with_tolerances(options.rtol, options.atol);
    let mut lons = Vec::with_capacity(points.len());
    let mut lats = Vec::with_capacity(points.len());

    for point in points {
        let r = options
            .radius
            .unwrap_or_else(|| point.coords.norm())
            .max(f64::MIN_POSITIVE);
        let raw = point.y.atan2(point.x).to_degrees();
        let mut lon = wrap_value(raw, &wrap_options);
        if options.closed_interval && lon == BASE && raw > 0.0 {
            // The seam point was computed as +180; retain it.
            lon = BASE + PERIOD;
        }
        let lat = (point.z / r).clamp(-1.0, 1.0).asin().to_degrees();
        if close(lat.abs(), 90.0, options.rtol, options.atol) {
            lon = 0.0;
        }
        lons.push(lon);
        lats.push(lat);
    }

    // Unfold a 2-point polar line: the polar point takes its partner's
    // longitude rather than the collapsed 0.
    if points.len() == 2 {
        let polar = [
            close(lats[0].abs(), 90.0, options.rtol, options.atol),
            close(lats[1].abs(), 90.0, options.rtol, options.atol),
        ];
        if polar[0] && !polar[1] {
            lons[0] = lons[1];
        } else if polar[1] && !polar[0] {
            lons[1] = lons[0];
        }
    }

    (lons, lats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_range() {
        for &lon in &[-720.0, -361.5, -180.0, -0.1, 0.0, 90.0, 179.5, 180.0, 359.9, 1234.5] {
            let w = wrap(&[lon])[0];
            assert!(w >= BASE && w < BASE + PERIOD, "wrap({lon}) = {w} out of range");
        }
    }

    #[test]
    fn test_wrap_idempotent() {
        let input = [-540.0, -180.0, -90.0, 0.0, 45.0, 179.9999, 180.0, 360.0];
        let once = wrap(&input);
        let twice = wrap(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_wrap_boundary_snap() {
        // Values within tolerance of +180 canonicalize to -180, exactly.
        let w = wrap(&[179.999999999, -180.0, 180.0]);
        assert_eq!(w[0], -180.0);
        assert_eq!(w[1], -180.0);
        assert_eq!(w[2], -180.0);
    }

    #[test]
    fn test_wrap_custom_base() {
        let options = WrapOptions::default().with_base(0.0);
        assert_eq!(wrap_value(-90.0, &options), 270.0);
        assert_eq!(wrap_value(360.0, &options), 0.0);
    }

    #[test]
    fn test_to_cartesian_axes() {
        let points = to_cartesian(
            &[0.0, 90.0, 0.0],
            &[0.0, 0.0, 90.0],
            1.0,
            ZLevel::default(),
            0.0,
        )
        .unwrap();
        assert!((points[0] - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
        assert!((points[1] - Point3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
        assert!((points[2] - Point3::new(0.0, 0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_to_cartesian_zlevel_offsets_radius() {
        let points =
            to_cartesian(&[0.0], &[0.0], 2.0, ZLevel::Uniform(10.0), ZLEVEL_SCALE).unwrap();
        let expected = 2.0 * (1.0 + 10.0 * ZLEVEL_SCALE);
        assert!((points[0].coords.norm() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_to_cartesian_shape_mismatch() {
        let result = to_cartesian(&[0.0, 1.0], &[0.0], 1.0, ZLevel::default(), 0.0);
        assert!(result.is_err());

        let levels = [0.0; 3];
        let result = to_cartesian(&[0.0], &[0.0], 1.0, ZLevel::PerPoint(&levels), 0.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_roundtrip() {
        let lons = [-180.0, -135.0, -45.0, 0.0, 60.0, 120.0, 179.0];
        let lats = [-80.0, -45.0, -10.0, 0.0, 30.0, 60.0, 85.0];
        for &radius in &[0.5, 1.0, 6371.0] {
            let points =
                to_cartesian(&lons, &lats, radius, ZLevel::default(), 0.0).unwrap();
            let (out_lons, out_lats) =
                to_lonlat(&points, &LonLatOptions::default().with_radius(radius));
            for i in 0..lons.len() {
                assert!(
                    (out_lons[i] - lons[i]).abs() < 1e-9,
                    "lon {} != {} at radius {radius}",
                    out_lons[i],
                    lons[i]
                );
                assert!((out_lats[i] - lats[i]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_to_lonlat_pole_collapses_longitude() {
        let points =
            to_cartesian(&[45.0, 45.0, 45.0], &[90.0, -90.0, 10.0], 1.0, ZLevel::default(), 0.0)
                .unwrap();
        let (lons, _) = to_lonlat(&points, &LonLatOptions::default());
        assert_eq!(lons[0], 0.0);
        assert_eq!(lons[1], 0.0);
        assert!((lons[2] - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_to_lonlat_polar_line_unfolds() {
        let points =
            to_cartesian(&[0.0, 30.0], &[90.0, 45.0], 1.0, ZLevel::default(), 0.0).unwrap();
        let (lons, _) = to_lonlat(&points, &LonLatOptions::default());
        // The polar point takes its partner's longitude.
        assert!((lons[0] - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_to_lonlat_closed_interval() {
        let points =
            to_cartesian(&[180.0, -180.0], &[10.0, -10.0], 1.0, ZLevel::default(), 0.0).unwrap();
        // atan2 recovers both seam points with |lon| == 180; the closed
        // interval keeps +180 where the raw angle was positive.
        let (lons, _) = to_lonlat(&points, &LonLatOptions::default().with_closed_interval(true));
        for lon in lons {
            assert!((lon.abs() - 180.0).abs() < 1e-9);
        }
        let points = vec![Point3::new(-1.0, 1e-12, 0.0)];
        let (lons, _) = to_lonlat(&points, &LonLatOptions::default().with_closed_interval(true));
        assert_eq!(lons[0], 180.0);
    }

    #[test]
    fn test_to_lonlat_per_point_radius() {
        // Points at different distances from the origin still recover their
        // latitude when no fixed radius is supplied.
        let inner = to_cartesian(&[10.0], &[20.0], 1.0, ZLevel::default(), 0.0).unwrap();
        let outer = to_cartesian(&[10.0], &[20.0], 3.0, ZLevel::default(), 0.0).unwrap();
        let points = vec![inner[0], outer[0]];
        let (lons, lats) = to_lonlat(&points, &LonLatOptions::default());
        for i in 0..2 {
            assert!((lons[i] - 10.0).abs() < 1e-9);
            assert!((lats[i] - 20.0).abs() < 1e-9);
        }
    }
}
