//! Coordinate reference systems and planar projection of spherical meshes.
//!
//! The library works natively on the WGS84 sphere; this module defines the
//! [`Projection`] capability that maps between geographic longitude/latitude
//! and planar x/y, plus [`transform_mesh`], which projects a spherical mesh
//! into a planar one. A full cartographic library can implement
//! [`Projection`] to plug in any CRS; [`PlateCarree`] is the built-in
//! equidistant-cylindrical reference implementation.

use crate::algo::remesh::{self, SliceOptions};
use crate::coords::{self, ZLevel, RADIUS, WRAP_ATOL, WRAP_RTOL, ZLEVEL_SCALE};
use crate::error::{GeoError, Result};
use crate::mesh::Mesh;

/// WKT2 serialization of the WGS84 geographic CRS.
pub const WGS84_WKT: &str = r#"GEOGCRS["WGS 84",DATUM["World Geodetic System 1984",ELLIPSOID["WGS 84",6378137,298.257223563,LENGTHUNIT["metre",1]]],CS[ellipsoidal,2],AXIS["longitude",east],AXIS["latitude",north],ANGLEUNIT["degree",0.0174532925199433],ID["EPSG",4326]]"#;

/// Capability: a cartographic projection between WGS84 longitude/latitude
/// degrees and planar x/y coordinates.
///
/// `trap` controls domain failures: when `true`, coordinates that fall
/// outside the projection domain are an error; when `false`, they come back
/// as infinities for the caller to mask.
pub trait Projection: std::fmt::Debug {
    /// WKT serialization of the target CRS.
    fn wkt(&self) -> String;

    /// Whether the target CRS is geographic (projection is the identity).
    fn is_geographic(&self) -> bool;

    /// The central meridian, in degrees.
    fn central_meridian(&self) -> f64;

    /// Project longitude/latitude degrees to planar x/y.
    fn project(&self, lons: &[f64], lats: &[f64], trap: bool) -> Result<(Vec<f64>, Vec<f64>)>;

    /// Invert planar x/y back to longitude/latitude degrees.
    fn unproject(&self, xs: &[f64], ys: &[f64], trap: bool) -> Result<(Vec<f64>, Vec<f64>)>;
}

/// Apply the `trap` policy to projected coordinate arrays.
///
/// Helper for [`Projection`] implementations: errors out or substitutes
/// infinities when any coordinate is non-finite.
pub fn apply_trap(xs: Vec<f64>, ys: Vec<f64>, trap: bool) -> Result<(Vec<f64>, Vec<f64>)> {
    let bad = xs
        .iter()
        .chain(ys.iter())
        .filter(|value| !value.is_finite())
        .count();
    if bad == 0 {
        return Ok((xs, ys));
    }
    if trap {
        return Err(GeoError::Projection {
            message: format!("{bad} coordinates fell outside the projection domain"),
        });
    }
    let mask = |values: Vec<f64>| {
        values
            .into_iter()
            .map(|value| if value.is_finite() { value } else { f64::INFINITY })
            .collect()
    };
    Ok((mask(xs), mask(ys)))
}

/// The identity projection: WGS84 in, WGS84 out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wgs84;

impl Projection for Wgs84 {
    fn wkt(&self) -> String {
        WGS84_WKT.to_string()
    }

    fn is_geographic(&self) -> bool {
        true
    }

    fn central_meridian(&self) -> f64 {
        0.0
    }

    fn project(&self, lons: &[f64], lats: &[f64], _trap: bool) -> Result<(Vec<f64>, Vec<f64>)> {
        Ok((lons.to_vec(), lats.to_vec()))
    }

    fn unproject(&self, xs: &[f64], ys: &[f64], _trap: bool) -> Result<(Vec<f64>, Vec<f64>)> {
        Ok((xs.to_vec(), ys.to_vec()))
    }
}

/// Equidistant cylindrical (plate carree) projection on the sphere.
///
/// `x = R * radians(lon - central_meridian)`, `y = R * radians(lat)`.
#[derive(Debug, Clone, Copy)]
pub struct PlateCarree {
    /// Central meridian, in degrees.
    pub central_meridian: f64,
    /// Sphere radius scaling the planar coordinates.
    pub radius: f64,
}

impl Default for PlateCarree {
    fn default() -> Self {
        Self {
            central_meridian: 0.0,
            radius: RADIUS,
        }
    }
}

impl PlateCarree {
    /// Create a projection centred on the given meridian.
    pub fn new(central_meridian: f64, radius: f64) -> Self {
        Self {
            central_meridian,
            radius,
        }
    }
}

impl Projection for PlateCarree {
    fn wkt(&self) -> String {
        format!(
            r#"PROJCRS["Plate Carree",BASEGEOGCRS["WGS 84",ID["EPSG",4326]],CONVERSION["Equidistant Cylindrical",METHOD["Equidistant Cylindrical (Spherical)",ID["EPSG",1029]],PARAMETER["Longitude of natural origin",{},ID["EPSG",8802]]],CS[Cartesian,2]]"#,
            self.central_meridian
        )
    }

    fn is_geographic(&self) -> bool {
        false
    }

    fn central_meridian(&self) -> f64 {
        self.central_meridian
    }

    fn project(&self, lons: &[f64], lats: &[f64], trap: bool) -> Result<(Vec<f64>, Vec<f64>)> {
        let xs = lons
            .iter()
            .map(|&lon| {
                // Both closed-interval seam values survive: -180 maps to the
                // west edge of the plane and +180 to the east edge.
                let mut delta = lon - self.central_meridian;
                if !(-180.0..=180.0).contains(&delta) {
                    delta = (delta + 180.0).rem_euclid(360.0) - 180.0;
                }
                self.radius * delta.to_radians()
            })
            .collect();
        let ys = lats.iter().map(|&lat| self.radius * lat.to_radians()).collect();
        apply_trap(xs, ys, trap)
    }

    fn unproject(&self, xs: &[f64], ys: &[f64], trap: bool) -> Result<(Vec<f64>, Vec<f64>)> {
        let lons = xs
            .iter()
            .map(|&x| (x / self.radius).to_degrees() + self.central_meridian)
            .collect();
        let lats = ys.iter().map(|&y| (y / self.radius).to_degrees()).collect();
        apply_trap(lons, lats, trap)
    }
}

/// Options controlling [`transform_mesh`].
#[derive(Debug, Clone, Copy)]
pub struct TransformOptions {
    /// Split cells straddling the projection's seam meridian before
    /// projecting, so no cell spans the planar domain edge-to-edge.
    pub slice_connectivity: bool,
    /// Uniform vertical level for the planar z coordinate.
    pub zlevel: f64,
    /// Proportional vertical scale per level, applied to the planar extent.
    pub zscale: f64,
    /// Domain-failure policy passed to the projection.
    pub trap: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            slice_connectivity: true,
            zlevel: 0.0,
            zscale: ZLEVEL_SCALE,
            trap: true,
        }
    }
}

impl TransformOptions {
    /// Enable or disable seam slicing.
    pub fn with_slice_connectivity(mut self, slice: bool) -> Self {
        self.slice_connectivity = slice;
        self
    }

    /// Set the vertical level.
    pub fn with_zlevel(mut self, zlevel: f64) -> Self {
        self.zlevel = zlevel;
        self
    }

    /// Set the vertical scale.
    pub fn with_zscale(mut self, zscale: f64) -> Self {
        self.zscale = zscale;
        self
    }

    /// Set the domain-failure policy.
    pub fn with_trap(mut self, trap: bool) -> Self {
        self.trap = trap;
        self
    }
}

/// Whether a mesh's recorded CRS is geographic (or absent).
fn is_geographic_mesh(mesh: &Mesh) -> bool {
    mesh.field
        .crs_wkt
        .as_deref()
        .map_or(true, |wkt| wkt == WGS84_WKT)
}

/// Rebuild a projected mesh on the WGS84 sphere.
///
/// The mesh's planar x/y coordinates are inverted through `projection`,
/// wrapped, and placed on the unit sphere; connectivity, attributes, and
/// cell order are untouched, so indices remain valid across the conversion.
///
/// # Errors
/// Returns an error if the inversion fails.
pub fn to_geographic(mesh: &Mesh, projection: &dyn Projection) -> Result<Mesh> {
    if is_geographic_mesh(mesh) {
        return Ok(mesh.clone());
    }
    let xs: Vec<f64> = mesh.points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = mesh.points.iter().map(|p| p.y).collect();
    let (raw_lons, lats) = projection.unproject(&xs, &ys, true)?;
    let mut lons = coords::wrap(&raw_lons);
    for (lon, &lat) in lons.iter_mut().zip(lats.iter()) {
        if coords::close(lat.abs(), 90.0, WRAP_RTOL, WRAP_ATOL) {
            *lon = 0.0;
        }
    }

    let mut out = mesh.clone();
    out.points = coords::to_cartesian(&lons, &lats, RADIUS, ZLevel::default(), 0.0)?;
    out.field.crs_wkt = Some(WGS84_WKT.to_string());
    out.field.radius = Some(RADIUS);
    out.field.zscale = None;
    Ok(out)
}

/// Project a spherical mesh into the planar coordinates of the target CRS.
///
/// Cells straddling the target's seam meridian (the antipode of its central
/// meridian) are split first, so the planar mesh has a clean edge on both
/// sides of the domain. The planar z coordinate stratifies vertical levels
/// proportionally to the planar extent's diagonal; point clouds carrying a
/// recorded radius and z-scale keep their per-point levels.
///
/// A mesh already expressed in the target CRS is returned unchanged.
///
/// # Errors
/// Returns an error if the mesh is projected in a different CRS, or if the
/// projection itself fails.
pub fn transform_mesh(
    mesh: &Mesh,
    projection: &dyn Projection,
    options: &TransformOptions,
) -> Result<Mesh> {
    let target_wkt = projection.wkt();
    if mesh.field.crs_wkt.as_deref() == Some(target_wkt.as_str()) {
        return Ok(mesh.clone());
    }
    if !is_geographic_mesh(mesh) {
        return Err(GeoError::ProjectedMesh {
            crs: mesh.field.crs_wkt.clone().unwrap_or_default(),
            operation: "transform_mesh",
        });
    }
    if projection.is_geographic() {
        let mut out = mesh.clone();
        out.field.crs_wkt = Some(target_wkt);
        return Ok(out);
    }

    let seam = coords::wrap_value(
        projection.central_meridian() + 180.0,
        &coords::WrapOptions::default(),
    );
    let working = if options.slice_connectivity && mesh.n_cells() > 0 {
        remesh::slice_cells(mesh, seam, &SliceOptions::default())?
    } else {
        mesh.clone()
    };

    // Closed-interval recovery keeps the seam's east side at +180, so the
    // two halves of a sliced cell project to opposite edges of the plane.
    let (mut lons, lats) = working.point_lonlats(true);
    if !working.is_point_cloud() {
        resolve_seam_sides(&mut lons, &working, projection.central_meridian());
    }
    let (xs, ys) = projection.project(&lons, &lats, options.trap)?;

    let diagonal = planar_diagonal(&xs, &ys);
    let zs: Vec<f64> = if working.is_point_cloud() {
        match (working.field.radius, working.field.zscale) {
            (Some(radius), Some(recorded)) if recorded != 0.0 && radius > 0.0 => working
                .points
                .iter()
                .map(|p| {
                    let level = (p.coords.norm() - radius) / (radius * recorded);
                    level * options.zscale * diagonal
                })
                .collect(),
            _ => vec![options.zlevel * options.zscale * diagonal; working.n_points()],
        }
    } else {
        vec![options.zlevel * options.zscale * diagonal; working.n_points()]
    };

    let mut out = working;
    out.points = xs
        .iter()
        .zip(ys.iter())
        .zip(zs.iter())
        .map(|((&x, &y), &z)| nalgebra::Point3::new(x, y, z))
        .collect();
    out.field.crs_wkt = Some(target_wkt);
    out.field.radius = None;
    out.field.zscale = None;
    Ok(out)
}

/// Pin seam-point longitudes to the planar edge their cells lie on.
///
/// A point on the seam's great-circle plane recovers an arbitrary seam sign
/// from `atan2`, since its transverse coordinate is pure rounding noise.
/// After slicing, each seam point belongs to cells of exactly one side, so
/// the mean longitude offset of its cells' off-seam vertices decides the
/// edge: west-side cells pull their seam points to `central + 180` (the
/// east edge of the plane) and east-side cells to `central - 180`.
fn resolve_seam_sides(lons: &mut [f64], mesh: &Mesh, central_meridian: f64) {
    let seam = central_meridian + 180.0;
    let tolerance = WRAP_ATOL + WRAP_RTOL * 180.0;
    let delta = |lon: f64| (lon - seam + 180.0).rem_euclid(360.0) - 180.0;

    let mut votes = vec![0.0f64; lons.len()];
    for face in mesh.connectivity.iter() {
        let deltas: Vec<f64> = face.iter().map(|&v| delta(lons[v])).collect();
        let off_seam: Vec<f64> = deltas
            .iter()
            .copied()
            .filter(|d| d.abs() > tolerance)
            .collect();
        if off_seam.is_empty() {
            continue;
        }
        let mean = off_seam.iter().sum::<f64>() / off_seam.len() as f64;
        for (k, &v) in face.iter().enumerate() {
            if deltas[k].abs() <= tolerance {
                votes[v] += mean;
            }
        }
    }
    for (v, lon) in lons.iter_mut().enumerate() {
        if votes[v] != 0.0 && delta(*lon).abs() <= tolerance {
            *lon = if votes[v] < 0.0 {
                central_meridian + 180.0
            } else {
                central_meridian - 180.0
            };
        }
    }
}

/// Diagonal of the finite planar extent; zero when nothing is finite.
fn planar_diagonal(xs: &[f64], ys: &[f64]) -> f64 {
    let extent = |values: &[f64]| {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &value in values {
            if value.is_finite() {
                min = min.min(value);
                max = max.max(value);
            }
        }
        if min <= max {
            max - min
        } else {
            0.0
        }
    };
    let dx = extent(xs);
    let dy = extent(ys);
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{from_1d, from_points, Bounds1d, BridgeOptions};
    use crate::coords::ZLevel;

    fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
        let step = (stop - start) / (n - 1) as f64;
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_plate_carree_roundtrip() {
        let projection = PlateCarree::default();
        let lons = [-170.0, -45.0, 0.0, 60.0, 179.0];
        let lats = [-80.0, -30.0, 0.0, 45.0, 85.0];
        let (xs, ys) = projection.project(&lons, &lats, true).unwrap();
        let (out_lons, out_lats) = projection.unproject(&xs, &ys, true).unwrap();
        for i in 0..lons.len() {
            assert!((out_lons[i] - lons[i]).abs() < 1e-9);
            assert!((out_lats[i] - lats[i]).abs() < 1e-9);
        }
        // x spans the full domain at the seam.
        let (edge, _) = projection.project(&[180.0], &[0.0], true).unwrap();
        assert!((edge[0] - std::f64::consts::PI).abs() < 1e-9);
    }

    #[test]
    fn test_plate_carree_central_meridian() {
        let projection = PlateCarree::new(90.0, 1.0);
        let (xs, _) = projection.project(&[90.0, 100.0], &[0.0, 0.0], true).unwrap();
        assert!(xs[0].abs() < 1e-12);
        assert!((xs[1] - 10f64.to_radians()).abs() < 1e-12);
        // Longitudes wrap relative to the centre: -175 sits east of +90.
        let (xs, _) = projection.project(&[-175.0], &[0.0], true).unwrap();
        assert!((xs[0] - 95f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_apply_trap_policy() {
        let result = apply_trap(vec![0.0, f64::NAN], vec![0.0, 0.0], true);
        assert!(matches!(result, Err(GeoError::Projection { .. })));

        let (xs, _) = apply_trap(vec![0.0, f64::NAN], vec![0.0, 0.0], false).unwrap();
        assert_eq!(xs[1], f64::INFINITY);
    }

    #[test]
    fn test_transform_mesh_is_noop_for_same_crs() {
        let projection = PlateCarree::default();
        let lons = linspace(-60.0, 60.0, 4);
        let lats = linspace(-30.0, 30.0, 3);
        let mesh = from_1d(
            Bounds1d::Contiguous(&lons),
            Bounds1d::Contiguous(&lats),
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        let planar = transform_mesh(&mesh, &projection, &TransformOptions::default()).unwrap();
        let again = transform_mesh(&planar, &projection, &TransformOptions::default()).unwrap();
        assert_eq!(planar.points, again.points);
        assert_eq!(planar.n_cells(), again.n_cells());
    }

    #[test]
    fn test_transform_mesh_rejects_foreign_projected_mesh() {
        let lons = linspace(-60.0, 60.0, 4);
        let lats = linspace(-30.0, 30.0, 3);
        let mut mesh = from_1d(
            Bounds1d::Contiguous(&lons),
            Bounds1d::Contiguous(&lats),
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        mesh.field.crs_wkt = Some("PROJCRS[\"other\"]".to_string());
        let result = transform_mesh(&mesh, &PlateCarree::default(), &TransformOptions::default());
        assert!(matches!(result, Err(GeoError::ProjectedMesh { .. })));
    }

    #[test]
    fn test_transform_mesh_geographic_target_is_identity() {
        let lons = linspace(-60.0, 60.0, 4);
        let lats = linspace(-30.0, 30.0, 3);
        let mesh = from_1d(
            Bounds1d::Contiguous(&lons),
            Bounds1d::Contiguous(&lats),
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        let out = transform_mesh(&mesh, &Wgs84, &TransformOptions::default()).unwrap();
        assert_eq!(out.points, mesh.points);
        assert_eq!(out.field.crs_wkt.as_deref(), Some(WGS84_WKT));
    }

    #[test]
    fn test_transform_mesh_slices_seam_cells() {
        // The last column of cells spans 120..210, straddling the seam.
        let lons = [-150.0, -60.0, 30.0, 120.0, 210.0];
        let lats = [-30.0, 0.0, 30.0];
        let mesh = from_1d(
            Bounds1d::Contiguous(&lons),
            Bounds1d::Contiguous(&lats),
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        let planar =
            transform_mesh(&mesh, &PlateCarree::default(), &TransformOptions::default()).unwrap();
        assert!(planar.n_cells() > mesh.n_cells());
        // Every planar x lies within the projection domain.
        let bound = std::f64::consts::PI + 1e-9;
        for point in &planar.points {
            assert!(point.x.abs() <= bound, "x = {} out of domain", point.x);
        }
        // No planar cell spans more than half the domain.
        for i in 0..planar.n_cells() {
            let face = planar.face(i);
            let min = face.iter().map(|&v| planar.points[v].x).fold(f64::INFINITY, f64::min);
            let max = face
                .iter()
                .map(|&v| planar.points[v].x)
                .fold(f64::NEG_INFINITY, f64::max);
            assert!(max - min < std::f64::consts::PI);
        }
        assert!(planar.field.radius.is_none());
    }

    #[test]
    fn test_transform_mesh_point_cloud_stratifies_levels() {
        let levels = [0.0, 5.0, 10.0];
        let cloud = from_points(
            &[0.0, 10.0, 20.0],
            &[0.0, 5.0, 10.0],
            ZLevel::PerPoint(&levels),
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        let planar =
            transform_mesh(&cloud, &PlateCarree::default(), &TransformOptions::default()).unwrap();
        assert!(planar.points[0].z.abs() < 1e-12);
        assert!(planar.points[1].z > 0.0);
        assert!(planar.points[2].z > planar.points[1].z);
    }

    #[test]
    fn test_to_geographic_roundtrip() {
        let projection = PlateCarree::default();
        let lons = linspace(-60.0, 60.0, 4);
        let lats = linspace(-30.0, 30.0, 3);
        let mesh = from_1d(
            Bounds1d::Contiguous(&lons),
            Bounds1d::Contiguous(&lats),
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        let planar = transform_mesh(&mesh, &projection, &TransformOptions::default()).unwrap();
        let back = to_geographic(&planar, &projection).unwrap();
        let (orig_lons, orig_lats) = mesh.point_lonlats(false);
        let (out_lons, out_lats) = back.point_lonlats(false);
        for i in 0..orig_lons.len() {
            assert!((out_lons[i] - orig_lons[i]).abs() < 1e-9);
            assert!((out_lats[i] - orig_lats[i]).abs() < 1e-9);
        }
        assert_eq!(back.n_cells(), mesh.n_cells());
    }
}
