//! Geodesic bounding-box construction and region extraction.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::coords::{self, ZLevel, RADIUS, WRAP_ATOL, WRAP_RTOL};
use crate::crs::{self, Projection, WGS84_WKT};
use crate::error::{GeoError, Result};
use crate::geodesic::{Ellipsoid, GeodesicInterpolator, SphericalGeodesic};
use crate::mesh::{Connectivity, FieldMetadata, Mesh, MeshKind};

/// Default mesh resolution: each geodesic edge is sampled into `c` segments,
/// giving a `c x c` cell grid per offset surface.
pub const BBOX_C: usize = 256;

/// Proportional radial offset of the inner and outer surfaces.
///
/// The solid spans `radius * (1 - ratio)` to `radius * (1 + ratio)`, deep
/// enough to capture vertically offset layers of the same sphere.
pub const BBOX_RADIUS_RATIO: f64 = 0.15;

/// Default boundary tolerance for [`BBox::enclosed`], as a fraction of the
/// solid's bounding-box diagonal.
pub const ENCLOSED_TOLERANCE: f64 = 1e-6;

/// Rays closer to a triangle's plane than this are treated as parallel.
const RAY_PARALLEL_EPS: f64 = 1e-14;

/// Barycentric slack for triangle containment along a ray.
const RAY_BARY_EPS: f64 = 1e-12;

/// How a cell qualifies as enclosed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    /// Every vertex of the cell must be enclosed.
    Cell,
    /// The cell's vertex centroid must be enclosed.
    Center,
    /// At least one vertex of the cell must be enclosed.
    Point,
}

impl FromStr for Preference {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cell" => Ok(Preference::Cell),
            "center" => Ok(Preference::Center),
            "point" => Ok(Preference::Point),
            _ => Err(GeoError::invalid_param(
                "preference",
                s,
                "expected one of: cell, center, point",
            )),
        }
    }
}

/// Where a point sits relative to the closed bounding-box manifold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Strictly interior.
    Inside,
    /// Strictly exterior.
    Outside,
    /// On the manifold, within tolerance. Boundary points are selected by
    /// neither the inside nor the outside query.
    Boundary,
}

/// Options controlling [`BBox::enclosed`].
#[derive(Debug, Clone, Copy)]
pub struct EnclosedOptions<'a> {
    /// Select cells outside the box instead of inside.
    pub outside: bool,
    /// How a cell qualifies.
    pub preference: Preference,
    /// Boundary tolerance as a fraction of the solid's diagonal.
    pub tolerance: f64,
    /// Source projection of a projected surface; required to classify a
    /// mesh whose CRS is not WGS84.
    pub projection: Option<&'a dyn Projection>,
}

impl Default for EnclosedOptions<'_> {
    fn default() -> Self {
        Self {
            outside: false,
            preference: Preference::Center,
            tolerance: ENCLOSED_TOLERANCE,
            projection: None,
        }
    }
}

impl<'a> EnclosedOptions<'a> {
    /// Select the cells outside the box.
    pub fn with_outside(mut self, outside: bool) -> Self {
        self.outside = outside;
        self
    }

    /// Set the qualification preference.
    pub fn with_preference(mut self, preference: Preference) -> Self {
        self.preference = preference;
        self
    }

    /// Set the boundary tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Supply the source projection of a projected surface.
    pub fn with_projection(mut self, projection: &'a dyn Projection) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// A tessellated, watertight manifold generated at one radius.
struct Solid {
    mesh: Mesh,
    triangles: Vec<[Point3<f64>; 3]>,
    diagonal: f64,
}

impl Solid {
    fn classify(&self, point: &Point3<f64>, tolerance: f64) -> Containment {
        let norm = point.coords.norm();
        if norm < f64::MIN_POSITIVE {
            return Containment::Outside;
        }
        // Cast radially outward; the solid never contains the origin, so the
        // ray direction is well defined and crossing parity decides
        // interior/exterior.
        let direction = point.coords / norm;
        let mut crossings = 0usize;
        for triangle in &self.triangles {
            if let Some(t) = ray_triangle(point, &direction, triangle) {
                if t.abs() <= tolerance {
                    return Containment::Boundary;
                }
                if t > 0.0 {
                    crossings += 1;
                }
            }
        }
        if crossings % 2 == 1 {
            Containment::Inside
        } else {
            Containment::Outside
        }
    }
}

/// Moller-Trumbore ray/triangle intersection; returns the signed ray
/// parameter of the hit, if any.
fn ray_triangle(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    triangle: &[Point3<f64>; 3],
) -> Option<f64> {
    let e1 = triangle[1] - triangle[0];
    let e2 = triangle[2] - triangle[0];
    let p = direction.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < RAY_PARALLEL_EPS {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin - triangle[0];
    let u = s.dot(&p) * inv;
    if !(-RAY_BARY_EPS..=1.0 + RAY_BARY_EPS).contains(&u) {
        return None;
    }
    let q = s.cross(&e1);
    let v = direction.dot(&q) * inv;
    if v < -RAY_BARY_EPS || u + v > 1.0 + RAY_BARY_EPS {
        return None;
    }
    Some(e2.dot(&q) * inv)
}

/// A geodesic bounding box: four corners joined by great-circle arcs,
/// extruded radially into a closed manifold for region queries.
///
/// The manifold is generated lazily per query radius and cached, since the
/// tessellation at the default resolution is substantial.
///
/// # Example
/// ```
/// use cartomesh::geodesic::BBox;
///
/// let bbox = BBox::new(&[-45.0, 45.0, 45.0, -45.0], &[-45.0, -45.0, 45.0, 45.0]).unwrap();
/// assert_eq!(bbox.lons(), &[-45.0, 45.0, 45.0, -45.0]);
/// ```
#[derive(Debug)]
pub struct BBox {
    lons: Vec<f64>,
    lats: Vec<f64>,
    ellipsoid: Ellipsoid,
    c: usize,
    triangulate: bool,
    interpolator: Box<dyn GeodesicInterpolator + Send + Sync>,
    cache: HashMap<u64, Solid>,
}

impl std::fmt::Debug for Solid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solid")
            .field("n_points", &self.mesh.n_points())
            .field("n_cells", &self.mesh.n_cells())
            .field("diagonal", &self.diagonal)
            .finish()
    }
}

impl BBox {
    /// Create a bounding box from corner longitudes and latitudes, in
    /// degrees, ordered around the quadrilateral.
    ///
    /// Accepts 4 open corners or 5 closed corners; a closing corner is
    /// removed, with a warning if it does not match the first. Longitudes
    /// are wrapped into the canonical interval.
    ///
    /// # Errors
    /// Returns an error on mismatched array lengths, a corner count other
    /// than 4 or 5, or coincident consecutive corners.
    pub fn new(lons: &[f64], lats: &[f64]) -> Result<Self> {
        if lons.len() != lats.len() {
            return Err(GeoError::ShapeMismatch {
                context: "bbox corners",
                expected: format!("{} longitudes", lats.len()),
                actual: format!("{} longitudes", lons.len()),
            });
        }
        let mut lons = coords::wrap(lons);
        let mut lats = lats.to_vec();
        if lons.len() == 5 {
            let lon_match = coords::close(lons[4], lons[0], WRAP_RTOL, WRAP_ATOL);
            let lat_match = coords::close(lats[4], lats[0], WRAP_RTOL, WRAP_ATOL);
            if !lon_match || !lat_match {
                log::warn!(
                    "closing corner ({}, {}) differs from the first ({}, {}); dropping it",
                    lons[4],
                    lats[4],
                    lons[0],
                    lats[0]
                );
            }
            lons.pop();
            lats.pop();
        }
        if lons.len() != 4 {
            return Err(GeoError::CornerCount { count: lons.len() });
        }
        for i in 0..4 {
            let j = (i + 1) % 4;
            if coords::close(lons[i], lons[j], WRAP_RTOL, WRAP_ATOL)
                && coords::close(lats[i], lats[j], WRAP_RTOL, WRAP_ATOL)
            {
                return Err(GeoError::invalid_param(
                    "corners",
                    &format!("({}, {})", lons[i], lats[i]),
                    "consecutive corners must be distinct",
                ));
            }
        }
        Ok(Self {
            lons,
            lats,
            ellipsoid: Ellipsoid::default(),
            c: BBOX_C,
            triangulate: false,
            interpolator: Box::new(SphericalGeodesic),
            cache: HashMap::new(),
        })
    }

    /// Set the edge sampling resolution.
    pub fn with_resolution(mut self, c: usize) -> Self {
        self.c = c.max(1);
        self.cache.clear();
        self
    }

    /// Generate triangles instead of quads on the offset surfaces.
    pub fn with_triangulate(mut self, triangulate: bool) -> Self {
        self.triangulate = triangulate;
        self.cache.clear();
        self
    }

    /// Set the reference ellipsoid.
    pub fn with_ellipsoid(mut self, ellipsoid: Ellipsoid) -> Self {
        self.ellipsoid = ellipsoid;
        self.cache.clear();
        self
    }

    /// Supply a custom geodesic interpolator.
    pub fn with_interpolator(
        mut self,
        interpolator: Box<dyn GeodesicInterpolator + Send + Sync>,
    ) -> Self {
        self.interpolator = interpolator;
        self.cache.clear();
        self
    }

    /// The wrapped corner longitudes.
    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    /// The corner latitudes.
    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    /// The closed manifold mesh at the given radius.
    pub fn mesh(&mut self, radius: f64) -> &Mesh {
        &self.solid_for(radius).mesh
    }

    /// Classify points against the manifold at the given radius.
    ///
    /// `tolerance` is a fraction of the solid's bounding-box diagonal.
    pub fn classify(
        &mut self,
        points: &[Point3<f64>],
        radius: f64,
        tolerance: f64,
    ) -> Vec<Containment> {
        let solid = self.solid_for(radius);
        let world_tolerance = tolerance * solid.diagonal;
        points
            .par_iter()
            .map(|point| solid.classify(point, world_tolerance))
            .collect()
    }

    /// The boundary of the box traced on the given surface's sphere, as a
    /// closed polyline mesh.
    ///
    /// # Errors
    /// Returns an error if the surface carries a non-geographic CRS.
    pub fn boundary(&mut self, surface: &Mesh) -> Result<Mesh> {
        ensure_geographic(surface, "boundary")?;
        let radius = surface_radius(surface);
        let ring = self.ring_lonlats();
        let lons: Vec<f64> = ring.iter().map(|&(lon, _)| lon).collect();
        let lats: Vec<f64> = ring.iter().map(|&(_, lat)| lat).collect();
        let points = coords::to_cartesian(&lons, &lats, radius, ZLevel::default(), 0.0)?;

        let n = points.len();
        let mut chain: Vec<usize> = (0..n).collect();
        chain.push(0);
        let mut connectivity = Connectivity::with_capacity(1, n + 1);
        connectivity.push_face(&chain);
        let mut mesh = Mesh::new_polyline(points, connectivity)?;
        mesh.field.crs_wkt = Some(WGS84_WKT.to_string());
        mesh.field.radius = Some(radius);
        Ok(mesh)
    }

    /// Extract the cells of `surface` enclosed by (or outside) the box.
    ///
    /// A projected surface is classified in geographic coordinates first,
    /// which requires its projection in the options; the returned cells are
    /// always extracted from the original surface, so projected geometry
    /// and attributes come back untouched.
    ///
    /// # Errors
    /// Returns an error for an empty surface, or a projected surface with
    /// no projection supplied.
    pub fn enclosed(&mut self, surface: &Mesh, options: &EnclosedOptions<'_>) -> Result<Mesh> {
        if surface.n_cells() == 0 {
            return Err(GeoError::EmptyMesh);
        }

        let geographic;
        let working = if is_geographic(surface) {
            surface
        } else {
            let projection = options.projection.ok_or_else(|| GeoError::ProjectedMesh {
                crs: surface.field.crs_wkt.clone().unwrap_or_default(),
                operation: "enclosed",
            })?;
            geographic = crs::to_geographic(surface, projection)?;
            &geographic
        };

        let radius = surface_radius(working);
        let solid = self.solid_for(radius);
        let world_tolerance = options.tolerance * solid.diagonal;
        let wanted = if options.outside {
            Containment::Outside
        } else {
            Containment::Inside
        };

        let selected: Vec<usize> = match options.preference {
            Preference::Center => (0..working.n_cells())
                .into_par_iter()
                .filter(|&i| {
                    solid.classify(&working.cell_center(i), world_tolerance) == wanted
                })
                .collect(),
            Preference::Cell | Preference::Point => {
                let classes: Vec<bool> = working
                    .points
                    .par_iter()
                    .map(|point| solid.classify(point, world_tolerance) == wanted)
                    .collect();
                (0..working.n_cells())
                    .filter(|&i| {
                        let face = working.face(i);
                        match options.preference {
                            Preference::Cell => face.iter().all(|&v| classes[v]),
                            _ => face.iter().any(|&v| classes[v]),
                        }
                    })
                    .collect()
            }
        };

        // Cell order is preserved through the geographic working copy, so
        // indices extract directly from the original surface.
        Ok(surface.extract_cells(&selected))
    }

    /// The ordered perimeter of the geodesic quadrilateral, 4c points.
    fn ring_lonlats(&self) -> Vec<(f64, f64)> {
        let mut ring = Vec::with_capacity(4 * self.c);
        for k in 0..4 {
            let start = (self.lons[k], self.lats[k]);
            let end = (self.lons[(k + 1) % 4], self.lats[(k + 1) % 4]);
            let edge = self.interpolator.npoints(start, end, self.c + 1);
            ring.extend_from_slice(&edge[..self.c]);
        }
        ring
    }

    fn solid_for(&mut self, radius: f64) -> &Solid {
        let key = radius.to_bits();
        if !self.cache.contains_key(&key) {
            let solid = self.generate(radius);
            self.cache.insert(key, solid);
        }
        &self.cache[&key]
    }

    /// Tessellate the closed manifold at `radius`.
    ///
    /// Layout: an outer offset surface, an inner offset surface with
    /// reversed winding, and a skirt of quads joining their shared
    /// perimeter, so the result is watertight.
    fn generate(&self, radius: f64) -> Solid {
        let c = self.c;
        let n_nodes = (c + 1) * (c + 1);
        let node = |i: usize, j: usize| i * (c + 1) + j;

        // Sample the geodesic quadrilateral: interpolate the two side edges,
        // then each row between them.
        let left = self
            .interpolator
            .npoints((self.lons[0], self.lats[0]), (self.lons[3], self.lats[3]), c + 1);
        let right = self
            .interpolator
            .npoints((self.lons[1], self.lats[1]), (self.lons[2], self.lats[2]), c + 1);
        let mut lons = Vec::with_capacity(n_nodes);
        let mut lats = Vec::with_capacity(n_nodes);
        for i in 0..=c {
            for (lon, lat) in self.interpolator.npoints(left[i], right[i], c + 1) {
                lons.push(lon);
                lats.push(lat);
            }
        }

        let radius = radius * self.ellipsoid.semimajor;
        let surface_at = |r: f64| {
            // lons and lats share a length by construction.
            coords::to_cartesian(&lons, &lats, r, ZLevel::default(), 0.0)
                .expect("sampled coordinate arrays are congruent")
        };
        let mut points = surface_at(radius * (1.0 + BBOX_RADIUS_RATIO));
        let inner = surface_at(radius * (1.0 - BBOX_RADIUS_RATIO));
        points.extend_from_slice(&inner);

        let mut faces: Vec<Vec<usize>> = Vec::with_capacity(2 * c * c + 4 * c);
        let surface = Connectivity::from_regular_grid(c, c);
        for face in surface.iter() {
            faces.push(face.to_vec());
        }
        for face in surface.iter() {
            let reversed: Vec<usize> = face.iter().rev().map(|&v| v + n_nodes).collect();
            faces.push(reversed);
        }

        let mut ring = Vec::with_capacity(4 * c);
        for j in 0..c {
            ring.push(node(0, j));
        }
        for i in 0..c {
            ring.push(node(i, c));
        }
        for j in (1..=c).rev() {
            ring.push(node(c, j));
        }
        for i in (1..=c).rev() {
            ring.push(node(i, 0));
        }
        for k in 0..ring.len() {
            let a = ring[k];
            let b = ring[(k + 1) % ring.len()];
            faces.push(vec![a, b, b + n_nodes, a + n_nodes]);
        }

        let mut connectivity = Connectivity::with_capacity(faces.len(), faces.len() * 4);
        let mut triangles = Vec::with_capacity(faces.len() * 2);
        for face in &faces {
            for k in 1..face.len() - 1 {
                let triangle = [points[face[0]], points[face[k]], points[face[k + 1]]];
                triangles.push(triangle);
                if self.triangulate {
                    connectivity.push_face(&[face[0], face[k], face[k + 1]]);
                }
            }
            if !self.triangulate {
                connectivity.push_face(face);
            }
        }

        let mut min = Vector3::repeat(f64::INFINITY);
        let mut max = Vector3::repeat(f64::NEG_INFINITY);
        for point in &points {
            min = min.inf(&point.coords);
            max = max.sup(&point.coords);
        }
        let diagonal = (max - min).norm();

        let mut mesh = Mesh {
            points,
            connectivity,
            kind: MeshKind::Polygonal,
            point_data: HashMap::new(),
            cell_data: HashMap::new(),
            field: FieldMetadata::default(),
            active_scalars: None,
        };
        mesh.field.crs_wkt = Some(WGS84_WKT.to_string());

        Solid {
            mesh,
            triangles,
            diagonal,
        }
    }
}

/// Corner equality is tolerance-based and order-sensitive: the same corners
/// listed in a different rotation describe the same region but compare
/// unequal.
impl PartialEq for BBox {
    fn eq(&self, other: &Self) -> bool {
        self.ellipsoid == other.ellipsoid
            && self.c == other.c
            && self.triangulate == other.triangulate
            && self
                .lons
                .iter()
                .zip(other.lons.iter())
                .all(|(&a, &b)| coords::close(a, b, WRAP_RTOL, WRAP_ATOL))
            && self
                .lats
                .iter()
                .zip(other.lats.iter())
                .all(|(&a, &b)| coords::close(a, b, WRAP_RTOL, WRAP_ATOL))
    }
}

impl Eq for BBox {}

impl Hash for BBox {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ellipsoid.semimajor.to_bits().hash(state);
        self.c.hash(state);
        self.triangulate.hash(state);
        for &lon in &self.lons {
            lon.to_bits().hash(state);
        }
        for &lat in &self.lats {
            lat.to_bits().hash(state);
        }
    }
}

/// The six panels of the cubed sphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Panel {
    /// Equatorial panel centred on longitude 0.
    Africa,
    /// Equatorial panel centred on longitude 90.
    Asia,
    /// Equatorial panel centred on the antimeridian.
    Pacific,
    /// Equatorial panel centred on longitude -90.
    Americas,
    /// North polar panel.
    Arctic,
    /// South polar panel.
    Antarctic,
}

impl FromStr for Panel {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "africa" => Ok(Panel::Africa),
            "asia" => Ok(Panel::Asia),
            "pacific" => Ok(Panel::Pacific),
            "americas" => Ok(Panel::Americas),
            "arctic" => Ok(Panel::Arctic),
            "antarctic" => Ok(Panel::Antarctic),
            _ => Err(GeoError::invalid_param(
                "panel",
                s,
                "expected one of: africa, asia, pacific, americas, arctic, antarctic",
            )),
        }
    }
}

/// The bounding box of a cubed-sphere panel.
///
/// # Example
/// ```
/// use cartomesh::geodesic::{panel, Panel};
///
/// let africa = panel(Panel::Africa);
/// assert_eq!(africa.lats(), &[-45.0, -45.0, 45.0, 45.0]);
/// ```
pub fn panel(which: Panel) -> BBox {
    let (lons, lats) = match which {
        Panel::Africa => ([-45.0, 45.0, 45.0, -45.0], [-45.0, -45.0, 45.0, 45.0]),
        Panel::Asia => ([45.0, 135.0, 135.0, 45.0], [-45.0, -45.0, 45.0, 45.0]),
        Panel::Pacific => ([135.0, 225.0, 225.0, 135.0], [-45.0, -45.0, 45.0, 45.0]),
        Panel::Americas => ([-135.0, -45.0, -45.0, -135.0], [-45.0, -45.0, 45.0, 45.0]),
        Panel::Arctic => ([-45.0, 45.0, 135.0, 225.0], [45.0, 45.0, 45.0, 45.0]),
        Panel::Antarctic => ([-45.0, 45.0, 135.0, 225.0], [-45.0, -45.0, -45.0, -45.0]),
    };
    // Corner tables are valid by construction.
    BBox::new(&lons, &lats).expect("panel corners are valid")
}

fn is_geographic(mesh: &Mesh) -> bool {
    mesh.field
        .crs_wkt
        .as_deref()
        .map_or(true, |wkt| wkt == WGS84_WKT)
}

fn ensure_geographic(mesh: &Mesh, operation: &'static str) -> Result<()> {
    if is_geographic(mesh) {
        Ok(())
    } else {
        Err(GeoError::ProjectedMesh {
            crs: mesh.field.crs_wkt.clone().unwrap_or_default(),
            operation,
        })
    }
}

/// The sphere radius a mesh sits on: recorded metadata when present,
/// otherwise the mean point distance from the origin.
fn surface_radius(mesh: &Mesh) -> f64 {
    mesh.field.radius.unwrap_or_else(|| {
        if mesh.points.is_empty() {
            RADIUS
        } else {
            mesh.points.iter().map(|p| p.coords.norm()).sum::<f64>() / mesh.n_points() as f64
        }
    })
}
