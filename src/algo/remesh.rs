//! Antimeridian remesh engine.
//!
//! Given a mesh and a target meridian, this module determines which cells
//! are bisected by the meridian's great-circle plane, splits and
//! re-triangulates them, and relabels the resulting boundary points so that
//! downstream projection and texturing see two disjoint halves instead of a
//! self-intersecting band.
//!
//! Cells are classified against three thin cutting planes: one at the
//! meridian itself and one a small angular offset to either side. Cells
//! captured only by the west-biased plane are whole west cells, symmetric
//! for east; cells captured by both biased planes are truly bisected and
//! must be re-triangulated.
//!
//! Boundary points are tagged with integer sentinels in a reserved point
//! attribute: seam points must be duplicated between the halves, join
//! points are shared with the untouched remainder of the mesh.
//!
//! # Example
//! ```
//! use cartomesh::bridge::{from_unstructured, BridgeOptions, ConnectivityInput};
//! use cartomesh::mesh::Connectivity;
//! use cartomesh::algo::remesh::{slice_cells, SliceOptions};
//!
//! // A single quad straddling the antimeridian.
//! let lons = [170.0, -170.0, -170.0, 170.0];
//! let lats = [-10.0, -10.0, 10.0, 10.0];
//! let connectivity = Connectivity::from_faces([[0usize, 1, 2, 3].as_slice()]);
//! let mesh = from_unstructured(
//!     &lons,
//!     &lats,
//!     ConnectivityInput::Faces(&connectivity),
//!     None,
//!     &BridgeOptions::default(),
//! )
//! .unwrap();
//!
//! let sliced = slice_cells(&mesh, 180.0, &SliceOptions::default()).unwrap();
//! assert!(sliced.n_cells() >= 2);
//! ```

use std::collections::{HashMap, HashSet};

use nalgebra::{Point3, Vector3};

use crate::coords::{self, LonLatOptions, WRAP_ATOL, WRAP_RTOL};
use crate::crs::WGS84_WKT;
use crate::error::{GeoError, Result};
use crate::mesh::{AttributeArray, AttributeLocation, Connectivity, Mesh};

/// Sentinel marking a point that must be duplicated between the mesh halves.
pub const REMESH_SEAM: f64 = -3.0;

/// Sentinel marking a point shared with the untouched remainder of the mesh.
pub const REMESH_JOIN: f64 = -2.0;

/// Reserved point attribute carrying the remesh sentinels.
pub const REMESH_POINT_IDS: &str = "remesh_point_ids";

/// Reserved cell attribute carrying original cell ids through the remesh.
pub const CELL_IDS: &str = "cell_ids";

/// Default angular offset of the biased cutting planes, in degrees.
pub const SLICE_OFFSET: f64 = 1e-5;

/// Longitude span above which a seam-adjacent cell is presumed to straddle
/// the meridian despite not being captured by the plane intersection.
///
/// This defensive heuristic is under review upstream; the threshold and the
/// drop-with-warning behavior are preserved as-is.
const NEIGHBOR_SPAN_THRESHOLD: f64 = 270.0;

/// Options controlling [`slice_cells`].
#[derive(Debug, Clone, Copy)]
pub struct SliceOptions {
    /// Angular offset of the biased cutting planes, in degrees.
    pub offset: f64,
    /// Relative tolerance for meridian-coincidence tests.
    pub rtol: f64,
    /// Absolute tolerance for meridian-coincidence tests.
    pub atol: f64,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            offset: SLICE_OFFSET,
            rtol: WRAP_RTOL,
            atol: WRAP_ATOL,
        }
    }
}

impl SliceOptions {
    /// Set the biased-plane offset.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the coincidence tolerances.
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }
}

/// Classification of mesh cells against a meridian's cutting planes.
#[derive(Debug, Clone)]
pub struct MeridianSlice {
    /// The wrapped target meridian.
    pub meridian: f64,
    /// Whole cells coincident with the meridian on its west side.
    pub west: Vec<usize>,
    /// Whole cells coincident with the meridian on its east side.
    pub east: Vec<usize>,
    /// Cells truly bisected by the meridian.
    pub split: Vec<usize>,
}

impl MeridianSlice {
    /// Classify the cells of `mesh` against `meridian`.
    ///
    /// # Errors
    /// Returns [`GeoError::EmptyMesh`] if the mesh has no cells.
    pub fn new(mesh: &Mesh, meridian: f64, options: &SliceOptions) -> Result<Self> {
        if mesh.n_cells() == 0 {
            return Err(GeoError::EmptyMesh);
        }
        let meridian = coords::wrap_value(meridian, &Default::default());
        let (lons, _) = mesh.point_lonlats(false);

        let mut west = Vec::new();
        let mut east = Vec::new();
        let mut split = Vec::new();
        for cell in 0..mesh.n_cells() {
            let face = mesh.face(cell);
            let captured_west = intersects_plane(&lons, face, meridian - options.offset);
            let captured_east = intersects_plane(&lons, face, meridian + options.offset);
            match (captured_west, captured_east) {
                (true, true) => split.push(cell),
                (true, false) => west.push(cell),
                (false, true) => east.push(cell),
                (false, false) => {}
            }
        }

        Ok(Self {
            meridian,
            west,
            east,
            split,
        })
    }

    /// Whether no cell intersects any cutting plane.
    pub fn is_empty(&self) -> bool {
        self.west.is_empty() && self.east.is_empty() && self.split.is_empty()
    }
}

/// Signed angular delta of `lon` relative to `meridian`, in `[-180, 180)`.
#[inline]
fn signed_delta(lon: f64, meridian: f64) -> f64 {
    (lon - meridian + 180.0).rem_euclid(360.0) - 180.0
}

/// Vertex-on-plane tolerance for the capture test, in degrees.
///
/// Deliberately far below the biased-plane offset, so a cell touching the
/// exact meridian is captured by exactly one biased plane via an edge
/// crossing rather than by both via coincidence.
const PLANE_TOL: f64 = 1e-9;

/// Whether a face touches or crosses the half-plane at `plane_lon`.
///
/// An edge crosses when its endpoint deltas have opposite signs along the
/// short arc; a vertex within tolerance of the plane counts as touching.
fn intersects_plane(lons: &[f64], face: &[usize], plane_lon: f64) -> bool {
    let tol = PLANE_TOL;
    let deltas: Vec<f64> = face
        .iter()
        .map(|&v| signed_delta(lons[v], plane_lon))
        .collect();
    if deltas.iter().any(|&d| d.abs() <= tol) {
        return true;
    }
    for i in 0..deltas.len() {
        let a = deltas[i];
        let b = deltas[(i + 1) % deltas.len()];
        if a.signum() != b.signum() && (a - b).abs() < 180.0 {
            return true;
        }
    }
    false
}

/// Make a mesh whose cells may straddle `meridian` safe for reprojection.
///
/// Bisected cells are re-triangulated into west and east halves, whole
/// meridian-coincident cells have their seam points tagged, and the
/// original cells consumed by the operation are removed before the retained
/// mesh and the generated sub-meshes are recombined. Field metadata and the
/// active scalar array survive the round trip.
///
/// Slicing at a meridian that intersects no cell returns an unchanged copy.
///
/// # Errors
/// Returns an error if the mesh has no cells, or if it is already a planar
/// projection (no seam concept applies).
pub fn slice_cells(mesh: &Mesh, meridian: f64, options: &SliceOptions) -> Result<Mesh> {
    ensure_spherical(mesh, "antimeridian slicing")?;
    let slice = MeridianSlice::new(mesh, meridian, options)?;
    if slice.is_empty() {
        return Ok(mesh.clone());
    }
    let (lons, _) = mesh.point_lonlats(false);

    // Tag every point and cell of the source so extracted sub-meshes and the
    // remainder all carry the bookkeeping attributes through `append`.
    let mut source = mesh.clone();
    let tol = options.atol + options.rtol * slice.meridian.abs();
    let markers: Vec<f64> = lons
        .iter()
        .map(|&lon| {
            if signed_delta(lon, slice.meridian).abs() <= tol {
                REMESH_SEAM
            } else {
                0.0
            }
        })
        .collect();
    source
        .attach_point_data(REMESH_POINT_IDS, AttributeArray::Scalar(markers))
        .expect("marker length matches point count");
    let ids: Vec<f64> = (0..source.n_cells()).map(|i| i as f64).collect();
    source
        .attach_cell_data(CELL_IDS, AttributeArray::Scalar(ids))
        .expect("id length matches cell count");

    let (west_split, east_split) = remesh_split(&source, &slice, options);

    // Defensive check: neighbors of the split region that were not captured
    // by the plane intersection but whose longitude span says otherwise are
    // excluded rather than guessed at.
    let dropped = suspect_neighbors(&source, &lons, &slice);

    let mut removed: HashSet<usize> = slice.split.iter().copied().collect();
    removed.extend(slice.west.iter().copied());
    removed.extend(slice.east.iter().copied());
    removed.extend(dropped.iter().copied());

    let west_whole = source.extract_cells(&slice.west);
    let east_whole = source.extract_cells(&slice.east);

    let mut result = source;
    result.remove_cells(&removed);
    result.append(&west_whole);
    result.append(&east_whole);
    result.append(&west_split);
    result.append(&east_split);

    result.field = mesh.field.clone();
    if let Some((name, location)) = &mesh.active_scalars {
        let present = match location {
            AttributeLocation::Point => result.point_data.contains_key(name),
            AttributeLocation::Cell => result.cell_data.contains_key(name),
        };
        if present {
            result.active_scalars = mesh.active_scalars.clone();
        }
    }
    Ok(result)
}

/// Re-triangulate the bisected cells of `mesh` at `meridian`.
///
/// Returns the transient remesh triple: the full remeshed region and its
/// west and east halves. The caller reassembles a corrected whole mesh from
/// the halves; the combined region is provided for inspection.
pub fn remesh(
    mesh: &Mesh,
    meridian: f64,
    options: &SliceOptions,
) -> Result<(Mesh, Mesh, Mesh)> {
    ensure_spherical(mesh, "remeshing")?;
    let slice = MeridianSlice::new(mesh, meridian, options)?;
    let (west, east) = remesh_split(mesh, &slice, options);
    let mut combined = west.clone();
    combined.append(&east);
    combined.field = mesh.field.clone();
    Ok((combined, west, east))
}

fn ensure_spherical(mesh: &Mesh, operation: &'static str) -> Result<()> {
    match &mesh.field.crs_wkt {
        Some(wkt) if wkt != WGS84_WKT => Err(GeoError::ProjectedMesh {
            crs: wkt.clone(),
            operation,
        }),
        _ => Ok(()),
    }
}

/// Where a sub-mesh point came from: an original mesh point, or a cut point
/// interpolated along an original edge.
#[derive(Debug, Clone, Copy)]
enum PointSource {
    Original(usize),
    Cut { a: usize, b: usize, t: f64 },
}

/// Accumulates one half of the remeshed region.
struct HalfBuilder {
    points: Vec<Point3<f64>>,
    sources: Vec<PointSource>,
    connectivity: Connectivity,
    parents: Vec<usize>,
}

impl HalfBuilder {
    fn new() -> Self {
        Self {
            points: Vec::new(),
            sources: Vec::new(),
            connectivity: Connectivity::new(),
            parents: Vec::new(),
        }
    }

    fn push_triangle(&mut self, triangle: &[(Point3<f64>, PointSource); 3], parent: usize) {
        let base = self.points.len();
        for (point, source) in triangle {
            self.points.push(*point);
            self.sources.push(*source);
        }
        self.connectivity.push_face(&[base, base + 1, base + 2]);
        self.parents.push(parent);
    }

    /// Materialize the half as a mesh, deriving attributes from `source`.
    fn build(self, source: &Mesh, meridian: f64, options: &SliceOptions) -> Mesh {
        let tol = options.atol + options.rtol * meridian.abs();
        let (lons, _) = source.point_lonlats(false);
        let mut mesh = Mesh::new_polygonal(self.points, self.connectivity)
            .expect("builder indices are dense");
        mesh.kind = source.kind;
        mesh.field = source.field.clone();

        for (name, values) in &source.point_data {
            let derived = match values {
                AttributeArray::Scalar(data) => AttributeArray::Scalar(
                    self.sources
                        .iter()
                        .map(|s| match *s {
                            PointSource::Original(i) => data[i],
                            PointSource::Cut { a, b, t } => data[a] + t * (data[b] - data[a]),
                        })
                        .collect(),
                ),
                AttributeArray::Rgb(data) => AttributeArray::Rgb(
                    self.sources
                        .iter()
                        .map(|s| match *s {
                            PointSource::Original(i) => data[i],
                            PointSource::Cut { a, b, t } => {
                                let mut rgb = [0.0; 3];
                                for (k, channel) in rgb.iter_mut().enumerate() {
                                    *channel = data[a][k] + t * (data[b][k] - data[a][k]);
                                }
                                rgb
                            }
                        })
                        .collect(),
                ),
            };
            mesh.point_data.insert(name.clone(), derived);
        }

        // Sentinels: cut points and meridian-coincident originals are seam
        // points; remaining originals join the untouched remainder.
        let markers: Vec<f64> = self
            .sources
            .iter()
            .map(|s| match *s {
                PointSource::Original(i) => {
                    if signed_delta(lons[i], meridian).abs() <= tol {
                        REMESH_SEAM
                    } else {
                        REMESH_JOIN
                    }
                }
                PointSource::Cut { .. } => REMESH_SEAM,
            })
            .collect();
        mesh.point_data
            .insert(REMESH_POINT_IDS.to_string(), AttributeArray::Scalar(markers));

        for (name, values) in &source.cell_data {
            mesh.cell_data
                .insert(name.clone(), values.subset(&self.parents));
        }
        mesh.cell_data.insert(
            CELL_IDS.to_string(),
            AttributeArray::Scalar(self.parents.iter().map(|&i| i as f64).collect()),
        );
        mesh
    }
}

/// Cut the split cells with the exact great-circle plane through `meridian`
/// and partition the resulting triangles into west and east halves.
fn remesh_split(source: &Mesh, slice: &MeridianSlice, options: &SliceOptions) -> (Mesh, Mesh) {
    // Plane through the z-axis at the meridian's azimuth; the signed side of
    // a nearby point equals sin(lon - meridian).
    let azimuth = slice.meridian.to_radians();
    let normal = Vector3::new(-azimuth.sin(), azimuth.cos(), 0.0);

    let mut west = HalfBuilder::new();
    let mut east = HalfBuilder::new();

    for &cell in &slice.split {
        let face = source.face(cell);
        // Fan triangulation; split cells are small spherical polygons.
        for k in 1..face.len() - 1 {
            let triangle = [face[0], face[k], face[k + 1]];
            cut_triangle(source, &triangle, &normal, |sub| {
                let centroid = Point3::from(
                    (sub[0].0.coords + sub[1].0.coords + sub[2].0.coords) / 3.0,
                );
                let (lon_c, _) = single_lonlat(&centroid);
                if is_west(lon_c, slice.meridian) {
                    west.push_triangle(sub, cell);
                } else {
                    east.push_triangle(sub, cell);
                }
            });
        }
    }

    (
        west.build(source, slice.meridian, options),
        east.build(source, slice.meridian, options),
    )
}

/// West/east partition rule for a cell-center longitude.
///
/// `delta = lon - meridian`; west when `-180 < delta < 0` or `delta > 180`,
/// east otherwise.
#[inline]
fn is_west(lon: f64, meridian: f64) -> bool {
    let delta = lon - meridian;
    (-180.0 < delta && delta < 0.0) || delta > 180.0
}

fn single_lonlat(point: &Point3<f64>) -> (f64, f64) {
    let (lons, lats) = coords::to_lonlat(std::slice::from_ref(point), &LonLatOptions::default());
    (lons[0], lats[0])
}

/// Split one triangle by the cutting plane, emitting 1..=3 sub-triangles.
fn cut_triangle(
    source: &Mesh,
    triangle: &[usize; 3],
    normal: &Vector3<f64>,
    mut emit: impl FnMut(&[(Point3<f64>, PointSource); 3]),
) {
    let positions = [
        source.points[triangle[0]],
        source.points[triangle[1]],
        source.points[triangle[2]],
    ];
    let sides = [
        positions[0].coords.dot(normal),
        positions[1].coords.dot(normal),
        positions[2].coords.dot(normal),
    ];
    let plane_tol = 1e-12 * positions[0].coords.norm().max(1.0);
    let sign = |s: f64| {
        if s > plane_tol {
            1i8
        } else if s < -plane_tol {
            -1i8
        } else {
            0i8
        }
    };
    let signs = [sign(sides[0]), sign(sides[1]), sign(sides[2])];

    let vertex = |k: usize| (positions[k], PointSource::Original(triangle[k]));
    let cut = |a: usize, b: usize| {
        let t = sides[a] / (sides[a] - sides[b]);
        let point = Point3::from(
            positions[a].coords + (positions[b].coords - positions[a].coords) * t,
        );
        (
            point,
            PointSource::Cut {
                a: triangle[a],
                b: triangle[b],
                t,
            },
        )
    };

    let has_pos = signs.iter().any(|&s| s > 0);
    let has_neg = signs.iter().any(|&s| s < 0);
    if !(has_pos && has_neg) {
        // Whole triangle on one side (vertices on the plane included).
        emit(&[vertex(0), vertex(1), vertex(2)]);
        return;
    }

    // One vertex sits alone on its side (or on the plane with the other two
    // straddling); rotate so index 0 is the lone vertex.
    let lone = (0..3)
        .find(|&k| {
            let others = [signs[(k + 1) % 3], signs[(k + 2) % 3]];
            signs[k] != 0 && others.iter().all(|&s| s != signs[k])
        })
        .unwrap_or(0);
    let a = lone;
    let b = (lone + 1) % 3;
    let c = (lone + 2) % 3;

    if signs[b] == 0 {
        // Plane passes through vertex b; split into two triangles.
        let q = cut(a, c);
        emit(&[vertex(a), vertex(b), q]);
        emit(&[vertex(b), vertex(c), q]);
        return;
    }
    if signs[c] == 0 {
        let q = cut(a, b);
        emit(&[vertex(a), q, vertex(c)]);
        emit(&[q, vertex(b), vertex(c)]);
        return;
    }

    // General case: lone vertex against the opposite pair.
    let q_ab = cut(a, b);
    let q_ac = cut(a, c);
    emit(&[vertex(a), q_ab, q_ac]);
    emit(&[q_ab, vertex(b), vertex(c)]);
    emit(&[q_ab, vertex(c), q_ac]);
}

/// Find seam-adjacent cells the plane intersection missed.
///
/// A neighbor of the split region whose cell-local longitude span exceeds
/// 270° is a strong signal the cell straddles the seam but was missed due
/// to degenerate geometry; such cells are dropped with a warning rather
/// than guessed at.
fn suspect_neighbors(source: &Mesh, lons: &[f64], slice: &MeridianSlice) -> Vec<usize> {
    let mut classified: HashSet<usize> = slice.split.iter().copied().collect();
    classified.extend(slice.west.iter().copied());
    classified.extend(slice.east.iter().copied());

    let split_points: HashSet<usize> = slice
        .split
        .iter()
        .flat_map(|&cell| source.face(cell).iter().copied())
        .collect();

    let mut point_cells: HashMap<usize, Vec<usize>> = HashMap::new();
    for cell in 0..source.n_cells() {
        for &v in source.face(cell) {
            if split_points.contains(&v) {
                point_cells.entry(v).or_default().push(cell);
            }
        }
    }

    let mut dropped = Vec::new();
    let mut seen = HashSet::new();
    for cells in point_cells.values() {
        for &cell in cells {
            if classified.contains(&cell) || !seen.insert(cell) {
                continue;
            }
            let face = source.face(cell);
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for &v in face {
                min = min.min(lons[v]);
                max = max.max(lons[v]);
            }
            if max - min > NEIGHBOR_SPAN_THRESHOLD {
                log::warn!(
                    "cell {cell} adjacent to the remeshed region spans {:.1} degrees of \
                     longitude and appears to straddle the seam; excluding it",
                    max - min
                );
                dropped.push(cell);
            }
        }
    }
    dropped.sort_unstable();
    dropped
}
