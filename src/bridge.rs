//! Mesh construction from raw geographic inputs.
//!
//! This module is the single public entry point for turning coordinate and
//! connectivity arrays into a [`Mesh`] on the sphere. Four construction
//! modes are provided, all ultimately reducing to the unstructured case:
//!
//! - [`from_1d`]: rectilinear bounds, expanded by outer product
//! - [`from_2d`]: curvilinear node grids or per-cell corner arrays
//! - [`from_unstructured`]: flat coordinates plus explicit, masked, or
//!   synthesized connectivity
//! - [`from_points`]: unconnected point clouds
//!
//! Every mode optionally reprojects input x/y to WGS84 longitude/latitude
//! first (when a non-geographic source projection is supplied), so mesh
//! points are always expressed relative to the WGS84 sphere.
//!
//! # Example
//! ```
//! use cartomesh::bridge::{from_1d, Bounds1d, BridgeOptions};
//!
//! // A 2x4 quad grid over the whole globe.
//! let lons = [-180.0, -90.0, 0.0, 90.0, 180.0];
//! let lats = [-90.0, 0.0, 90.0];
//! let mesh = from_1d(
//!     Bounds1d::Contiguous(&lons),
//!     Bounds1d::Contiguous(&lats),
//!     None,
//!     &BridgeOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(mesh.n_points(), 15);
//! assert_eq!(mesh.n_cells(), 8);
//! ```

use nalgebra::Point3;

use crate::coords::{self, ZLevel, RADIUS, WRAP_ATOL, WRAP_RTOL, ZLEVEL_SCALE};
use crate::crs::{Projection, WGS84_WKT};
use crate::error::{GeoError, Result};
use crate::mesh::{
    AttributeArray, AttributeLocation, Connectivity, MaskedConnectivity, Mesh,
};

/// Merge tolerance for `clean`, as a fraction of the sphere radius.
const CLEAN_TOLERANCE: f64 = 1e-8;

/// Options shared by all construction modes.
#[derive(Debug, Clone, Copy)]
pub struct BridgeOptions<'a> {
    /// Sphere radius.
    pub radius: f64,
    /// Uniform vertical level.
    pub zlevel: f64,
    /// Proportional vertical scale per level.
    pub zscale: f64,
    /// Source projection of the input x/y coordinates; `None` or a
    /// geographic projection means the inputs are already lon/lat degrees.
    pub projection: Option<&'a dyn Projection>,
    /// Connectivity start index (0 or 1); auto-detected when `None`.
    pub start_index: Option<i64>,
    /// Merge duplicate points and drop degenerate cells post-construction.
    pub clean: bool,
}

impl Default for BridgeOptions<'_> {
    fn default() -> Self {
        Self {
            radius: RADIUS,
            zlevel: 0.0,
            zscale: ZLEVEL_SCALE,
            projection: None,
            start_index: None,
            clean: false,
        }
    }
}

impl<'a> BridgeOptions<'a> {
    /// Set the sphere radius.
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
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

    /// Set the source projection of the input coordinates.
    pub fn with_projection(mut self, projection: &'a dyn Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Set an explicit connectivity start index.
    pub fn with_start_index(mut self, start_index: i64) -> Self {
        self.start_index = Some(start_index);
        self
    }

    /// Request post-construction cleaning.
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }
}

/// An optional named data payload to attach to the constructed mesh.
#[derive(Debug, Clone)]
pub struct DataPayload {
    /// Attribute name.
    pub name: String,
    /// Attribute values; the length decides whether it is per-point or
    /// per-cell. Masked source entries should arrive as NaN.
    pub values: AttributeArray,
}

impl DataPayload {
    /// Create a scalar payload.
    pub fn scalar(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            values: AttributeArray::Scalar(values),
        }
    }

    /// Create an RGB payload.
    pub fn rgb(name: &str, values: Vec<[f64; 3]>) -> Self {
        Self {
            name: name.to_string(),
            values: AttributeArray::Rgb(values),
        }
    }
}

/// A dense row-major 2-D array of coordinates.
#[derive(Debug, Clone)]
pub struct Array2 {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Array2 {
    /// Create from row-major data.
    ///
    /// # Errors
    /// Returns an error if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(GeoError::ShapeMismatch {
                context: "2-D array",
                expected: format!("{rows}x{cols} = {} values", rows * cols),
                actual: format!("{} values", data.len()),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Fill from a function of `(row, col)`.
    pub fn from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major flat data.
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// 1-D rectilinear bounds: contiguous boundary coordinates or per-face pairs.
#[derive(Debug, Clone, Copy)]
pub enum Bounds1d<'a> {
    /// `N + 1` contiguous face-boundary coordinates for `N` faces.
    Contiguous(&'a [f64]),
    /// `(N, 2)` per-face bound pairs; adjacent pairs must share a boundary
    /// value within floating tolerance.
    Pairs(&'a [[f64; 2]]),
}

impl Bounds1d<'_> {
    /// Flatten to contiguous boundary coordinates, verifying contiguity.
    fn to_contiguous(self) -> Result<Vec<f64>> {
        match self {
            Bounds1d::Contiguous(values) => Ok(values.to_vec()),
            Bounds1d::Pairs(pairs) => {
                for (i, window) in pairs.windows(2).enumerate() {
                    if !coords::close(window[0][1], window[1][0], WRAP_RTOL, WRAP_ATOL) {
                        return Err(GeoError::NonContiguousBounds {
                            index: i,
                            left: window[0][1],
                            right: window[1][0],
                        });
                    }
                }
                let mut values = Vec::with_capacity(pairs.len() + 1);
                if let Some(first) = pairs.first() {
                    values.push(first[0]);
                }
                values.extend(pairs.iter().map(|pair| pair[1]));
                Ok(values)
            }
        }
    }
}

/// 2-D curvilinear coordinates: a node grid or explicit per-cell corners.
#[derive(Debug, Clone, Copy)]
pub enum Grid2d<'a> {
    /// `(M + 1, N + 1)` node coordinates; quad connectivity is derived with
    /// anti-clockwise winding.
    Nodes(&'a Array2),
    /// `(M, N, 4)` explicit corners per cell, already wound anti-clockwise;
    /// connectivity is trivial sequential indexing (no point sharing).
    Corners {
        /// Cell rows.
        rows: usize,
        /// Cell columns.
        cols: usize,
        /// `rows * cols` corner quadruples, row-major.
        values: &'a [[f64; 4]],
    },
}

/// Connectivity input for [`from_unstructured`].
#[derive(Debug, Clone, Copy)]
pub enum ConnectivityInput<'a> {
    /// Synthesize regular quad connectivity for `rows x cols` cells over
    /// node coordinates laid out row-major.
    Grid {
        /// Cell rows.
        rows: usize,
        /// Cell columns.
        cols: usize,
    },
    /// Explicit ragged connectivity, already 0-based.
    Faces(&'a Connectivity),
    /// Masked rectangular connectivity with variable vertex counts;
    /// `start_index` applies.
    Masked(&'a MaskedConnectivity),
}

/// Build a mesh from 1-D rectilinear bounds.
///
/// `xs` are longitudes and `ys` latitudes, each either `N + 1` contiguous
/// boundary coordinates or `(N, 2)` bound pairs. The bounds are expanded
/// into a 2-D curvilinear node grid by outer product and delegated to
/// [`from_2d`].
pub fn from_1d(
    xs: Bounds1d<'_>,
    ys: Bounds1d<'_>,
    data: Option<DataPayload>,
    options: &BridgeOptions<'_>,
) -> Result<Mesh> {
    let xs = xs.to_contiguous()?;
    let ys = ys.to_contiguous()?;
    if xs.len() < 2 || ys.len() < 2 {
        return Err(GeoError::TooFewNodes {
            rows: ys.len(),
            cols: xs.len(),
        });
    }
    let xs_2d = Array2::from_fn(ys.len(), xs.len(), |_, j| xs[j]);
    let ys_2d = Array2::from_fn(ys.len(), xs.len(), |i, _| ys[i]);
    from_2d(Grid2d::Nodes(&xs_2d), Grid2d::Nodes(&ys_2d), data, options)
}

/// Build a mesh from 2-D curvilinear coordinates.
///
/// Both coordinate inputs must have the same variant and shape. Delegates
/// to [`from_unstructured`].
pub fn from_2d(
    xs: Grid2d<'_>,
    ys: Grid2d<'_>,
    data: Option<DataPayload>,
    options: &BridgeOptions<'_>,
) -> Result<Mesh> {
    match (xs, ys) {
        (Grid2d::Nodes(xs), Grid2d::Nodes(ys)) => {
            if xs.rows() != ys.rows() || xs.cols() != ys.cols() {
                return Err(GeoError::ShapeMismatch {
                    context: "curvilinear node grids",
                    expected: format!("{}x{}", xs.rows(), xs.cols()),
                    actual: format!("{}x{}", ys.rows(), ys.cols()),
                });
            }
            if xs.rows() < 2 || xs.cols() < 2 {
                return Err(GeoError::TooFewNodes {
                    rows: xs.rows(),
                    cols: xs.cols(),
                });
            }
            from_unstructured(
                xs.data(),
                ys.data(),
                ConnectivityInput::Grid {
                    rows: xs.rows() - 1,
                    cols: xs.cols() - 1,
                },
                data,
                options,
            )
        }
        (
            Grid2d::Corners {
                rows,
                cols,
                values: xs,
            },
            Grid2d::Corners {
                rows: ys_rows,
                cols: ys_cols,
                values: ys,
            },
        ) => {
            if rows != ys_rows || cols != ys_cols || xs.len() != ys.len() {
                return Err(GeoError::ShapeMismatch {
                    context: "per-cell corner arrays",
                    expected: format!("{rows}x{cols}x4"),
                    actual: format!("{ys_rows}x{ys_cols}x4"),
                });
            }
            if xs.len() != rows * cols || rows == 0 || cols == 0 {
                return Err(GeoError::ShapeMismatch {
                    context: "per-cell corner arrays",
                    expected: format!("{rows}x{cols} = {} cells", rows * cols),
                    actual: format!("{} cells", xs.len()),
                });
            }
            let flat_xs: Vec<f64> = xs.iter().flatten().copied().collect();
            let flat_ys: Vec<f64> = ys.iter().flatten().copied().collect();
            let mut connectivity = Connectivity::with_capacity(xs.len(), xs.len() * 4);
            for i in 0..xs.len() {
                connectivity.push_face(&[4 * i, 4 * i + 1, 4 * i + 2, 4 * i + 3]);
            }
            from_unstructured(
                &flat_xs,
                &flat_ys,
                ConnectivityInput::Faces(&connectivity),
                data,
                options,
            )
        }
        _ => Err(GeoError::ShapeMismatch {
            context: "curvilinear coordinates",
            expected: "matching node/corner variants for xs and ys".to_string(),
            actual: "mixed variants".to_string(),
        }),
    }
}

/// Build a mesh from flat coordinates and connectivity (the general path).
///
/// Connectivity is always supplied explicitly through [`ConnectivityInput`];
/// a caller holding only a coordinate array shape passes
/// [`ConnectivityInput::Grid`] with that shape rather than relying on any
/// inference here.
///
/// `start_index` is auto-detected from the minimum connectivity value for
/// masked input when not supplied; faces left with fewer than 3 valid
/// vertices after mask removal are dropped with a warning. Longitudes are
/// wrapped into the canonical interval and pole-adjacent longitudes are
/// collapsed to 0.
pub fn from_unstructured(
    xs: &[f64],
    ys: &[f64],
    connectivity: ConnectivityInput<'_>,
    data: Option<DataPayload>,
    options: &BridgeOptions<'_>,
) -> Result<Mesh> {
    let (lons, lats) = prepare_lonlats(xs, ys, options)?;

    let (connectivity, kept) = match connectivity {
        ConnectivityInput::Grid { rows, cols } => {
            if rows == 0 || cols == 0 {
                return Err(GeoError::TooFewNodes {
                    rows: rows + 1,
                    cols: cols + 1,
                });
            }
            let expected = (rows + 1) * (cols + 1);
            if lons.len() != expected {
                return Err(GeoError::ShapeMismatch {
                    context: "grid coordinates",
                    expected: format!("{expected} node coordinates"),
                    actual: format!("{} node coordinates", lons.len()),
                });
            }
            (Connectivity::from_regular_grid(rows, cols), None)
        }
        ConnectivityInput::Faces(faces) => {
            if let Some(start) = options.start_index {
                if start != 0 {
                    return Err(GeoError::InvalidStartIndex { value: start });
                }
            }
            (faces.clone(), None)
        }
        ConnectivityInput::Masked(masked) => {
            let start_index = resolve_start_index(masked, options.start_index)?;
            let (connectivity, kept) = masked.compact(start_index);
            let dropped = kept.len() < masked.len();
            (connectivity, dropped.then(|| (kept, masked.len())))
        }
    };

    let points = coords::to_cartesian(
        &lons,
        &lats,
        options.radius,
        ZLevel::Uniform(options.zlevel),
        options.zscale,
    )?;
    let mut mesh = Mesh::new_polygonal(points, connectivity)?;
    mesh.field.crs_wkt = Some(WGS84_WKT.to_string());
    mesh.field.radius =
        Some(options.radius * (1.0 + options.zlevel * options.zscale));

    if let Some(payload) = data {
        attach_payload(&mut mesh, payload, kept)?;
    }
    if options.clean {
        mesh.merge_duplicate_points(CLEAN_TOLERANCE * options.radius);
    }
    Ok(mesh)
}

/// Build a pure point cloud (no connectivity).
///
/// Supports a per-point `zlevel`; records `radius` and `zscale` as field
/// metadata, since there is no face geometry from which to re-derive an
/// effective radius later.
pub fn from_points(
    xs: &[f64],
    ys: &[f64],
    zlevel: ZLevel<'_>,
    data: Option<DataPayload>,
    options: &BridgeOptions<'_>,
) -> Result<Mesh> {
    let (lons, lats) = prepare_lonlats(xs, ys, options)?;
    let points =
        coords::to_cartesian(&lons, &lats, options.radius, zlevel, options.zscale)?;
    let mut mesh = Mesh::new_point_cloud(points);
    mesh.field.crs_wkt = Some(WGS84_WKT.to_string());
    mesh.field.radius = Some(options.radius);
    mesh.field.zscale = Some(options.zscale);

    if let Some(payload) = data {
        mesh.attach_point_data(&payload.name, payload.values)?;
        mesh.set_active_scalars(&payload.name, AttributeLocation::Point)?;
    }
    if options.clean {
        mesh.merge_duplicate_points(CLEAN_TOLERANCE * options.radius);
    }
    Ok(mesh)
}

/// Reproject (when needed), wrap, and pole-collapse the input coordinates.
fn prepare_lonlats(
    xs: &[f64],
    ys: &[f64],
    options: &BridgeOptions<'_>,
) -> Result<(Vec<f64>, Vec<f64>)> {
    if xs.len() != ys.len() {
        return Err(GeoError::ShapeMismatch {
            context: "xs/ys",
            expected: format!("{} coordinates", ys.len()),
            actual: format!("{} coordinates", xs.len()),
        });
    }

    let (raw_lons, lats) = match options.projection {
        Some(projection) if !projection.is_geographic() => {
            projection.unproject(xs, ys, true)?
        }
        _ => (xs.to_vec(), ys.to_vec()),
    };

    let mut lons = coords::wrap(&raw_lons);
    for (lon, &lat) in lons.iter_mut().zip(lats.iter()) {
        // A pole is a true singularity; avoid an arbitrary meridian choice.
        if coords::close(lat.abs(), 90.0, WRAP_RTOL, WRAP_ATOL) {
            *lon = 0.0;
        }
    }
    Ok((lons, lats))
}

/// Resolve the start index for masked connectivity.
fn resolve_start_index(
    masked: &MaskedConnectivity,
    explicit: Option<i64>,
) -> Result<i64> {
    match explicit {
        Some(value) if value == 0 || value == 1 => Ok(value),
        Some(value) => Err(GeoError::InvalidStartIndex { value }),
        None => {
            let minimum = masked.min_index().unwrap_or(0);
            if minimum == 0 || minimum == 1 {
                Ok(minimum)
            } else {
                Err(GeoError::InvalidStartIndex { value: minimum })
            }
        }
    }
}

/// Attach a data payload as point or cell data, depending on its length.
fn attach_payload(
    mesh: &mut Mesh,
    payload: DataPayload,
    kept: Option<(Vec<usize>, usize)>,
) -> Result<()> {
    let length = payload.values.len();
    if length == mesh.n_points() {
        mesh.attach_point_data(&payload.name, payload.values)?;
        mesh.set_active_scalars(&payload.name, AttributeLocation::Point)?;
        return Ok(());
    }
    if length == mesh.n_cells() {
        mesh.attach_cell_data(&payload.name, payload.values)?;
        mesh.set_active_scalars(&payload.name, AttributeLocation::Cell)?;
        return Ok(());
    }
    // A cell payload sized for the pre-drop face count follows the drops.
    if let Some((kept, original)) = kept {
        if length == original {
            let values = payload.values.subset(&kept);
            mesh.attach_cell_data(&payload.name, values)?;
            mesh.set_active_scalars(&payload.name, AttributeLocation::Cell)?;
            return Ok(());
        }
    }
    Err(GeoError::AttributeLength {
        name: payload.name,
        length,
        n_points: mesh.n_points(),
        n_cells: mesh.n_cells(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::PlateCarree;

    fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
        let step = (stop - start) / (n - 1) as f64;
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_from_1d_global_grid() {
        // 2x4 quad grid with synthetic cell data of length 8.
        let lons = linspace(-180.0, 180.0, 5);
        let lats = linspace(-90.0, 90.0, 3);
        let data = DataPayload::scalar("synthetic", (0..8).map(|i| i as f64).collect());
        let mesh = from_1d(
            Bounds1d::Contiguous(&lons),
            Bounds1d::Contiguous(&lats),
            Some(data),
            &BridgeOptions::default(),
        )
        .unwrap();
        assert_eq!(mesh.n_points(), 15);
        assert_eq!(mesh.n_cells(), 8);
        assert!(mesh.cell_data.contains_key("synthetic"));
        assert!(mesh.is_valid());
        // All points are on the unit sphere.
        for point in &mesh.points {
            assert!((point.coords.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_from_1d_pairs_contiguity() {
        let pairs = [[0.0, 10.0], [10.0, 20.0], [20.0, 30.0]];
        let lats = [[0.0, 10.0], [10.0, 20.0]];
        let mesh = from_1d(
            Bounds1d::Pairs(&pairs),
            Bounds1d::Pairs(&lats),
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        assert_eq!(mesh.n_cells(), 6);
        assert_eq!(mesh.n_points(), 12);

        let broken = [[0.0, 10.0], [11.0, 20.0]];
        let result = from_1d(
            Bounds1d::Pairs(&broken),
            Bounds1d::Pairs(&lats),
            None,
            &BridgeOptions::default(),
        );
        assert!(matches!(result, Err(GeoError::NonContiguousBounds { .. })));
    }

    #[test]
    fn test_from_2d_node_grid_counts() {
        // (M+1, N+1) = (3, 4) nodes => 2x3 = 6 faces, 12 points.
        let xs = Array2::from_fn(3, 4, |_, j| -30.0 + 20.0 * j as f64);
        let ys = Array2::from_fn(3, 4, |i, _| -20.0 + 20.0 * i as f64);
        let mesh = from_2d(
            Grid2d::Nodes(&xs),
            Grid2d::Nodes(&ys),
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        assert_eq!(mesh.n_cells(), 6);
        assert_eq!(mesh.n_points(), 12);
        assert!(mesh.connectivity.is_uniform(4));
    }

    #[test]
    fn test_from_2d_corners_no_point_sharing() {
        // (M, N, 4) corners => M*N faces and 4*M*N points.
        let xs = [[0.0, 10.0, 10.0, 0.0], [10.0, 20.0, 20.0, 10.0]];
        let ys = [[0.0, 0.0, 10.0, 10.0], [0.0, 0.0, 10.0, 10.0]];
        let mesh = from_2d(
            Grid2d::Corners { rows: 1, cols: 2, values: &xs },
            Grid2d::Corners { rows: 1, cols: 2, values: &ys },
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        assert_eq!(mesh.n_cells(), 2);
        assert_eq!(mesh.n_points(), 8);
    }

    #[test]
    fn test_from_2d_too_small() {
        let xs = Array2::from_fn(1, 4, |_, j| j as f64);
        let ys = Array2::from_fn(1, 4, |_, _| 0.0);
        let result = from_2d(
            Grid2d::Nodes(&xs),
            Grid2d::Nodes(&ys),
            None,
            &BridgeOptions::default(),
        );
        assert!(matches!(result, Err(GeoError::TooFewNodes { .. })));
    }

    #[test]
    fn test_from_unstructured_single_quad() {
        let xs = [0.0, 10.0, 10.0, 0.0];
        let ys = [0.0, 0.0, 10.0, 10.0];
        let connectivity = Connectivity::from_faces([[0usize, 1, 2, 3].as_slice()]);
        let mesh = from_unstructured(
            &xs,
            &ys,
            ConnectivityInput::Faces(&connectivity),
            None,
            &BridgeOptions::default().with_start_index(0),
        )
        .unwrap();
        assert_eq!(mesh.n_cells(), 1);
        // The serialized face stream carries the vertex-count marker 4.
        assert_eq!(mesh.connectivity.to_stream()[0], 4);
    }

    #[test]
    fn test_from_unstructured_masked_start_index() {
        // 1-based connectivity, auto-detected; second face degenerates.
        let masked = MaskedConnectivity::new(
            2,
            4,
            vec![1, 2, 3, 4, 1, 2, 0, 0],
            vec![false, false, false, false, false, false, true, true],
        )
        .unwrap();
        let xs = [0.0, 10.0, 10.0, 0.0];
        let ys = [0.0, 0.0, 10.0, 10.0];
        let data = DataPayload::scalar("v", vec![7.0, 8.0]);
        let mesh = from_unstructured(
            &xs,
            &ys,
            ConnectivityInput::Masked(&masked),
            Some(data),
            &BridgeOptions::default(),
        )
        .unwrap();
        assert_eq!(mesh.n_cells(), 1);
        // The payload followed the dropped face.
        assert_eq!(
            mesh.cell_data.get("v"),
            Some(&AttributeArray::Scalar(vec![7.0]))
        );
    }

    #[test]
    fn test_from_unstructured_rejects_bad_start_index() {
        let masked = MaskedConnectivity::dense(1, 3, vec![2, 3, 4]).unwrap();
        let xs = [0.0; 5];
        let ys = [0.0; 5];
        let result = from_unstructured(
            &xs,
            &ys,
            ConnectivityInput::Masked(&masked),
            None,
            &BridgeOptions::default(),
        );
        assert!(matches!(result, Err(GeoError::InvalidStartIndex { value: 2 })));
    }

    #[test]
    fn test_from_unstructured_grid_shape() {
        let lons: Vec<f64> = linspace(0.0, 30.0, 4).repeat(3);
        let lats: Vec<f64> = [0.0, 0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 10.0, 20.0, 20.0, 20.0, 20.0]
            .to_vec();
        let mesh = from_unstructured(
            &lons,
            &lats,
            ConnectivityInput::Grid { rows: 2, cols: 3 },
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        assert_eq!(mesh.n_cells(), 6);
        assert_eq!(mesh.n_points(), 12);
    }

    #[test]
    fn test_from_points_records_metadata() {
        let xs = [0.0, 45.0, 90.0];
        let ys = [10.0, 20.0, 30.0];
        let levels = [0.0, 1.0, 2.0];
        let mesh = from_points(
            &xs,
            &ys,
            ZLevel::PerPoint(&levels),
            Some(DataPayload::scalar("t", vec![1.0, 2.0, 3.0])),
            &BridgeOptions::default().with_radius(2.0),
        )
        .unwrap();
        assert!(mesh.is_point_cloud());
        assert_eq!(mesh.field.radius, Some(2.0));
        assert_eq!(mesh.field.zscale, Some(ZLEVEL_SCALE));
        // Per-point levels offset the effective radius.
        assert!(mesh.points[1].coords.norm() > mesh.points[0].coords.norm());
        assert!(mesh.points[2].coords.norm() > mesh.points[1].coords.norm());
    }

    #[test]
    fn test_from_points_lonlat_recovery_with_levels() {
        // Nonzero levels lift points off the base sphere; recovery must use
        // each point's own radius or high latitudes clamp to the pole and
        // lose their longitude to the pole collapse.
        let xs = [30.0, 30.0];
        let ys = [10.0, 89.0];
        let levels = [0.0, 100.0];
        let mesh = from_points(
            &xs,
            &ys,
            ZLevel::PerPoint(&levels),
            None,
            &BridgeOptions::default(),
        )
        .unwrap();
        let (lons, lats) = mesh.point_lonlats(false);
        assert!((lats[0] - 10.0).abs() < 1e-9);
        assert!((lats[1] - 89.0).abs() < 1e-9);
        assert!((lons[0] - 30.0).abs() < 1e-9);
        assert!((lons[1] - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_projected_input_is_unprojected_first() {
        let projection = PlateCarree::default();
        let (xs, ys) = projection.project(&[45.0, -60.0], &[10.0, 30.0], true).unwrap();
        let mesh = from_points(
            &xs,
            &ys,
            ZLevel::default(),
            None,
            &BridgeOptions::default().with_projection(&projection),
        )
        .unwrap();
        let (lons, lats) = mesh.point_lonlats(false);
        assert!((lons[0] - 45.0).abs() < 1e-9);
        assert!((lats[1] - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_clean_merges_seam_duplicates() {
        // -180 and 180 wrap to the same longitude; clean merges the nodes.
        let lons = [-180.0, -90.0, 0.0, 90.0, 180.0];
        let lats = [-30.0, 30.0];
        let mesh = from_1d(
            Bounds1d::Contiguous(&lons),
            Bounds1d::Contiguous(&lats),
            None,
            &BridgeOptions::default().with_clean(true),
        )
        .unwrap();
        assert_eq!(mesh.n_cells(), 4);
        // 10 nodes minus the 2 seam duplicates.
        assert_eq!(mesh.n_points(), 8);
    }

    #[test]
    fn test_rgb_payload() {
        let xs = [0.0, 10.0, 10.0, 0.0];
        let ys = [0.0, 0.0, 10.0, 10.0];
        let connectivity = Connectivity::from_faces([[0usize, 1, 2, 3].as_slice()]);
        let rgb = DataPayload::rgb("color", vec![[1.0, 0.0, 0.0]; 4]);
        let mesh = from_unstructured(
            &xs,
            &ys,
            ConnectivityInput::Faces(&connectivity),
            Some(rgb),
            &BridgeOptions::default(),
        )
        .unwrap();
        assert!(matches!(
            mesh.point_data.get("color"),
            Some(AttributeArray::Rgb(_))
        ));
    }
}
