//! The surface-mesh value type.
//!
//! A [`Mesh`] is an ordered list of 3-D points plus ragged polygon
//! connectivity, named per-point and per-cell attribute arrays, and
//! mesh-scoped field metadata (source CRS, sphere radius, z-scale). It is
//! the sole interchange format between the construction, remeshing, and
//! region-query layers, and remains a valid input to generic polygon-mesh
//! consumers downstream.

mod connectivity;

pub use connectivity::{Connectivity, MaskedConnectivity};

use std::collections::{HashMap, HashSet};

use nalgebra::Point3;

use crate::coords::{self, LonLatOptions};
use crate::error::{GeoError, Result};

/// What kind of geometry the connectivity describes.
///
/// The variant is carried explicitly rather than inferred from point/cell
/// counts at each call site. A mesh whose cells are single vertices (one per
/// point, no lines) is a point cloud; that construction predicate is encoded
/// in the constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshKind {
    /// Points with no face or line connectivity.
    PointCloud,
    /// Faces with at least 3 vertices each.
    Polygonal,
    /// Open or closed polylines.
    Polyline,
}

/// Whether an attribute is per-point or per-cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeLocation {
    /// One value per point.
    Point,
    /// One value per cell.
    Cell,
}

/// A named attribute payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeArray {
    /// One scalar per element.
    Scalar(Vec<f64>),
    /// One RGB triple per element.
    Rgb(Vec<[f64; 3]>),
}

impl AttributeArray {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            AttributeArray::Scalar(values) => values.len(),
            AttributeArray::Rgb(values) => values.len(),
        }
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the elements at `indices`, in order.
    pub fn subset(&self, indices: &[usize]) -> AttributeArray {
        match self {
            AttributeArray::Scalar(values) => {
                AttributeArray::Scalar(indices.iter().map(|&i| values[i]).collect())
            }
            AttributeArray::Rgb(values) => {
                AttributeArray::Rgb(indices.iter().map(|&i| values[i]).collect())
            }
        }
    }

    /// Append another array of the same variant; returns false on mismatch.
    pub fn extend_from(&mut self, other: &AttributeArray) -> bool {
        match (self, other) {
            (AttributeArray::Scalar(a), AttributeArray::Scalar(b)) => {
                a.extend_from_slice(b);
                true
            }
            (AttributeArray::Rgb(a), AttributeArray::Rgb(b)) => {
                a.extend_from_slice(b);
                true
            }
            _ => false,
        }
    }
}

/// Mesh-scoped scalar metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMetadata {
    /// Serialized source CRS as WKT, when known.
    pub crs_wkt: Option<String>,
    /// Sphere radius; present once any geographic construction has occurred.
    pub radius: Option<f64>,
    /// Proportional vertical scale; required for point clouds that encode a
    /// z-offset, since there is no face geometry to re-derive it from.
    pub zscale: Option<f64>,
    /// Optional provenance tag describing the source resolution.
    pub resolution: Option<String>,
}

/// A surface mesh: points, ragged connectivity, attributes, and metadata.
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Ordered 3-D Cartesian points.
    pub points: Vec<Point3<f64>>,
    /// Polygon (or polyline) connectivity.
    pub connectivity: Connectivity,
    /// The geometry kind.
    pub kind: MeshKind,
    /// Named per-point attribute arrays.
    pub point_data: HashMap<String, AttributeArray>,
    /// Named per-cell attribute arrays.
    pub cell_data: HashMap<String, AttributeArray>,
    /// Mesh-scoped metadata.
    pub field: FieldMetadata,
    /// The attribute treated as the active scalar array, if any.
    pub active_scalars: Option<(String, AttributeLocation)>,
}

impl Mesh {
    /// Create a polygonal mesh, validating the connectivity index bound.
    pub fn new_polygonal(points: Vec<Point3<f64>>, connectivity: Connectivity) -> Result<Self> {
        connectivity.validate(points.len())?;
        Ok(Self {
            points,
            connectivity,
            kind: MeshKind::Polygonal,
            point_data: HashMap::new(),
            cell_data: HashMap::new(),
            field: FieldMetadata::default(),
            active_scalars: None,
        })
    }

    /// Create a point cloud (no connectivity).
    pub fn new_point_cloud(points: Vec<Point3<f64>>) -> Self {
        Self {
            points,
            connectivity: Connectivity::new(),
            kind: MeshKind::PointCloud,
            point_data: HashMap::new(),
            cell_data: HashMap::new(),
            field: FieldMetadata::default(),
            active_scalars: None,
        }
    }

    /// Create a polyline mesh; each "face" is an open vertex chain.
    pub fn new_polyline(points: Vec<Point3<f64>>, connectivity: Connectivity) -> Result<Self> {
        connectivity.validate(points.len())?;
        Ok(Self {
            points,
            connectivity,
            kind: MeshKind::Polyline,
            point_data: HashMap::new(),
            cell_data: HashMap::new(),
            field: FieldMetadata::default(),
            active_scalars: None,
        })
    }

    /// Number of points.
    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    /// Number of cells (faces or polylines).
    pub fn n_cells(&self) -> usize {
        self.connectivity.len()
    }

    /// Whether this mesh is a point cloud.
    pub fn is_point_cloud(&self) -> bool {
        self.kind == MeshKind::PointCloud
    }

    /// The ordered vertex indices of cell `i`.
    pub fn face(&self, i: usize) -> &[usize] {
        self.connectivity.face(i)
    }

    /// The centroid of cell `i`'s vertices.
    pub fn cell_center(&self, i: usize) -> Point3<f64> {
        let face = self.connectivity.face(i);
        let mut sum = nalgebra::Vector3::zeros();
        for &v in face {
            sum += self.points[v].coords;
        }
        Point3::from(sum / face.len() as f64)
    }

    /// Recover (longitude, latitude) degrees for every point.
    ///
    /// Uses the recorded sphere radius when present, otherwise each point's
    /// own distance from the origin. Point clouds always use per-point
    /// distances: their points sit at per-point effective radii, so the
    /// recorded base radius does not describe any individual point.
    pub fn point_lonlats(&self, closed_interval: bool) -> (Vec<f64>, Vec<f64>) {
        let mut options = LonLatOptions::default().with_closed_interval(closed_interval);
        if self.kind != MeshKind::PointCloud {
            options.radius = self.field.radius;
        }
        coords::to_lonlat(&self.points, &options)
    }

    /// Attach a named per-point attribute array.
    ///
    /// # Errors
    /// Returns an error if the array length does not match the point count.
    pub fn attach_point_data(&mut self, name: &str, values: AttributeArray) -> Result<()> {
        if values.len() != self.n_points() {
            return Err(GeoError::AttributeLength {
                name: name.to_string(),
                length: values.len(),
                n_points: self.n_points(),
                n_cells: self.n_cells(),
            });
        }
        self.point_data.insert(name.to_string(), values);
        Ok(())
    }

    /// Attach a named per-cell attribute array.
    ///
    /// # Errors
    /// Returns an error if the array length does not match the cell count.
    pub fn attach_cell_data(&mut self, name: &str, values: AttributeArray) -> Result<()> {
        if values.len() != self.n_cells() {
            return Err(GeoError::AttributeLength {
                name: name.to_string(),
                length: values.len(),
                n_points: self.n_points(),
                n_cells: self.n_cells(),
            });
        }
        self.cell_data.insert(name.to_string(), values);
        Ok(())
    }

    /// Mark a named attribute as the active scalar array.
    ///
    /// # Errors
    /// Returns an error if no attribute of that name exists at the location.
    pub fn set_active_scalars(&mut self, name: &str, location: AttributeLocation) -> Result<()> {
        let present = match location {
            AttributeLocation::Point => self.point_data.contains_key(name),
            AttributeLocation::Cell => self.cell_data.contains_key(name),
        };
        if !present {
            return Err(GeoError::invalid_param(
                "active_scalars",
                name,
                "no attribute of that name at the requested location",
            ));
        }
        self.active_scalars = Some((name.to_string(), location));
        Ok(())
    }

    /// Remove the cells in `removed`, keeping points and field metadata.
    ///
    /// Per-cell attributes are filtered consistently; the active scalar
    /// selection survives if its array does.
    pub fn remove_cells(&mut self, removed: &HashSet<usize>) {
        if removed.is_empty() {
            return;
        }
        let kept: Vec<usize> =
            (0..self.n_cells()).filter(|i| !removed.contains(i)).collect();
        let mut connectivity =
            Connectivity::with_capacity(kept.len(), self.connectivity.index_count());
        for &i in &kept {
            connectivity.push_face(self.connectivity.face(i));
        }
        self.connectivity = connectivity;
        for values in self.cell_data.values_mut() {
            *values = values.subset(&kept);
        }
    }

    /// Extract the cells in `ids` into a new mesh with compacted points.
    ///
    /// Point and cell attributes, field metadata, and the active scalar
    /// selection are carried over.
    pub fn extract_cells(&self, ids: &[usize]) -> Mesh {
        let mut point_map: HashMap<usize, usize> = HashMap::new();
        let mut points = Vec::new();
        let mut point_order = Vec::new();
        let mut connectivity = Connectivity::with_capacity(ids.len(), ids.len() * 4);

        for &i in ids {
            let face: Vec<usize> = self
                .connectivity
                .face(i)
                .iter()
                .map(|&v| {
                    *point_map.entry(v).or_insert_with(|| {
                        points.push(self.points[v]);
                        point_order.push(v);
                        points.len() - 1
                    })
                })
                .collect();
            connectivity.push_face(&face);
        }

        let point_data = self
            .point_data
            .iter()
            .map(|(name, values)| (name.clone(), values.subset(&point_order)))
            .collect();
        let cell_data = self
            .cell_data
            .iter()
            .map(|(name, values)| (name.clone(), values.subset(ids)))
            .collect();

        Mesh {
            points,
            connectivity,
            kind: self.kind,
            point_data,
            cell_data,
            field: self.field.clone(),
            active_scalars: self.active_scalars.clone(),
        }
    }

    /// Append another mesh, offsetting its connectivity.
    ///
    /// Points are never merged, so seams introduced by the caller stay
    /// topologically split. Attributes present in both meshes are
    /// concatenated; attributes present in only one are dropped, since a
    /// partial array can no longer match its element count.
    pub fn append(&mut self, other: &Mesh) {
        let offset = self.n_points();
        self.points.extend_from_slice(&other.points);
        for face in other.connectivity.iter() {
            let shifted: Vec<usize> = face.iter().map(|&v| v + offset).collect();
            self.connectivity.push_face(&shifted);
        }

        self.point_data.retain(|name, values| {
            other
                .point_data
                .get(name)
                .is_some_and(|theirs| values.extend_from(theirs))
        });
        self.cell_data.retain(|name, values| {
            other
                .cell_data
                .get(name)
                .is_some_and(|theirs| values.extend_from(theirs))
        });
        if let Some((name, location)) = &self.active_scalars {
            let present = match location {
                AttributeLocation::Point => self.point_data.contains_key(name),
                AttributeLocation::Cell => self.cell_data.contains_key(name),
            };
            if !present {
                self.active_scalars = None;
            }
        }
    }

    /// Merge points closer than `tolerance` and drop degenerate faces.
    ///
    /// Faces left with fewer than 3 distinct vertices are removed with a
    /// warning. Point attributes keep the first occurrence's values.
    pub fn merge_duplicate_points(&mut self, tolerance: f64) {
        let scale = 1.0 / tolerance.max(f64::MIN_POSITIVE);
        let quantize = |p: &Point3<f64>| {
            (
                (p.x * scale).round() as i64,
                (p.y * scale).round() as i64,
                (p.z * scale).round() as i64,
            )
        };

        let mut first: HashMap<(i64, i64, i64), usize> = HashMap::new();
        let mut remap = Vec::with_capacity(self.n_points());
        let mut kept_points = Vec::new();
        let mut kept_order = Vec::new();
        for (i, point) in self.points.iter().enumerate() {
            let key = quantize(point);
            match first.get(&key) {
                Some(&j) => remap.push(j),
                None => {
                    let j = kept_points.len();
                    first.insert(key, j);
                    kept_points.push(*point);
                    kept_order.push(i);
                    remap.push(j);
                }
            }
        }

        let mut connectivity = Connectivity::new();
        let mut kept_cells = Vec::new();
        for (i, face) in self.connectivity.iter().enumerate() {
            let mapped: Vec<usize> = face.iter().map(|&v| remap[v]).collect();
            let mut deduped: Vec<usize> = Vec::with_capacity(mapped.len());
            for &v in &mapped {
                if deduped.last() != Some(&v) {
                    deduped.push(v);
                }
            }
            if deduped.first() == deduped.last() && deduped.len() > 1 {
                deduped.pop();
            }
            if self.kind == MeshKind::Polygonal && deduped.len() < 3 {
                log::warn!("dropping cell {i}: degenerate after point merge");
                continue;
            }
            connectivity.push_face(&deduped);
            kept_cells.push(i);
        }

        self.points = kept_points;
        self.connectivity = connectivity;
        for values in self.point_data.values_mut() {
            *values = values.subset(&kept_order);
        }
        for values in self.cell_data.values_mut() {
            *values = values.subset(&kept_cells);
        }
    }

    /// Check all structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.connectivity.validate(self.n_points())?;
        for (name, values) in &self.point_data {
            if values.len() != self.n_points() {
                return Err(GeoError::AttributeLength {
                    name: name.clone(),
                    length: values.len(),
                    n_points: self.n_points(),
                    n_cells: self.n_cells(),
                });
            }
        }
        for (name, values) in &self.cell_data {
            if values.len() != self.n_cells() {
                return Err(GeoError::AttributeLength {
                    name: name.clone(),
                    length: values.len(),
                    n_points: self.n_points(),
                    n_cells: self.n_cells(),
                });
            }
        }
        Ok(())
    }

    /// Whether all structural invariants hold.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> Mesh {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
        ];
        let connectivity =
            Connectivity::from_faces([[0usize, 1, 2, 3].as_slice(), [1, 4, 5, 2].as_slice()]);
        Mesh::new_polygonal(points, connectivity).unwrap()
    }

    #[test]
    fn test_new_polygonal_validates_indices() {
        let points = vec![Point3::origin(); 3];
        let connectivity = Connectivity::from_faces([[0usize, 1, 3].as_slice()]);
        assert!(Mesh::new_polygonal(points, connectivity).is_err());
    }

    #[test]
    fn test_cell_center() {
        let mesh = quad_mesh();
        let center = mesh.cell_center(0);
        assert!((center - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_attribute_length_checked() {
        let mut mesh = quad_mesh();
        assert!(mesh
            .attach_cell_data("ok", AttributeArray::Scalar(vec![1.0, 2.0]))
            .is_ok());
        assert!(mesh
            .attach_cell_data("bad", AttributeArray::Scalar(vec![1.0]))
            .is_err());
        assert!(mesh.set_active_scalars("ok", AttributeLocation::Cell).is_ok());
        assert!(mesh.set_active_scalars("missing", AttributeLocation::Cell).is_err());
    }

    #[test]
    fn test_remove_cells_filters_cell_data() {
        let mut mesh = quad_mesh();
        mesh.attach_cell_data("v", AttributeArray::Scalar(vec![10.0, 20.0]))
            .unwrap();
        mesh.remove_cells(&HashSet::from([0]));
        assert_eq!(mesh.n_cells(), 1);
        assert_eq!(mesh.face(0), &[1, 4, 5, 2]);
        assert_eq!(
            mesh.cell_data.get("v"),
            Some(&AttributeArray::Scalar(vec![20.0]))
        );
        // Points and field metadata are untouched.
        assert_eq!(mesh.n_points(), 6);
    }

    #[test]
    fn test_extract_cells_compacts_points() {
        let mut mesh = quad_mesh();
        mesh.attach_point_data("h", AttributeArray::Scalar(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();
        mesh.field.radius = Some(1.0);
        let region = mesh.extract_cells(&[1]);
        assert_eq!(region.n_cells(), 1);
        assert_eq!(region.n_points(), 4);
        assert_eq!(region.face(0), &[0, 1, 2, 3]);
        assert_eq!(
            region.point_data.get("h"),
            Some(&AttributeArray::Scalar(vec![1.0, 4.0, 5.0, 2.0]))
        );
        assert_eq!(region.field.radius, Some(1.0));
        assert!(region.is_valid());
    }

    #[test]
    fn test_append_offsets_and_keeps_shared_attributes() {
        let mut a = quad_mesh();
        a.attach_cell_data("v", AttributeArray::Scalar(vec![1.0, 2.0])).unwrap();
        a.attach_cell_data("only_a", AttributeArray::Scalar(vec![0.0, 0.0])).unwrap();
        let mut b = quad_mesh();
        b.attach_cell_data("v", AttributeArray::Scalar(vec![3.0, 4.0])).unwrap();

        a.append(&b);
        assert_eq!(a.n_points(), 12);
        assert_eq!(a.n_cells(), 4);
        assert_eq!(a.face(2), &[6, 7, 8, 9]);
        assert_eq!(
            a.cell_data.get("v"),
            Some(&AttributeArray::Scalar(vec![1.0, 2.0, 3.0, 4.0]))
        );
        assert!(a.cell_data.get("only_a").is_none());
        assert!(a.is_valid());
    }

    #[test]
    fn test_merge_duplicate_points() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            // Duplicate of point 0, within tolerance.
            Point3::new(1e-9, 0.0, 0.0),
        ];
        let connectivity =
            Connectivity::from_faces([[0usize, 1, 2].as_slice(), [2, 3, 0].as_slice()]);
        let mut mesh = Mesh::new_polygonal(points, connectivity).unwrap();
        mesh.merge_duplicate_points(1e-6);
        assert_eq!(mesh.n_points(), 3);
        // The second face collapsed to 2 distinct vertices and was dropped.
        assert_eq!(mesh.n_cells(), 1);
        assert!(mesh.is_valid());
    }
}
