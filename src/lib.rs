//! # Cartomesh
//!
//! A library for turning geospatial grid descriptions into polygonal meshes
//! on the sphere.
//!
//! Cartomesh builds surface meshes from the coordinate and connectivity
//! arrays climate and earth-science datasets actually ship (rectilinear
//! bounds, curvilinear node grids, unstructured masked connectivity), then
//! provides the geometric operations those meshes need downstream: repairing
//! cells that straddle the antimeridian, extracting geodesic bounding-box
//! regions, and projecting into planar coordinate reference systems.
//!
//! ## Features
//!
//! - **Mesh construction**: 1-D bounds, 2-D curvilinear grids, unstructured
//!   and masked connectivity, point clouds
//! - **Antimeridian remeshing**: split cells straddling an arbitrary
//!   meridian into disconnected east/west halves with seam bookkeeping
//! - **Geodesic bounding boxes**: watertight region manifolds with
//!   interior/exterior cell extraction
//! - **CRS transforms**: pluggable projections with seam-aware slicing
//!
//! ## Quick Start
//!
//! ```
//! use cartomesh::prelude::*;
//!
//! // A global 4x2 quad grid from 1-D bounds.
//! let lons = [-180.0, -90.0, 0.0, 90.0, 180.0];
//! let lats = [-90.0, 0.0, 90.0];
//! let mesh = from_1d(
//!     Bounds1d::Contiguous(&lons),
//!     Bounds1d::Contiguous(&lats),
//!     None,
//!     &BridgeOptions::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(mesh.n_points(), 15);
//! assert_eq!(mesh.n_cells(), 8);
//!
//! // Every point lies on the unit sphere.
//! for point in &mesh.points {
//!     assert!((point.coords.norm() - 1.0).abs() < 1e-12);
//! }
//! ```
//!
//! ## Region Extraction
//!
//! ```
//! use cartomesh::prelude::*;
//! use cartomesh::geodesic::{panel, Panel};
//!
//! # let lons: Vec<f64> = (0..=24).map(|i| -180.0 + 15.0 * i as f64).collect();
//! # let lats: Vec<f64> = (0..=12).map(|i| -90.0 + 15.0 * i as f64).collect();
//! # let mesh = from_1d(
//! #     Bounds1d::Contiguous(&lons),
//! #     Bounds1d::Contiguous(&lats),
//! #     None,
//! #     &BridgeOptions::default(),
//! # )
//! # .unwrap();
//! // Cells whose centers fall within the cubed-sphere Africa panel.
//! let mut bbox = panel(Panel::Africa).with_resolution(16);
//! let region = bbox.enclosed(&mesh, &EnclosedOptions::default()).unwrap();
//! assert!(region.n_cells() > 0);
//! assert!(region.n_cells() < mesh.n_cells());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod bridge;
pub mod coords;
pub mod crs;
pub mod error;
pub mod geodesic;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use cartomesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::remesh::{remesh, slice_cells, SliceOptions};
    pub use crate::bridge::{
        from_1d, from_2d, from_points, from_unstructured, Array2, Bounds1d, BridgeOptions,
        ConnectivityInput, DataPayload, Grid2d,
    };
    pub use crate::coords::{to_cartesian, to_lonlat, wrap, LonLatOptions, WrapOptions, ZLevel};
    pub use crate::crs::{
        to_geographic, transform_mesh, PlateCarree, Projection, TransformOptions, Wgs84,
        WGS84_WKT,
    };
    pub use crate::error::{GeoError, Result};
    pub use crate::geodesic::{BBox, EnclosedOptions, GeodesicInterpolator, Preference};
    pub use crate::mesh::{
        AttributeArray, AttributeLocation, Connectivity, MaskedConnectivity, Mesh, MeshKind,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    // End to end: construct a global grid, split it at the antimeridian,
    // and project it, checking invariants that span module boundaries.
    #[test]
    fn test_construct_slice_project() {
        let lons: Vec<f64> = (0..=12).map(|i| -180.0 + 30.0 * i as f64).collect();
        let lats: Vec<f64> = (0..=6).map(|i| -90.0 + 30.0 * i as f64).collect();
        let data = DataPayload::scalar("synthetic", (0..72).map(|i| i as f64).collect());
        let mesh = from_1d(
            Bounds1d::Contiguous(&lons),
            Bounds1d::Contiguous(&lats),
            Some(data),
            &BridgeOptions::default(),
        )
        .unwrap();
        assert_eq!(mesh.n_cells(), 72);

        // Slicing along a meridian interior to a cell column splits exactly
        // that column.
        let sliced = slice_cells(&mesh, 100.0, &SliceOptions::default()).unwrap();
        assert!(sliced.n_cells() > mesh.n_cells());
        assert!(sliced.cell_data.contains_key("synthetic"));
        assert!(sliced.is_valid());

        let planar = transform_mesh(
            &sliced,
            &PlateCarree::default(),
            &TransformOptions::default(),
        )
        .unwrap();
        assert!(planar.is_valid());
        for point in &planar.points {
            assert!(point.x.is_finite() && point.y.is_finite());
        }
    }
}
