//! Error types for cartomesh.
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias using [`GeoError`].
pub type Result<T> = std::result::Result<T, GeoError>;

/// Errors that can occur during mesh construction and geometric operations.
#[derive(Error, Debug)]
pub enum GeoError {
    /// The mesh has no cells.
    #[error("mesh has no cells")]
    EmptyMesh,

    /// A face references an invalid point index.
    #[error("face {face} references point index {index}, but the mesh has {n_points} points")]
    InvalidPointIndex {
        /// The face index.
        face: usize,
        /// The invalid point index.
        index: usize,
        /// Number of points in the mesh.
        n_points: usize,
    },

    /// Two input arrays have incompatible shapes.
    #[error("shape mismatch for {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which inputs disagree.
        context: &'static str,
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// A per-point array cannot broadcast against the coordinate arrays.
    #[error("cannot broadcast {name} of length {length} against {n_points} coordinates")]
    Broadcast {
        /// Name of the offending array.
        name: &'static str,
        /// Its length.
        length: usize,
        /// Number of coordinates it must match.
        n_points: usize,
    },

    /// 1-D bound pairs are not contiguous.
    #[error(
        "bounds are not contiguous at index {index}: right bound {left} does not meet \
         left bound {right} of the next pair"
    )]
    NonContiguousBounds {
        /// Index of the first pair of the mismatched couple.
        index: usize,
        /// Right bound of pair `index`.
        left: f64,
        /// Left bound of pair `index + 1`.
        right: f64,
    },

    /// The connectivity start index is neither 0 nor 1.
    #[error("connectivity start index must be 0 or 1, got {value}")]
    InvalidStartIndex {
        /// The offending start index.
        value: i64,
    },

    /// A node grid is too small to form a single face.
    #[error("grid of {rows}x{cols} nodes is too small; at least 2x2 nodes are required")]
    TooFewNodes {
        /// Node rows.
        rows: usize,
        /// Node columns.
        cols: usize,
    },

    /// A named attribute array does not match the point or cell count.
    #[error(
        "attribute '{name}' has length {length}, which matches neither the point count \
         ({n_points}) nor the cell count ({n_cells})"
    )]
    AttributeLength {
        /// Attribute name.
        name: String,
        /// Supplied length.
        length: usize,
        /// Mesh point count.
        n_points: usize,
        /// Mesh cell count.
        n_cells: usize,
    },

    /// A bounding box was given the wrong number of corners.
    #[error("bounding box requires exactly 4 corners (or 5 with a closing point), got {count}")]
    CornerCount {
        /// Number of corners supplied.
        count: usize,
    },

    /// The operation requires a spherical mesh but the mesh is already projected.
    #[error("mesh is already projected ({crs}); {operation} requires a spherical mesh")]
    ProjectedMesh {
        /// The mesh's planar CRS.
        crs: String,
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The cartographic projection collaborator failed.
    #[error("projection failed: {message}")]
    Projection {
        /// Description of the failure.
        message: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl GeoError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        GeoError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}
