//! Ragged face connectivity storage.
//!
//! Faces are stored in CSR form: a flat index array plus per-face offsets,
//! so `indices[offsets[i]..offsets[i + 1]]` is the ordered vertex list of
//! face `i`. This supports variable vertex counts per face (3 to 18 vertices
//! are observed in practice for unstructured climate grids) without the
//! ambiguity of padded rectangular arrays.

use crate::error::{GeoError, Result};

/// CSR-style polygon connectivity.
///
/// # Example
/// ```
/// use cartomesh::mesh::Connectivity;
///
/// let mut connectivity = Connectivity::new();
/// connectivity.push_face(&[0, 1, 2, 3]);
/// connectivity.push_face(&[3, 2, 4]);
/// assert_eq!(connectivity.len(), 2);
/// assert_eq!(connectivity.face(1), &[3, 2, 4]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connectivity {
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl Connectivity {
    /// Create empty connectivity.
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            indices: Vec::new(),
        }
    }

    /// Build from an iterator of faces.
    pub fn from_faces<'a, I>(faces: I) -> Self
    where
        I: IntoIterator<Item = &'a [usize]>,
    {
        let mut connectivity = Self::new();
        for face in faces {
            connectivity.push_face(face);
        }
        connectivity
    }

    /// Quad connectivity for a regular grid of `rows x cols` cells over a
    /// node grid of `(rows + 1) x (cols + 1)` points in row-major order.
    ///
    /// Each cell is wound anti-clockwise as
    /// `[(i+1, j), (i+1, j+1), (i, j+1), (i, j)]` for outward-facing normals
    /// on the sphere.
    pub fn from_regular_grid(rows: usize, cols: usize) -> Self {
        let node_cols = cols + 1;
        let node = |i: usize, j: usize| i * node_cols + j;
        let mut connectivity = Self::with_capacity(rows * cols, rows * cols * 4);
        for i in 0..rows {
            for j in 0..cols {
                connectivity.push_face(&[
                    node(i + 1, j),
                    node(i + 1, j + 1),
                    node(i, j + 1),
                    node(i, j),
                ]);
            }
        }
        connectivity
    }

    /// Create empty connectivity with reserved capacity.
    pub fn with_capacity(faces: usize, indices: usize) -> Self {
        let mut offsets = Vec::with_capacity(faces + 1);
        offsets.push(0);
        Self {
            offsets,
            indices: Vec::with_capacity(indices),
        }
    }

    /// Append a face.
    pub fn push_face(&mut self, face: &[usize]) {
        self.indices.extend_from_slice(face);
        self.offsets.push(self.indices.len());
    }

    /// Number of faces.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Whether there are no faces.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of stored indices.
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// The ordered vertex indices of face `i`.
    pub fn face(&self, i: usize) -> &[usize] {
        &self.indices[self.offsets[i]..self.offsets[i + 1]]
    }

    /// Iterate over faces.
    pub fn iter(&self) -> impl Iterator<Item = &[usize]> + '_ {
        (0..self.len()).map(move |i| self.face(i))
    }

    /// The largest referenced point index, if any faces exist.
    pub fn max_index(&self) -> Option<usize> {
        self.indices.iter().copied().max()
    }

    /// Whether every face has exactly `n` vertices.
    pub fn is_uniform(&self, n: usize) -> bool {
        !self.is_empty() && self.iter().all(|face| face.len() == n)
    }

    /// Serialize as a count-prefixed stream: `[count, v0, .., vN]` per face.
    ///
    /// This is the flat layout generic polygon-mesh consumers expect.
    pub fn to_stream(&self) -> Vec<usize> {
        let mut stream = Vec::with_capacity(self.indices.len() + self.len());
        for face in self.iter() {
            stream.push(face.len());
            stream.extend_from_slice(face);
        }
        stream
    }

    /// Check that every index is strictly below `n_points`.
    pub fn validate(&self, n_points: usize) -> Result<()> {
        for (i, face) in self.iter().enumerate() {
            for &index in face {
                if index >= n_points {
                    return Err(GeoError::InvalidPointIndex {
                        face: i,
                        index,
                        n_points,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Connectivity supplied as a padded rectangular array with a validity mask.
///
/// This is the wire form unstructured climate grids arrive in: an
/// `(rows, cols)` integer array where masked entries pad faces with fewer
/// than `cols` vertices. [`MaskedConnectivity::compact`] converts it to the
/// ragged [`Connectivity`] form, applying the start index.
#[derive(Debug, Clone)]
pub struct MaskedConnectivity {
    values: Vec<i64>,
    mask: Vec<bool>,
    rows: usize,
    cols: usize,
}

impl MaskedConnectivity {
    /// Create from row-major values and a mask (`true` means masked out).
    ///
    /// # Errors
    /// Returns an error if the value or mask lengths do not equal
    /// `rows * cols`.
    pub fn new(rows: usize, cols: usize, values: Vec<i64>, mask: Vec<bool>) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(GeoError::ShapeMismatch {
                context: "masked connectivity values",
                expected: format!("{rows}x{cols} = {} values", rows * cols),
                actual: format!("{} values", values.len()),
            });
        }
        if mask.len() != values.len() {
            return Err(GeoError::ShapeMismatch {
                context: "masked connectivity mask",
                expected: format!("{} flags", values.len()),
                actual: format!("{} flags", mask.len()),
            });
        }
        Ok(Self {
            values,
            mask,
            rows,
            cols,
        })
    }

    /// Create from a fully valid rectangular array (no masked entries).
    pub fn dense(rows: usize, cols: usize, values: Vec<i64>) -> Result<Self> {
        let mask = vec![false; values.len()];
        Self::new(rows, cols, values, mask)
    }

    /// Create from ragged per-face index lists, padding shorter faces.
    pub fn from_ragged(faces: &[Vec<i64>]) -> Self {
        let cols = faces.iter().map(Vec::len).max().unwrap_or(0);
        let rows = faces.len();
        let mut values = Vec::with_capacity(rows * cols);
        let mut mask = Vec::with_capacity(rows * cols);
        for face in faces {
            for j in 0..cols {
                values.push(face.get(j).copied().unwrap_or(0));
                mask.push(j >= face.len());
            }
        }
        Self {
            values,
            mask,
            rows,
            cols,
        }
    }

    /// Number of faces (rows).
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether there are no faces.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// The smallest unmasked index, used for start-index auto-detection.
    pub fn min_index(&self) -> Option<i64> {
        self.values
            .iter()
            .zip(self.mask.iter())
            .filter(|(_, &masked)| !masked)
            .map(|(&value, _)| value)
            .min()
    }

    /// The unmasked indices of face `i`, with `start_index` subtracted.
    pub fn face_vertices(&self, i: usize, start_index: i64) -> Vec<usize> {
        let row = i * self.cols..(i + 1) * self.cols;
        self.values[row.clone()]
            .iter()
            .zip(self.mask[row].iter())
            .filter(|(_, &masked)| !masked)
            .map(|(&value, _)| (value - start_index) as usize)
            .collect()
    }

    /// Convert to ragged connectivity, dropping faces left with fewer than 3
    /// vertices after mask removal.
    ///
    /// Returns the connectivity and the original row index of each retained
    /// face, so per-cell payloads can stay aligned. Dropped faces are
    /// reported with a warning.
    pub fn compact(&self, start_index: i64) -> (Connectivity, Vec<usize>) {
        let mut connectivity = Connectivity::with_capacity(self.rows, self.values.len());
        let mut kept = Vec::with_capacity(self.rows);
        for i in 0..self.rows {
            let face = self.face_vertices(i, start_index);
            if face.len() < 3 {
                log::warn!(
                    "dropping face {i}: only {} valid vertices after mask removal",
                    face.len()
                );
                continue;
            }
            connectivity.push_face(&face);
            kept.push(i);
        }
        (connectivity, kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_face() {
        let mut connectivity = Connectivity::new();
        connectivity.push_face(&[0, 1, 2]);
        connectivity.push_face(&[2, 1, 3, 4]);
        assert_eq!(connectivity.len(), 2);
        assert_eq!(connectivity.face(0), &[0, 1, 2]);
        assert_eq!(connectivity.face(1), &[2, 1, 3, 4]);
        assert_eq!(connectivity.index_count(), 7);
        assert_eq!(connectivity.max_index(), Some(4));
    }

    #[test]
    fn test_regular_grid() {
        // 2x3 cells over a 3x4 node grid.
        let connectivity = Connectivity::from_regular_grid(2, 3);
        assert_eq!(connectivity.len(), 6);
        assert!(connectivity.is_uniform(4));
        // First cell: nodes (1,0), (1,1), (0,1), (0,0) with 4 node columns.
        assert_eq!(connectivity.face(0), &[4, 5, 1, 0]);
        assert_eq!(connectivity.max_index(), Some(11));
    }

    #[test]
    fn test_to_stream_counts() {
        let connectivity = Connectivity::from_faces([[0, 1, 2, 3].as_slice()]);
        assert_eq!(connectivity.to_stream(), vec![4, 0, 1, 2, 3]);
    }

    #[test]
    fn test_validate_index_bound() {
        let connectivity = Connectivity::from_faces([[0, 1, 5].as_slice()]);
        assert!(connectivity.validate(6).is_ok());
        assert!(connectivity.validate(5).is_err());
    }

    #[test]
    fn test_masked_compact_drops_degenerate() {
        // Row 0 keeps 4 vertices, row 1 keeps only 2 and is dropped.
        let masked = MaskedConnectivity::new(
            2,
            4,
            vec![1, 2, 3, 4, 5, 6, 0, 0],
            vec![false, false, false, false, false, false, true, true],
        )
        .unwrap();
        assert_eq!(masked.min_index(), Some(1));
        let (connectivity, kept) = masked.compact(1);
        assert_eq!(connectivity.len(), 1);
        assert_eq!(connectivity.face(0), &[0, 1, 2, 3]);
        assert_eq!(kept, vec![0]);
    }

    #[test]
    fn test_from_ragged() {
        let masked =
            MaskedConnectivity::from_ragged(&[vec![0, 1, 2, 3, 4], vec![4, 3, 5]]);
        let (connectivity, kept) = masked.compact(0);
        assert_eq!(connectivity.len(), 2);
        assert_eq!(connectivity.face(0).len(), 5);
        assert_eq!(connectivity.face(1), &[4, 3, 5]);
        assert_eq!(kept, vec![0, 1]);
    }
}
