//! Sparse point × landmark affinity matrix and its degree statistics.
//!
//! The matrix is a [`sprs::CsMat`] in CSR form built from a triplet list with
//! one unit of weight per neighbor edge; repeated neighbor entries sum on
//! conversion. Entries removed by [`AffinityMatrix::zero_self_connections`]
//! keep their slot with weight 0, so the sparsity pattern always mirrors the
//! neighbor index.

use ndarray::ArrayView2;
use sprs::{CsMat, TriMat};

use crate::error::{ClusterError, Result};

/// Sparse `n_points × n_landmarks` matrix with one unit of weight per neighbor edge.
#[derive(Clone, Debug, PartialEq)]
pub struct AffinityMatrix {
    csr: CsMat<f32>,
}

impl AffinityMatrix {
    /// Build the matrix from a neighbor index (`kn[i, k]` = landmark of point `i`).
    ///
    /// Fails if any entry is not a valid landmark index.
    pub fn from_neighbors(kn: ArrayView2<'_, usize>, n_landmarks: usize) -> Result<Self> {
        let mut tri = TriMat::<f32>::with_capacity((kn.nrows(), n_landmarks), kn.len());
        for ((i, _), &j) in kn.indexed_iter() {
            if j >= n_landmarks {
                return Err(ClusterError::DimensionMismatch {
                    what: "neighbor landmark index",
                    expected: n_landmarks,
                    got: j,
                });
            }
            tri.add_triplet(i, j, 1.0);
        }
        Ok(Self { csr: tri.to_csr() })
    }

    /// Zero the entry linking each landmark point to its own landmark column.
    ///
    /// Landmark `l` is point `l * nskip`.
    pub fn zero_self_connections(&mut self, nskip: usize) {
        for l in 0..self.n_cols() {
            let i = l * nskip;
            if i >= self.n_rows() {
                break;
            }
            if let Some(w) = self.csr.get_mut(i, l) {
                *w = 0.0;
            }
        }
    }

    /// Underlying CSR matrix.
    pub fn as_csr(&self) -> &CsMat<f32> {
        &self.csr
    }

    /// Number of rows (points).
    pub fn n_rows(&self) -> usize {
        self.csr.rows()
    }

    /// Number of columns (landmarks).
    pub fn n_cols(&self) -> usize {
        self.csr.cols()
    }

    /// Number of stored entries, including explicitly zeroed ones.
    pub fn nnz(&self) -> usize {
        self.csr.nnz()
    }

    /// Weight at `(row, col)`; 0 when no entry is stored.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        if row >= self.n_rows() || col >= self.n_cols() {
            return 0.0;
        }
        self.csr.get(row, col).copied().unwrap_or(0.0)
    }

    /// Total weight `m`.
    pub fn sum(&self) -> f64 {
        self.csr.data().iter().map(|&w| w as f64).sum()
    }

    /// Weight summed along each row.
    pub fn row_sums(&self) -> Vec<f64> {
        self.csr
            .outer_iterator()
            .map(|row| row.data().iter().map(|&w| w as f64).sum())
            .collect()
    }

    /// Weight summed down each column.
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0f64; self.n_cols()];
        for row in self.csr.outer_iterator() {
            for (j, &w) in row.iter() {
                sums[j] += w as f64;
            }
        }
        sums
    }

    /// Total mass and rescaled degree vectors used as the null model.
    pub fn degree_stats(&self) -> DegreeStats {
        DegreeStats::from_matrix(self)
    }
}

// ─── DegreeStats ─────────────────────────────────────────────────────────────

/// Total mass `m` and degree vectors `ki` (rows) / `kj` (columns).
///
/// Each vector is rescaled so that it sums to `m`.
#[derive(Clone, Debug, PartialEq)]
pub struct DegreeStats {
    /// Total weight of the affinity matrix.
    pub m: f64,
    /// Per-point degree, rescaled to sum to `m`.
    pub ki: Vec<f64>,
    /// Per-landmark degree, rescaled to sum to `m`.
    pub kj: Vec<f64>,
}

impl DegreeStats {
    /// Compute the statistics of `matrix`.
    pub fn from_matrix(matrix: &AffinityMatrix) -> Self {
        let m = matrix.sum();
        Self {
            m,
            ki: rescale(matrix.row_sums(), m),
            kj: rescale(matrix.col_sums(), m),
        }
    }
}

fn rescale(mut v: Vec<f64>, m: f64) -> Vec<f64> {
    let total: f64 = v.iter().sum();
    if total > 0.0 {
        for x in &mut v {
            *x = m * *x / total;
        }
    }
    v
}
