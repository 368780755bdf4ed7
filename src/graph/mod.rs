//! Landmark neighbor graph.
//!
//! Every `nskip`-th point is a landmark. Each point is linked to its `n_neigh`
//! nearest landmarks, found either with one global search or, when the
//! recording is split in time, with a global search merged against searches
//! restricted to time-local windows of landmarks. The resulting edges form a
//! sparse `n_points × n_landmarks` affinity matrix whose self-connections
//! (landmark point to its own column) are zeroed.
//!
//! ```text
//! X ──stride──▶ landmarks ──search──▶ kn ──CSR──▶ M (self-connections zeroed)
//!                   │                  ▲
//!                   └─windows─▶ kn_local┘ (merge, n_splits > 1)
//! ```

pub mod affinity;
pub mod search;
pub mod split;

use ndarray::{s, Array2, ArrayView2};

pub use affinity::{AffinityMatrix, DegreeStats};
pub use search::knn_search;
pub use split::{merge_neighbors, sample_ranges, split_ranges};

use crate::error::{ClusterError, Result};

/// Number of landmarks obtained by striding `n_points` with `nskip`.
pub fn landmark_count(n_points: usize, nskip: usize) -> usize {
    if n_points == 0 || nskip == 0 {
        0
    } else {
        (n_points - 1) / nskip + 1
    }
}

/// Neighbor index and affinity matrix for one point set.
#[derive(Clone, Debug)]
pub struct NeighborGraph {
    /// `n_points × n_neigh` landmark indices.
    pub kn: Array2<usize>,
    /// Sparse point × landmark affinity with self-connections zeroed.
    pub affinity: AffinityMatrix,
    /// Landmark stride the graph was built with.
    pub nskip: usize,
}

impl NeighborGraph {
    /// Wrap an existing neighbor index, building its affinity matrix.
    pub fn from_neighbors(kn: Array2<usize>, n_points: usize, nskip: usize) -> Result<Self> {
        if kn.nrows() != n_points {
            return Err(ClusterError::DimensionMismatch {
                what: "neighbor index rows",
                expected: n_points,
                got: kn.nrows(),
            });
        }
        let n_landmarks = landmark_count(n_points, nskip);
        let mut affinity = AffinityMatrix::from_neighbors(kn.view(), n_landmarks)?;
        affinity.zero_self_connections(nskip);
        Ok(Self { kn, affinity, nskip })
    }

    /// Number of points (rows of `kn`).
    pub fn n_points(&self) -> usize {
        self.kn.nrows()
    }

    /// Number of landmarks (columns of the affinity matrix).
    pub fn n_landmarks(&self) -> usize {
        self.affinity.n_cols()
    }

    /// Neighbors kept per point.
    pub fn n_neigh(&self) -> usize {
        self.kn.ncols()
    }
}

/// Build the neighbor graph of `x` against its strided landmarks.
///
/// With `n_splits > 1` the global search is merged with window-local searches
/// (see [`split::merge_neighbors`]).
pub fn build_neighbor_graph(
    x: ArrayView2<'_, f32>,
    nskip: usize,
    n_neigh: usize,
    n_splits: usize,
    overlap: f64,
) -> Result<NeighborGraph> {
    if nskip == 0 || n_neigh == 0 || n_splits == 0 {
        return Err(ClusterError::config("nskip, n_neigh and n_splits must be > 0"));
    }
    let n_points = x.nrows();
    if n_points == 0 {
        return Err(ClusterError::EmptyInput("feature matrix has no rows"));
    }
    let landmarks = x.slice(s![..;nskip, ..]);
    let n_landmarks = landmarks.nrows();
    if n_neigh > n_landmarks {
        return Err(ClusterError::config(format!(
            "n_neigh ({n_neigh}) exceeds the number of landmarks ({n_landmarks})"
        )));
    }

    let global = [(0, n_landmarks)];
    let kn1 = windowed_search(x, landmarks, &global, &[(0, n_points)], n_neigh)?;

    let kn = if n_splits > 1 {
        let splits = split_ranges(n_landmarks, n_splits, overlap);
        split::validate_windows(&splits, n_neigh)?;
        let ranges = sample_ranges(&splits, nskip, n_points);
        let kn2 = windowed_search(x, landmarks, &splits, &ranges, n_neigh)?;
        tracing::debug!(
            n_points,
            n_landmarks,
            windows = splits.len(),
            "merging global and time-local neighbors"
        );
        merge_neighbors(kn1.view(), kn2.view())?
    } else {
        kn1
    };

    NeighborGraph::from_neighbors(kn, n_points, nskip)
}

/// Search each point range against its landmark window, in global landmark numbering.
fn windowed_search(
    x: ArrayView2<'_, f32>,
    landmarks: ArrayView2<'_, f32>,
    splits: &[split::Range],
    ranges: &[split::Range],
    n_neigh: usize,
) -> Result<Array2<usize>> {
    let mut kn = Array2::<usize>::zeros((x.nrows(), n_neigh));
    for (&(l0, l1), &(p0, p1)) in splits.iter().zip(ranges) {
        if p0 >= p1 {
            continue;
        }
        let found = knn_search(
            x.slice(s![p0..p1, ..]),
            landmarks.slice(s![l0..l1, ..]),
            n_neigh,
        )?;
        kn.slice_mut(s![p0..p1, ..]).assign(&found.mapv(|j| j + l0));
    }
    Ok(kn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn line(n: usize) -> Array2<f32> {
        Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f32 } else { 0.0 })
    }

    #[test]
    fn test_landmark_count() {
        assert_eq!(landmark_count(0, 3), 0);
        assert_eq!(landmark_count(1, 3), 1);
        assert_eq!(landmark_count(6, 3), 2);
        assert_eq!(landmark_count(7, 3), 3);
    }

    #[test]
    fn test_entries_are_valid_landmarks() {
        let x = line(50);
        let g = build_neighbor_graph(x.view(), 4, 3, 1, 0.75).unwrap();
        assert_eq!(g.kn.dim(), (50, 3));
        assert_eq!(g.n_landmarks(), 13);
        assert!(g.kn.iter().all(|&j| j < 13));
    }

    #[test]
    fn test_diagonal_is_zero() {
        let x = line(30);
        let g = build_neighbor_graph(x.view(), 3, 2, 1, 0.75).unwrap();
        for l in 0..g.n_landmarks() {
            assert_eq!(g.affinity.get(l * 3, l), 0.0);
        }
        // landmark points find themselves first, so one unit per landmark is dropped
        assert_eq!(g.affinity.sum(), (30 * 2 - g.n_landmarks()) as f64);
    }

    #[test]
    fn test_split_graph_keeps_shape() {
        let x = line(200);
        let g = build_neighbor_graph(x.view(), 2, 4, 3, 0.5).unwrap();
        assert_eq!(g.kn.dim(), (200, 4));
        assert!(g.kn.iter().all(|&j| j < 100));
    }

    #[test]
    fn test_too_many_neighbors_rejected() {
        let x = line(10);
        assert!(build_neighbor_graph(x.view(), 5, 3, 1, 0.75).is_err());
    }
}
