//! Exact nearest-landmark search.
//!
//! Brute force over squared Euclidean distance, parallel across query rows.
//! Each result row is ordered by ascending distance; equal distances go to the
//! lower landmark index, so the output is identical for identical input.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::error::{ClusterError, Result};

/// Find the `k` nearest rows of `index` for every row of `queries`.
///
/// Returns a `queries.nrows() × k` matrix of row indices into `index`.
/// `k` must not exceed `index.nrows()`.
pub fn knn_search(
    queries: ArrayView2<'_, f32>,
    index: ArrayView2<'_, f32>,
    k: usize,
) -> Result<Array2<usize>> {
    if queries.ncols() != index.ncols() {
        return Err(ClusterError::DimensionMismatch {
            what: "feature dimension",
            expected: index.ncols(),
            got: queries.ncols(),
        });
    }
    if k > index.nrows() {
        return Err(ClusterError::config(format!(
            "n_neigh ({k}) exceeds the {} landmarks available to the search",
            index.nrows()
        )));
    }

    let n = queries.nrows();
    if k == 0 {
        return Ok(Array2::zeros((n, 0)));
    }
    let mut out = vec![0usize; n * k];

    out.par_chunks_mut(k).enumerate().for_each(|(i, slot)| {
        let q = queries.row(i);
        let mut dist: Vec<(f32, usize)> = index
            .rows()
            .into_iter()
            .enumerate()
            .map(|(j, r)| (sq_dist(q, r), j))
            .collect();
        let order = |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if k < dist.len() {
            dist.select_nth_unstable_by(k - 1, order);
            dist.truncate(k);
        }
        dist.sort_unstable_by(order);
        for (s, (_, j)) in slot.iter_mut().zip(dist) {
            *s = j;
        }
    });

    let len = out.len();
    Array2::from_shape_vec((n, k), out).map_err(|_| ClusterError::DimensionMismatch {
        what: "neighbor index",
        expected: n * k,
        got: len,
    })
}

fn sq_dist(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_nearest_first() {
        let index = array![[0.0f32, 0.0], [10.0, 0.0], [5.0, 0.0]];
        let queries = array![[9.0f32, 0.0], [1.0, 0.0]];
        let kn = knn_search(queries.view(), index.view(), 2).unwrap();
        assert_eq!(kn.row(0).to_vec(), vec![1, 2]);
        assert_eq!(kn.row(1).to_vec(), vec![0, 2]);
    }

    #[test]
    fn test_ties_go_to_lower_index() {
        let index = array![[1.0f32], [-1.0], [1.0]];
        let queries = array![[0.0f32]];
        let kn = knn_search(queries.view(), index.view(), 3).unwrap();
        assert_eq!(kn.row(0).to_vec(), vec![0, 1, 2]);
    }

    #[test]
    fn test_k_larger_than_index_rejected() {
        let index = array![[1.0f32]];
        let queries = array![[0.0f32]];
        assert!(knn_search(queries.view(), index.view(), 2).is_err());
    }

    #[test]
    fn test_feature_mismatch_rejected() {
        let index = array![[1.0f32, 2.0]];
        let queries = array![[0.0f32]];
        assert!(knn_search(queries.view(), index.view(), 1).is_err());
    }
}
