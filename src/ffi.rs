//! Python FFI bindings via PyO3.
//!
//! Exposes the clustering core to Python with nested lists as the array type.
//! For large recordings use the Rust API directly to avoid the copies.
//!
//! # Building the Python extension
//!
//! ```bash
//! pip install maturin
//! maturin develop --features python-ffi
//! ```
//!
//! # Usage
//!
//! ```python
//! import spike_cluster as sc
//!
//! x = [[10.0, 10.0], [10.1, 10.0], [-10.0, -10.0], [-10.0, -10.1]]
//! labels, landmark_labels, initial, n = sc.cluster(x, nskip=1, n_neigh=1, n_clusters=2, niter=5)
//! kn = sc.build_neighbor_graph(x, nskip=1, n_neigh=2)
//! mask, rev = sc.subsample_idx(6, 3)   # [F, T, F, T, T, F], [1, 3, 4]
//! ```

use ndarray::Array2;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::ClusterConfig;
use crate::error::ClusterError;

fn to_py_err(e: ClusterError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Copy nested rows into a dense matrix; every row must have the same length.
fn rows_to_array<T: Copy + Default>(rows: Vec<Vec<T>>, what: &str) -> PyResult<Array2<T>> {
    let n = rows.len();
    let d = rows.first().map_or(0, Vec::len);
    if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != d) {
        return Err(PyValueError::new_err(format!(
            "{what}: row {i} has {} columns, expected {d}",
            r.len()
        )));
    }
    let flat: Vec<T> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n, d), flat).map_err(|e| PyValueError::new_err(format!("{what}: {e}")))
}

/// Cluster the rows of `x`.
///
/// Returns `(labels, landmark_labels, initial_labels, n_clusters)`.
#[pyfunction]
#[pyo3(signature = (
    x, kn=None, initial=None, nskip=20, n_neigh=10, n_clusters=200, seed=1,
    niter=200, lam=0.0, n_splits=1, overlap=0.75, verbose=false
))]
#[allow(clippy::too_many_arguments)]
fn cluster(
    x: Vec<Vec<f32>>,
    kn: Option<Vec<Vec<usize>>>,
    initial: Option<Vec<usize>>,
    nskip: usize,
    n_neigh: usize,
    n_clusters: usize,
    seed: u64,
    niter: usize,
    lam: f64,
    n_splits: usize,
    overlap: f64,
    verbose: bool,
) -> PyResult<(Vec<usize>, Vec<usize>, Vec<usize>, usize)> {
    let x = rows_to_array(x, "x")?;
    let kn = kn.map(|k| rows_to_array(k, "kn")).transpose()?;
    let config = ClusterConfig {
        nskip,
        n_neigh,
        n_clusters,
        seed,
        niter,
        lam,
        n_splits,
        overlap,
        verbose,
    };
    let out = crate::engine::cluster(x.view(), kn, initial.as_deref(), &config).map_err(to_py_err)?;
    Ok((out.labels, out.landmark_labels, out.initial_labels, out.n_clusters))
}

/// Neighbor index `kn` (one list of landmark indices per point).
#[pyfunction]
#[pyo3(signature = (x, nskip=20, n_neigh=10, n_splits=1, overlap=0.75))]
fn build_neighbor_graph(
    x: Vec<Vec<f32>>,
    nskip: usize,
    n_neigh: usize,
    n_splits: usize,
    overlap: f64,
) -> PyResult<Vec<Vec<usize>>> {
    let x = rows_to_array(x, "x")?;
    let graph = crate::graph::build_neighbor_graph(x.view(), nskip, n_neigh, n_splits, overlap)
        .map_err(to_py_err)?;
    Ok(graph.kn.rows().into_iter().map(|r| r.to_vec()).collect())
}

/// Greedy seeding labels for the rows of `x`.
#[pyfunction]
#[pyo3(signature = (x, n_seeds, seed=1))]
fn seed_centroids(x: Vec<Vec<f32>>, n_seeds: usize, seed: u64) -> PyResult<Vec<usize>> {
    let x = rows_to_array(x, "x")?;
    crate::seed::seed_centroids(x.view(), n_seeds, seed).map_err(to_py_err)
}

/// Keep mask and reverse index after evenly removing `n2` of `n1` indices.
#[pyfunction]
fn subsample_idx(n1: usize, n2: usize) -> (Vec<bool>, Vec<usize>) {
    crate::seed::subsample_idx(n1, n2)
}

/// spike_cluster: graph-based spike clustering core.
///
/// Landmark neighbor graphs, greedy seeding and degree-corrected alternating
/// bipartite clustering.
#[pymodule]
pub fn spike_cluster(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(cluster, m)?)?;
    m.add_function(wrap_pyfunction!(build_neighbor_graph, m)?)?;
    m.add_function(wrap_pyfunction!(seed_centroids, m)?)?;
    m.add_function(wrap_pyfunction!(subsample_idx, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("N_CANDIDATES", crate::seed::N_CANDIDATES)?;
    Ok(())
}
