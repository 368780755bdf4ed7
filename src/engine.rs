//! Degree-corrected alternating bipartite clustering.
//!
//! Points and landmarks share one label space. Each iteration:
//!
//! 1. every landmark collects one vote per incident neighbor edge, grouped by
//!    the point's label, and takes the best label;
//! 2. every point collects one vote per neighbor landmark, grouped by the
//!    landmark's label, and takes the best label.
//!
//! With `lam > 0` a null-model penalty is subtracted before the arg-max:
//!
//! ```text
//! landmark l, label c:  votes − lam/m · kj[l] · Σ_{i: iclust[i]=c} ki[i]
//! point i,    label c:  votes − lam/m · ki[i] · Σ_{l: isub[l]=c}   kj[l]
//! ```
//!
//! which discourages labels from growing simply because they already hold many
//! high-degree nodes.
//!
//! The per-label mass is a sum of degrees, not a member count. A point's degree
//! is about `n_neigh`, so at a given `lam` the penalty is roughly `n_neigh`
//! times that of a member-count null model. Scale `lam` down by `n_neigh` to
//! compare against count-based settings. The arg-max resolves ties to the lowest label. The loop
//! always runs the full iteration budget; labels are then compacted to
//! `0..k` and landmark labels recomputed once against the compacted labels.

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::config::ClusterConfig;
use crate::error::{try_dense_zeros, ClusterError, Result};
use crate::graph::{build_neighbor_graph, AffinityMatrix, DegreeStats, NeighborGraph};
use crate::seed::GreedySeeder;

/// Output of one clustering call.
#[derive(Clone, Debug)]
pub struct ClusterOutput {
    /// Compacted label per point, in `0..n_clusters`.
    pub labels: Vec<usize>,
    /// Label per landmark, consistent with `labels`.
    pub landmark_labels: Vec<usize>,
    /// Affinity matrix the degree statistics were taken from.
    pub affinity: AffinityMatrix,
    /// Labels the alternation started from (seeded or caller-supplied).
    pub initial_labels: Vec<usize>,
    /// Number of non-empty clusters.
    pub n_clusters: usize,
}

/// Cluster the rows of `x`.
///
/// `kn` reuses a precomputed neighbor index (built with `config.nskip`);
/// otherwise one is built from `x`. `initial` supplies starting labels in
/// `0..config.n_clusters`; otherwise the greedy seeder produces them.
pub fn cluster(
    x: ArrayView2<'_, f32>,
    kn: Option<Array2<usize>>,
    initial: Option<&[usize]>,
    config: &ClusterConfig,
) -> Result<ClusterOutput> {
    config.validate()?;
    let n = x.nrows();
    if n == 0 {
        return Err(ClusterError::EmptyInput("feature matrix has no rows"));
    }

    let graph = match kn {
        Some(kn) => {
            if kn.ncols() == 0 {
                return Err(ClusterError::EmptyInput("neighbor index has no columns"));
            }
            NeighborGraph::from_neighbors(kn, n, config.nskip)?
        }
        None => build_neighbor_graph(
            x,
            config.nskip,
            config.n_neigh,
            config.n_splits,
            config.overlap,
        )?,
    };
    let stats = graph.affinity.degree_stats();

    if config.verbose {
        tracing::debug!(
            m = stats.m,
            ki_mib = mib(stats.ki.len() * 8),
            kj_mib = mib(stats.kj.len() * 8),
            kn_mib = mib(graph.kn.len() * std::mem::size_of::<usize>()),
            x_mib = mib(x.len() * 4),
            shape = ?x.dim(),
            "neighbor graph ready"
        );
    }

    let initial_labels = match initial {
        Some(labels) => {
            if labels.len() != n {
                return Err(ClusterError::DimensionMismatch {
                    what: "initial labels",
                    expected: n,
                    got: labels.len(),
                });
            }
            if let Some(&bad) = labels.iter().find(|&&c| c >= config.n_clusters) {
                return Err(ClusterError::config(format!(
                    "initial label {bad} outside 0..{}",
                    config.n_clusters
                )));
            }
            labels.to_vec()
        }
        None => GreedySeeder::new(x, config.seed)?.run(config.n_clusters)?.labels,
    };

    let alt = LabelAlternation::new(graph.kn.view(), &stats, graph.n_landmarks(), config.lam);
    let mut labels = initial_labels.clone();
    for t in 0..config.niter {
        let isub = alt.landmark_labels(&labels, config.n_clusters, t)?;
        labels = alt.point_labels(&isub, config.n_clusters, t)?;
    }

    let (labels, n_clusters) = compact_labels(&labels);
    let landmark_labels = alt.landmark_labels(&labels, n_clusters, config.niter)?;

    if config.verbose {
        tracing::debug!(
            n_clusters,
            isub_mib = mib(landmark_labels.len() * std::mem::size_of::<usize>()),
            "alternation finished"
        );
    }

    Ok(ClusterOutput {
        labels,
        landmark_labels,
        affinity: graph.affinity,
        initial_labels,
        n_clusters,
    })
}

fn mib(bytes: usize) -> f64 {
    bytes as f64 / (1u64 << 20) as f64
}

// ─── LabelAlternation ────────────────────────────────────────────────────────

/// The two half-steps of the alternation over a fixed neighbor index.
pub struct LabelAlternation<'g> {
    kn: ArrayView2<'g, usize>,
    stats: &'g DegreeStats,
    n_landmarks: usize,
    lam: f64,
}

impl<'g> LabelAlternation<'g> {
    /// Bind the neighbor index and degree statistics.
    pub fn new(
        kn: ArrayView2<'g, usize>,
        stats: &'g DegreeStats,
        n_landmarks: usize,
        lam: f64,
    ) -> Self {
        Self { kn, stats, n_landmarks, lam }
    }

    /// Penalty scale `lam / m`, or `None` when the null model is off or undefined.
    fn penalty(&self) -> Option<f64> {
        (self.lam > 0.0 && self.stats.m > 0.0).then(|| self.lam / self.stats.m)
    }

    /// Best label for every landmark given the point labels.
    pub fn landmark_labels(
        &self,
        labels: &[usize],
        n_clusters: usize,
        iteration: usize,
    ) -> Result<Vec<usize>> {
        let mut scores = try_dense_zeros("landmark scores", iteration, self.n_landmarks, n_clusters)?;
        for (row, &c) in self.kn.rows().into_iter().zip(labels) {
            for &j in row.iter() {
                scores[j * n_clusters + c] += 1.0;
            }
        }

        if let Some(scale) = self.penalty() {
            let mut mass = vec![0.0f64; n_clusters];
            for (&c, &k) in labels.iter().zip(&self.stats.ki) {
                mass[c] += k;
            }
            subtract_null_model(&mut scores, n_clusters, &self.stats.kj, &mass, scale);
        }

        Ok(row_argmax(&scores, n_clusters))
    }

    /// Best label for every point given the landmark labels.
    pub fn point_labels(
        &self,
        landmark_labels: &[usize],
        n_clusters: usize,
        iteration: usize,
    ) -> Result<Vec<usize>> {
        let n = self.kn.nrows();
        let mut scores = try_dense_zeros("point scores", iteration, n, n_clusters)?;
        for (i, row) in self.kn.rows().into_iter().enumerate() {
            for &j in row.iter() {
                scores[i * n_clusters + landmark_labels[j]] += 1.0;
            }
        }

        if let Some(scale) = self.penalty() {
            let mut mass = vec![0.0f64; n_clusters];
            for (&c, &k) in landmark_labels.iter().zip(&self.stats.kj) {
                mass[c] += k;
            }
            subtract_null_model(&mut scores, n_clusters, &self.stats.ki, &mass, scale);
        }

        Ok(row_argmax(&scores, n_clusters))
    }
}

/// `scores[r, c] -= scale * degree[r] * mass[c]`.
fn subtract_null_model(
    scores: &mut [f32],
    n_clusters: usize,
    degree: &[f64],
    mass: &[f64],
    scale: f64,
) {
    scores
        .par_chunks_mut(n_clusters)
        .zip(degree.par_iter())
        .for_each(|(row, &d)| {
            for (s, &mc) in row.iter_mut().zip(mass) {
                *s -= (scale * d * mc) as f32;
            }
        });
}

/// Arg-max of every row; the lowest column wins ties.
fn row_argmax(scores: &[f32], n_cols: usize) -> Vec<usize> {
    scores
        .par_chunks(n_cols)
        .map(|row| {
            let mut best = 0;
            for (c, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = c;
                }
            }
            best
        })
        .collect()
}

/// Renumber labels to `0..k` in increasing order of the original label, dropping unused ones.
pub fn compact_labels(labels: &[usize]) -> (Vec<usize>, usize) {
    let Some(&max) = labels.iter().max() else {
        return (Vec::new(), 0);
    };
    let mut remap = vec![usize::MAX; max + 1];
    for &c in labels {
        remap[c] = 0;
    }
    let mut k = 0;
    for slot in remap.iter_mut() {
        if *slot == 0 {
            *slot = k;
            k += 1;
        }
    }
    (labels.iter().map(|&c| remap[c]).collect(), k)
}
