//! Greedy variance-explained seeding.
//!
//! Picks cluster centroids one round at a time without a full distance matrix.
//! For each point the seeder tracks the best variance explained so far,
//! `vexp0`, against its total variance `vtot = ||x||²`. A round samples
//! [`N_CANDIDATES`] points with probability proportional to their unexplained
//! variance `relu(vtot - vexp0)`, scores every candidate `c` by the total
//! positive gain `Σ relu(2·x·c − ||c||² − vexp0)`, keeps the best one and
//! moves every point with a strictly positive gain into the new cluster.
//!
//! `vexp0` never decreases, so a point only changes label when the new
//! centroid explains it strictly better. The result is an initialisation for
//! [`crate::engine`], not a converged k-means.

use ndarray::{linalg::general_mat_mul, Array1, Array2, ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{try_dense_zeros, ClusterError, Result};

/// Candidate centroids tested per round.
pub const N_CANDIDATES: usize = 100;

/// Largest pool the candidate sampler draws from directly.
///
/// Larger point sets are thinned with [`subsample_idx`] before sampling; gains
/// and assignments still cover every point.
pub const MAX_SAMPLING_POOL: usize = 1 << 24;

// ─── subsample_idx ───────────────────────────────────────────────────────────

/// Evenly remove `n2` of the indices `0..n1`.
///
/// Removed positions are `round(linspace(0, n1 - 1, n2))` with ties rounded to
/// even. Returns the keep-mask and, for each kept position, its original index.
///
/// ```
/// let (mask, rev) = spike_cluster::seed::subsample_idx(6, 3);
/// assert_eq!(mask, vec![false, true, false, true, true, false]);
/// assert_eq!(rev, vec![1, 3, 4]);
/// ```
pub fn subsample_idx(n1: usize, n2: usize) -> (Vec<bool>, Vec<usize>) {
    let mut mask = vec![true; n1];
    if n1 > 0 {
        let last = (n1 - 1) as f64;
        let step = if n2 > 1 { last / (n2 - 1) as f64 } else { 0.0 };
        for k in 0..n2 {
            let pos = if n2 > 1 && k == n2 - 1 { last } else { k as f64 * step };
            let idx = (pos.round_ties_even() as usize).min(n1 - 1);
            mask[idx] = false;
        }
    }
    let rev = mask
        .iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect();
    (mask, rev)
}

// ─── GreedySeeder ────────────────────────────────────────────────────────────

/// Result of a completed seeding run.
#[derive(Clone, Debug)]
pub struct Seeding {
    /// Seed label per point; label `r` was created in round `r`.
    pub labels: Vec<usize>,
    /// Centroid chosen in each round (`rounds × n_features`); zero rows for skipped rounds.
    pub centroids: Array2<f32>,
    /// Best variance explained per point.
    pub explained: Vec<f32>,
}

/// Round-by-round state of the greedy seeder.
pub struct GreedySeeder<'a> {
    x: ArrayView2<'a, f32>,
    total: Vec<f32>,
    explained: Vec<f32>,
    labels: Vec<usize>,
    centroids: Vec<Array1<f32>>,
    pool: Option<Vec<usize>>,
    rng: ChaCha8Rng,
    round: usize,
    exhausted: bool,
}

impl<'a> GreedySeeder<'a> {
    /// Start seeding `x` with a deterministic sampler seeded by `seed`.
    pub fn new(x: ArrayView2<'a, f32>, seed: u64) -> Result<Self> {
        Self::with_pool_limit(x, seed, MAX_SAMPLING_POOL)
    }

    /// Like [`GreedySeeder::new`] with a custom sampling-pool limit.
    pub fn with_pool_limit(x: ArrayView2<'a, f32>, seed: u64, pool_limit: usize) -> Result<Self> {
        let n = x.nrows();
        if n == 0 {
            return Err(ClusterError::EmptyInput("seeding needs at least one point"));
        }
        if pool_limit == 0 {
            return Err(ClusterError::config("sampling pool limit must be > 0"));
        }
        let total = x.rows().into_iter().map(|r| r.dot(&r)).collect();
        let pool = (n > pool_limit).then(|| subsample_idx(n, n - pool_limit).1);
        if let Some(p) = &pool {
            tracing::debug!(points = n, pool = p.len(), "thinned candidate pool");
        }
        Ok(Self {
            x,
            total,
            explained: vec![0.0; n],
            labels: vec![0; n],
            centroids: Vec::new(),
            pool,
            rng: ChaCha8Rng::seed_from_u64(seed),
            round: 0,
            exhausted: false,
        })
    }

    /// Rounds completed so far.
    pub fn round(&self) -> usize {
        self.round
    }

    /// Best variance explained per point.
    pub fn explained(&self) -> &[f32] {
        &self.explained
    }

    /// Current label per point.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Run one round.
    ///
    /// Returns the index of the winning candidate point, or `None` when every
    /// point is already fully explained and the round is skipped.
    pub fn step(&mut self) -> Result<Option<usize>> {
        let round = self.round;
        self.round += 1;
        let n_features = self.x.ncols();
        if self.exhausted {
            self.centroids.push(Array1::zeros(n_features));
            return Ok(None);
        }

        let candidates = match self.sample_candidates()? {
            Some(c) => c,
            None => {
                tracing::debug!(round, "all variance explained, remaining rounds skipped");
                self.exhausted = true;
                self.centroids.push(Array1::zeros(n_features));
                return Ok(None);
            }
        };

        let xc = self.x.select(Axis(0), &candidates);
        let n = self.x.nrows();
        let ntry = candidates.len();

        // vexp[i, c] = 2 x_i · c - ||c||²
        let buf = try_dense_zeros("seed variance explained", round, n, ntry)?;
        let mut vexp = Array2::from_shape_vec((n, ntry), buf)
            .map_err(|_| ClusterError::EmptyInput("variance buffer shape"))?;
        general_mat_mul(2.0, &self.x, &xc.t(), 0.0, &mut vexp);
        let norms: Vec<f32> = xc.rows().into_iter().map(|r| r.dot(&r)).collect();
        for mut row in vexp.rows_mut() {
            for (v, nc) in row.iter_mut().zip(&norms) {
                *v -= nc;
            }
        }

        let mut gain = vec![0.0f64; ntry];
        for (row, &v0) in vexp.rows().into_iter().zip(&self.explained) {
            for (g, &v) in gain.iter_mut().zip(row.iter()) {
                let d = v - v0;
                if d > 0.0 {
                    *g += d as f64;
                }
            }
        }
        let best = argmax_first(&gain);

        for (i, &v) in vexp.column(best).iter().enumerate() {
            if v - self.explained[i] > 0.0 {
                self.labels[i] = round;
                self.explained[i] = v;
            }
        }
        self.centroids.push(xc.row(best).to_owned());
        Ok(Some(candidates[best]))
    }

    /// Run `rounds` rounds and return the final seeding.
    pub fn run(mut self, rounds: usize) -> Result<Seeding> {
        for _ in 0..rounds {
            self.step()?;
        }
        Ok(self.finish())
    }

    /// Stop seeding and collect labels, centroids and explained variance.
    pub fn finish(self) -> Seeding {
        let n_features = self.x.ncols();
        let mut centroids = Array2::zeros((self.centroids.len(), n_features));
        for (mut dst, c) in centroids.rows_mut().into_iter().zip(&self.centroids) {
            dst.assign(c);
        }
        Seeding { labels: self.labels, centroids, explained: self.explained }
    }

    /// Draw candidate point indices from the unexplained-variance distribution.
    fn sample_candidates(&mut self) -> Result<Option<Vec<usize>>> {
        let weight = |i: usize| (self.total[i] - self.explained[i]).max(0.0);
        let (weights, map): (Vec<f32>, Option<&Vec<usize>>) = match &self.pool {
            Some(pool) => (pool.iter().map(|&i| weight(i)).collect(), Some(pool)),
            None => ((0..self.total.len()).map(weight).collect(), None),
        };
        let dist = match WeightedIndex::new(&weights) {
            Ok(d) => d,
            Err(rand::distributions::WeightedError::AllWeightsZero) => return Ok(None),
            Err(e) => {
                return Err(ClusterError::config(format!(
                    "unexplained variance is not a valid sampling weight: {e}"
                )))
            }
        };
        let picks = (0..N_CANDIDATES)
            .map(|_| {
                let k = dist.sample(&mut self.rng);
                map.map_or(k, |m| m[k])
            })
            .collect();
        Ok(Some(picks))
    }
}

/// Index of the largest value; the lowest index wins ties.
fn argmax_first(v: &[f64]) -> usize {
    let mut best = 0;
    for (i, &x) in v.iter().enumerate() {
        if x > v[best] {
            best = i;
        }
    }
    best
}

// ─── free functions ──────────────────────────────────────────────────────────

/// Seed `n_seeds` clusters over `x` and return the label of every point.
pub fn seed_centroids(x: ArrayView2<'_, f32>, n_seeds: usize, seed: u64) -> Result<Vec<usize>> {
    if n_seeds == 0 {
        return Err(ClusterError::config("n_seeds must be > 0"));
    }
    Ok(GreedySeeder::new(x, seed)?.run(n_seeds)?.labels)
}

/// Label each point with the centroid maximising `2 x·c − ||c||²` (its nearest centroid).
pub fn assign_to_centroids(x: ArrayView2<'_, f32>, centroids: ArrayView2<'_, f32>) -> Result<Vec<usize>> {
    if x.ncols() != centroids.ncols() {
        return Err(ClusterError::DimensionMismatch {
            what: "centroid feature dimension",
            expected: x.ncols(),
            got: centroids.ncols(),
        });
    }
    if centroids.nrows() == 0 {
        return Err(ClusterError::EmptyInput("no centroids to assign to"));
    }
    let norms: Vec<f32> = centroids.rows().into_iter().map(|r| r.dot(&r)).collect();
    Ok(x.rows()
        .into_iter()
        .map(|xi| {
            let scores: Vec<f64> = centroids
                .rows()
                .into_iter()
                .zip(&norms)
                .map(|(c, &nc)| (2.0 * xi.dot(&c) - nc) as f64)
                .collect();
            argmax_first(&scores)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> Array2<f32> {
        array![[10.0f32, 10.0], [10.1, 10.0], [-10.0, -10.0], [-10.0, -10.1]]
    }

    #[test]
    fn test_subsample_idx_scenario() {
        let (mask, rev) = subsample_idx(6, 3);
        assert_eq!(mask, vec![false, true, false, true, true, false]);
        assert_eq!(rev, vec![1, 3, 4]);
    }

    #[test]
    fn test_subsample_idx_edges() {
        let (mask, rev) = subsample_idx(5, 0);
        assert!(mask.iter().all(|&m| m));
        assert_eq!(rev.len(), 5);
        let (mask, rev) = subsample_idx(5, 1);
        assert!(!mask[0]);
        assert_eq!(rev, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_separated_blobs_get_two_labels() {
        let x = two_blobs();
        let labels = seed_centroids(x.view(), 2, 1).unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_explained_variance_never_regresses() {
        let x = Array2::from_shape_fn((60, 3), |(i, j)| ((i * 7 + j * 3) % 11) as f32 - 5.0);
        let mut seeder = GreedySeeder::new(x.view(), 3).unwrap();
        let mut prev = seeder.explained().to_vec();
        for _ in 0..12 {
            seeder.step().unwrap();
            for (a, b) in prev.iter().zip(seeder.explained()) {
                assert!(b >= a);
            }
            prev = seeder.explained().to_vec();
        }
        assert_eq!(seeder.round(), 12);
    }

    #[test]
    fn test_same_seed_same_labels() {
        let x = Array2::from_shape_fn((80, 4), |(i, j)| ((i * 13 + j * 5) % 17) as f32);
        let a = seed_centroids(x.view(), 8, 42).unwrap();
        let b = seed_centroids(x.view(), 8, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fully_explained_rounds_are_skipped() {
        let x = array![[1.0f32, 0.0], [1.0, 0.0]];
        let mut seeder = GreedySeeder::new(x.view(), 0).unwrap();
        assert!(seeder.step().unwrap().is_some());
        assert!(seeder.step().unwrap().is_none());
        let seeding = seeder.run(3).unwrap();
        assert_eq!(seeding.labels, vec![0, 0]);
        assert_eq!(seeding.centroids.nrows(), 5);
    }

    #[test]
    fn test_thinned_pool_still_assigns_every_point() {
        let x = two_blobs();
        let seeding = GreedySeeder::with_pool_limit(x.view(), 1, 2).unwrap().run(2).unwrap();
        assert_eq!(seeding.labels.len(), 4);
        assert!(seeding.explained.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_assign_to_centroids_picks_nearest() {
        let x = two_blobs();
        let centroids = array![[-10.0f32, -10.0], [10.0, 10.0]];
        let labels = assign_to_centroids(x.view(), centroids.view()).unwrap();
        assert_eq!(labels, vec![1, 1, 0, 0]);
    }
}
