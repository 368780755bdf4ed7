//! Region centers over the probe plane.
//!
//! Vertical centers are evenly spaced. Horizontal centers follow the columns
//! of the probe: channel x positions are histogrammed, lightly smoothed, and
//! the histogram peaks seed a 1-D k-means that settles on the column centers.

use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::XCenters;
use crate::error::{ClusterError, Result};

/// Histogram bin width for column detection, in probe units.
const BIN_WIDTH: f32 = 50.0;

/// Seed for random k-means initialisation when only a center count is given.
const KMEANS_SEED: u64 = 5330;

/// Random restarts when only a center count is given.
const KMEANS_RESTARTS: usize = 20;

/// Stop k-means once the mean distortion changes by no more than this.
const KMEANS_THRESH: f64 = 1e-5;

/// Vertical centers: `ymin + dmin - 1, ymin + 3·dmin - 1, …` while below `ymax + dmin + 1`.
pub fn y_centers(group_y: &[f32], dmin: f32) -> Result<Vec<f32>> {
    let (lo, hi) = min_max(group_y).ok_or(ClusterError::EmptyInput("no channel groups"))?;
    let start = lo as f64 + dmin as f64 - 1.0;
    let stop = hi as f64 + dmin as f64 + 1.0;
    let step = 2.0 * dmin as f64;
    let n = ((stop - start) / step).ceil().max(0.0) as usize;
    Ok((0..n).map(|i| (start + i as f64 * step) as f32).collect())
}

/// Horizontal centers from manual settings or from the channel layout.
pub fn x_centers(channel_x: &[f32], manual: Option<&XCenters>) -> Result<Vec<f32>> {
    if channel_x.is_empty() {
        return Err(ClusterError::EmptyInput("no channel positions"));
    }
    let obs: Vec<f64> = channel_x.iter().map(|&x| x as f64).collect();
    let centers = match manual {
        Some(XCenters::Count(k)) => kmeans_restarts(&obs, *k)?,
        Some(XCenters::Guesses(g)) => {
            kmeans_1d(&obs, g.iter().map(|&v| v as f64).collect()).0
        }
        None => {
            let guesses = histogram_peaks(channel_x);
            if guesses.len() <= 1 {
                kmeans_restarts(&obs, 1)?
            } else {
                kmeans_1d(&obs, guesses.into_iter().map(|v| v as f64).collect()).0
            }
        }
    };
    Ok(centers.into_iter().map(|c| c as f32).collect())
}

/// Flattened index `kk + jj * n_y` of the nearest `(xcent[jj], ycent[kk])` per group.
///
/// Ties resolve to the lowest flattened index.
pub fn nearest_centers(group_x: &[f32], group_y: &[f32], xcent: &[f32], ycent: &[f32]) -> Vec<usize> {
    let ny = ycent.len();
    group_x
        .iter()
        .zip(group_y)
        .map(|(&gx, &gy)| {
            let mut best = (f32::INFINITY, 0usize);
            for (jj, &cx) in xcent.iter().enumerate() {
                for (kk, &cy) in ycent.iter().enumerate() {
                    let d = (gx - cx) * (gx - cx) + (gy - cy) * (gy - cy);
                    if d < best.0 {
                        best = (d, kk + jj * ny);
                    }
                }
            }
            best.1
        })
        .collect()
}

// ─── histogram peaks ─────────────────────────────────────────────────────────

/// Left edges of the bins holding peaks of the smoothed x-position histogram.
fn histogram_peaks(channel_x: &[f32]) -> Vec<f32> {
    let Some((lo, hi)) = min_max(channel_x) else {
        return Vec::new();
    };
    let n_edges = ((hi - lo) / BIN_WIDTH) as usize + 4;
    let first = (lo - 2.0 * BIN_WIDTH) as f64;
    let last = (hi + 2.0 * BIN_WIDTH) as f64;
    let width = (last - first) / (n_edges - 1) as f64;
    let edges: Vec<f64> = (0..n_edges).map(|i| first + i as f64 * width).collect();

    let n_bins = n_edges - 1;
    let mut hist = vec![0i64; n_bins];
    for &x in channel_x {
        let x = x as f64;
        let b = edges.partition_point(|&e| e <= x).saturating_sub(1).min(n_bins - 1);
        hist[b] += 1;
    }

    let smoothed = gaussian_smooth(&hist);
    local_maxima(&smoothed)
        .into_iter()
        .map(|p| edges[p] as f32)
        .collect()
}

/// Gaussian filter with sigma 0.5 (radius 2), reflected boundary, truncated to integers.
fn gaussian_smooth(hist: &[i64]) -> Vec<i64> {
    const RADIUS: isize = 2;
    const SIGMA: f64 = 0.5;
    let raw: Vec<f64> = (-RADIUS..=RADIUS)
        .map(|k| (-0.5 * (k as f64 / SIGMA).powi(2)).exp())
        .collect();
    let norm: f64 = raw.iter().sum();
    let n = hist.len() as isize;

    (0..n)
        .map(|i| {
            let acc: f64 = (-RADIUS..=RADIUS)
                .zip(&raw)
                .map(|(k, &w)| w / norm * hist[reflect(i + k, n)] as f64)
                .sum();
            acc as i64
        })
        .collect()
}

/// Index into `0..n` with half-sample symmetric reflection (`d c b a | a b c d | d c b a`).
fn reflect(mut i: isize, n: isize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * n;
    i = i.rem_euclid(period);
    if i >= n {
        i = period - 1 - i;
    }
    i as usize
}

/// Strict local maxima; a flat top counts once, at its middle.
fn local_maxima(x: &[i64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let i_max = x.len() - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

// ─── 1-D k-means ─────────────────────────────────────────────────────────────

/// Lloyd iterations from `guesses`; centers that lose all members are dropped.
///
/// Returns the centers and the final mean distance of each observation to its center.
fn kmeans_1d(obs: &[f64], mut centers: Vec<f64>) -> (Vec<f64>, f64) {
    let mut prev = f64::INFINITY;
    let mut diff = f64::INFINITY;
    let mut distortion = f64::INFINITY;
    while diff > KMEANS_THRESH && !centers.is_empty() {
        let mut sums = vec![0.0f64; centers.len()];
        let mut counts = vec![0usize; centers.len()];
        let mut total = 0.0f64;
        for &o in obs {
            let (mut best, mut best_d) = (0usize, f64::INFINITY);
            for (c, &v) in centers.iter().enumerate() {
                let d = (o - v).abs();
                if d < best_d {
                    best = c;
                    best_d = d;
                }
            }
            sums[best] += o;
            counts[best] += 1;
            total += best_d;
        }
        distortion = total / obs.len() as f64;
        centers = sums
            .iter()
            .zip(&counts)
            .filter(|&(_, &n)| n > 0)
            .map(|(&s, &n)| s / n as f64)
            .collect();
        diff = (prev - distortion).abs();
        prev = distortion;
    }
    (centers, distortion)
}

/// Best of several k-means runs started from `k` distinct random observations.
fn kmeans_restarts(obs: &[f64], k: usize) -> Result<Vec<f64>> {
    if k == 0 || k > obs.len() {
        return Err(ClusterError::config(format!(
            "cannot place {k} x centers over {} channels",
            obs.len()
        )));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(KMEANS_SEED);
    let mut best: Option<(Vec<f64>, f64)> = None;
    for _ in 0..KMEANS_RESTARTS {
        let guess = sample(&mut rng, obs.len(), k).into_iter().map(|i| obs[i]).collect();
        let (centers, dist) = kmeans_1d(obs, guess);
        if best.as_ref().map_or(true, |(_, d)| dist < *d) {
            best = Some((centers, dist));
        }
    }
    Ok(best.map(|(c, _)| c).unwrap_or_default())
}

fn min_max(v: &[f32]) -> Option<(f32, f32)> {
    let first = *v.first()?;
    Some(v.iter().fold((first, first), |(lo, hi), &x| (lo.min(x), hi.max(x))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_y_centers_spacing() {
        let y = [0.0f32, 100.0];
        let c = y_centers(&y, 20.0).unwrap();
        // arange(19, 121, 40) = [19, 59, 99]
        assert_eq!(c, vec![19.0, 59.0, 99.0]);
    }

    #[test]
    fn test_reflect_boundary() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 4), 2);
    }

    #[test]
    fn test_local_maxima_plateau_middle() {
        assert_eq!(local_maxima(&[0, 2, 2, 2, 0, 1, 0]), vec![2, 5]);
        assert!(local_maxima(&[3, 2, 1]).is_empty());
    }

    #[test]
    fn test_two_columns_found() {
        let mut xs = vec![16.0f32; 20];
        xs.extend(vec![48.0f32; 20]);
        xs.extend(vec![250.0f32; 20]);
        xs.extend(vec![282.0f32; 20]);
        let mut c = x_centers(&xs, None).unwrap();
        c.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(c.len(), 2);
        assert!((c[0] - 32.0).abs() < 1e-3);
        assert!((c[1] - 266.0).abs() < 1e-3);
    }

    #[test]
    fn test_single_column_is_mean() {
        let xs = [10.0f32, 12.0, 14.0];
        let c = x_centers(&xs, None).unwrap();
        assert_eq!(c.len(), 1);
        assert!((c[0] - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_manual_guesses_refined() {
        let xs = [0.0f32, 2.0, 100.0, 102.0];
        let c = x_centers(&xs, Some(&XCenters::Guesses(vec![10.0, 90.0]))).unwrap();
        assert_eq!(c, vec![1.0, 101.0]);
    }

    #[test]
    fn test_manual_count_too_large() {
        assert!(x_centers(&[1.0, 2.0], Some(&XCenters::Count(3))).is_err());
    }

    #[test]
    fn test_nearest_center_flattened_index() {
        let xcent = [0.0f32, 100.0];
        let ycent = [0.0f32, 50.0, 100.0];
        let near = nearest_centers(&[98.0, 1.0], &[52.0, 99.0], &xcent, &ycent);
        assert_eq!(near, vec![1 + 3, 2]);
    }
}
