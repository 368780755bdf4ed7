//! Time-localised landmark windows and the merge of local and global neighbors.
//!
//! Landmarks are ordered in time, so a contiguous run of landmarks covers a
//! contiguous stretch of the recording. Splitting the index into overlapping
//! windows keeps neighbor edges from spanning periods where waveform shape
//! has drifted. Each point is searched only against the window it falls in,
//! with window ownership changing hands halfway through each overlap.

use hashbrown::HashSet;
use ndarray::{Array2, ArrayView2};

use crate::error::{ClusterError, Result};

/// Half-open range `[start, stop)`.
pub type Range = (usize, usize);

/// Split `n_landmarks` into `n_splits` equally sized overlapping windows.
///
/// Adjacent windows share the fraction `overlap` of their length. The last
/// window is stretched to end at `n_landmarks`.
pub fn split_ranges(n_landmarks: usize, n_splits: usize, overlap: f64) -> Vec<Range> {
    if n_splits <= 1 {
        return vec![(0, n_landmarks)];
    }
    let step = 1.0 - overlap;
    let chunk = (n_landmarks as f64 / (step * n_splits as f64 + overlap)) as usize;
    let mut splits: Vec<Range> = (0..n_splits)
        .map(|i| {
            let start = (i as f64 * step * chunk as f64) as usize;
            (start, start + chunk)
        })
        .collect();
    if let Some(last) = splits.last_mut() {
        last.1 = n_landmarks;
    }
    splits
}

/// Map landmark windows to the contiguous point ranges searched against them.
///
/// The first range starts at point 0; each later range starts where the
/// previous one stopped and stops midway through its overlap with the next
/// window. Landmark positions are converted to point positions with `nskip`
/// and the last range ends at `n_points`.
pub fn sample_ranges(splits: &[Range], nskip: usize, n_points: usize) -> Vec<Range> {
    let mut ranges: Vec<Range> = Vec::with_capacity(splits.len());
    if splits.len() == 1 {
        ranges.push(splits[0]);
    } else {
        for (k, &(_, stop)) in splits.iter().enumerate() {
            let start = ranges.last().map_or(0, |r| r.1);
            let end = match splits.get(k + 1) {
                Some(&(next_start, _)) => {
                    (next_start as f64 + (stop as f64 - next_start as f64) / 2.0) as usize
                }
                None => stop,
            };
            ranges.push((start, end));
        }
    }
    let mut ranges: Vec<Range> = ranges
        .into_iter()
        .map(|(i, j)| ((i * nskip).min(n_points), (j * nskip).min(n_points)))
        .collect();
    if let Some(last) = ranges.last_mut() {
        last.1 = n_points;
    }
    ranges
}

/// Check that every window can supply `n_neigh` distinct landmarks.
pub fn validate_windows(splits: &[Range], n_neigh: usize) -> Result<()> {
    for (w, &(start, stop)) in splits.iter().enumerate() {
        let size = stop.saturating_sub(start);
        if size < n_neigh {
            return Err(ClusterError::config(format!(
                "time window {w} holds {size} landmarks, fewer than n_neigh ({n_neigh})"
            )));
        }
    }
    Ok(())
}

// ─── Neighbor merge ──────────────────────────────────────────────────────────

/// Merge global (`kn1`) and window-local (`kn2`) neighbor rows.
///
/// Each output row starts with the sorted intersection of the two rows. The
/// remaining slots alternate between sources: slot `j` (counted from the end
/// of the intersection) draws the next unused global candidate when `j` is
/// even or the local row is exhausted, and the next unused local candidate
/// otherwise. Values already in the output row are skipped.
pub fn merge_neighbors(kn1: ArrayView2<'_, usize>, kn2: ArrayView2<'_, usize>) -> Result<Array2<usize>> {
    if kn1.dim() != kn2.dim() {
        return Err(ClusterError::DimensionMismatch {
            what: "time-split neighbor rows",
            expected: kn1.len(),
            got: kn2.len(),
        });
    }
    let (n, n_neigh) = kn1.dim();
    let mut kn = Array2::<usize>::zeros((n, n_neigh));

    let mut included: HashSet<usize> = HashSet::with_capacity(n_neigh);
    for i in 0..n {
        let a = kn1.row(i).to_vec();
        let b = kn2.row(i).to_vec();

        let set_b: HashSet<usize> = b.iter().copied().collect();
        let mut shared: Vec<usize> = a.iter().copied().filter(|v| set_b.contains(v)).collect();
        shared.sort_unstable();
        shared.dedup();

        included.clear();
        let mut row: Vec<usize> = Vec::with_capacity(n_neigh);
        for &v in &shared {
            included.insert(v);
            row.push(v);
        }

        let (mut k1, mut k2) = (0usize, 0usize);
        let mut j = 0usize;
        while row.len() < n_neigh {
            let b_left = peek_unused(&b, k2, &included).is_some();
            let a_left = peek_unused(&a, k1, &included).is_some();
            let from_a = a_left && (j % 2 == 0 || !b_left);
            let next = if from_a {
                take_unused(&a, &mut k1, &included)
            } else {
                take_unused(&b, &mut k2, &included)
            };
            match next {
                Some(v) => {
                    included.insert(v);
                    row.push(v);
                }
                None => break,
            }
            j += 1;
        }

        if row.len() < n_neigh {
            return Err(ClusterError::DimensionMismatch {
                what: "merged neighbor row",
                expected: n_neigh,
                got: row.len(),
            });
        }
        for (dst, v) in kn.row_mut(i).iter_mut().zip(row) {
            *dst = v;
        }
    }
    Ok(kn)
}

fn peek_unused(src: &[usize], from: usize, included: &HashSet<usize>) -> Option<usize> {
    src[from.min(src.len())..].iter().copied().find(|v| !included.contains(v))
}

fn take_unused(src: &[usize], k: &mut usize, included: &HashSet<usize>) -> Option<usize> {
    while *k < src.len() {
        let v = src[*k];
        *k += 1;
        if !included.contains(&v) {
            return Some(v);
        }
    }
    None
}
