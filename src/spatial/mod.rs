//! Spatial orchestration of region-local clustering.
//!
//! Channel groups (templates or upsampled positions) are assigned to the
//! nearest center of an `x × y` grid laid over the probe. Each grid cell with
//! at least one group is a region. Regions are processed strictly in order
//! (`x` outer, `y` inner) because global label offsets and the template
//! accumulator grow as the loop advances.
//!
//! ```text
//! layout ──centers──▶ nearest center per group
//!    for each region:
//!        extract_region ──▶ X ──cluster──▶ ClusterOutput ──refine──▶ labels
//!        labels + offset ──▶ global labels;  mean(X | label) ──▶ templates
//!        release region buffers
//! ```
//!
//! Regions with no events are skipped and counted. When every visited region
//! was empty, or no template carries any weight, the run fails: both mean the
//! upstream inputs cannot be sorted.

pub mod centers;
pub mod region;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

pub use centers::{nearest_centers, x_centers, y_centers};
pub use region::{extract_region, RegionData};

use crate::config::{ClusterConfig, SortingSettings};
use crate::engine::{cluster, compact_labels, ClusterOutput};
use crate::error::{ClusterError, Result};

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Channel geometry and grouping of the probe.
#[derive(Clone, Debug)]
pub struct ProbeLayout {
    /// x position of every channel; drives the horizontal region centers.
    pub channel_x: Vec<f32>,
    /// x position of every channel group.
    pub group_x: Vec<f32>,
    /// y position of every channel group.
    pub group_y: Vec<f32>,
    /// `channels_per_group × n_groups` channel ids of each group.
    pub group_channels: Array2<usize>,
    /// Total channel count; templates are laid out over all channels.
    pub n_channels: usize,
}

impl ProbeLayout {
    /// Number of channel groups.
    pub fn n_groups(&self) -> usize {
        self.group_x.len()
    }

    /// Check lengths and channel ids against each other, and that every
    /// position is finite.
    pub fn validate(&self) -> Result<()> {
        let n = self.n_groups();
        if n == 0 {
            return Err(ClusterError::EmptyInput("probe layout has no channel groups"));
        }
        if self.group_y.len() != n {
            return Err(ClusterError::DimensionMismatch {
                what: "group y positions",
                expected: n,
                got: self.group_y.len(),
            });
        }
        if self.group_channels.ncols() != n {
            return Err(ClusterError::DimensionMismatch {
                what: "group channel columns",
                expected: n,
                got: self.group_channels.ncols(),
            });
        }
        if self.channel_x.len() != self.n_channels {
            return Err(ClusterError::DimensionMismatch {
                what: "channel x positions",
                expected: self.n_channels,
                got: self.channel_x.len(),
            });
        }
        for (what, pos) in [
            ("channel x positions", &self.channel_x),
            ("group x positions", &self.group_x),
            ("group y positions", &self.group_y),
        ] {
            if let Some(i) = pos.iter().position(|v| !v.is_finite()) {
                return Err(ClusterError::config(format!("{what}: entry {i} is not finite")));
            }
        }
        if let Some(&bad) = self.group_channels.iter().find(|&&c| c >= self.n_channels) {
            return Err(ClusterError::DimensionMismatch {
                what: "group channel id",
                expected: self.n_channels,
                got: bad,
            });
        }
        Ok(())
    }
}

/// Per-event features, borrowed from the caller.
#[derive(Clone, Copy, Debug)]
pub struct EventFeatures<'a> {
    /// `events × channels_per_group × n_pcs`.
    pub features: ArrayView3<'a, f32>,
    /// Channel group each event was detected on.
    pub groups: &'a [usize],
    /// Event times in seconds, handed to the refiner when present.
    pub times: Option<&'a [f64]>,
}

impl EventFeatures<'_> {
    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.features.dim().0
    }

    fn validate(&self, layout: &ProbeLayout, n_pcs: usize) -> Result<()> {
        let (n, chan_per_group, pcs) = self.features.dim();
        if self.groups.len() != n {
            return Err(ClusterError::DimensionMismatch {
                what: "event group assignments",
                expected: n,
                got: self.groups.len(),
            });
        }
        if let Some(times) = self.times {
            if times.len() != n {
                return Err(ClusterError::DimensionMismatch {
                    what: "event times",
                    expected: n,
                    got: times.len(),
                });
            }
        }
        if chan_per_group != layout.group_channels.nrows() {
            return Err(ClusterError::DimensionMismatch {
                what: "channels per group",
                expected: layout.group_channels.nrows(),
                got: chan_per_group,
            });
        }
        if pcs != n_pcs {
            return Err(ClusterError::DimensionMismatch {
                what: "principal components per channel",
                expected: n_pcs,
                got: pcs,
            });
        }
        Ok(())
    }
}

// ─── Refinement seam ─────────────────────────────────────────────────────────

/// Everything a refiner may use to revise one region's clustering.
#[derive(Debug)]
pub struct RegionClustering<'a> {
    /// Flattened grid index of the region.
    pub region: usize,
    /// Region feature matrix the clustering ran on.
    pub features: ArrayView2<'a, f32>,
    /// Labels, landmark labels, initial labels and affinity of the region.
    pub output: &'a ClusterOutput,
    /// Times of the region's events, in row order.
    pub times: Option<&'a [f64]>,
}

/// Post-clustering refinement of a region (merge trees, split tests).
///
/// Implementations return one label per feature row. Labels need not be
/// contiguous; they are compacted afterwards.
pub trait ClusterRefiner {
    /// Revise the labels of one clustered region.
    fn refine(&mut self, region: &RegionClustering<'_>) -> Result<Vec<usize>>;
}

/// Keeps the clustering labels unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRefinement;

impl ClusterRefiner for NoRefinement {
    fn refine(&mut self, region: &RegionClustering<'_>) -> Result<Vec<usize>> {
        Ok(region.output.labels.clone())
    }
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// Result of a full spatial run.
#[derive(Clone, Debug)]
pub struct SortingOutput {
    /// Global cluster label per event.
    pub labels: Vec<usize>,
    /// `n_clusters × n_channels × n_pcs` mean feature template per cluster.
    pub templates: Array3<f32>,
    /// Total clusters over all regions.
    pub n_clusters: usize,
    /// Horizontal region centers.
    pub x_centers: Vec<f32>,
    /// Vertical region centers.
    pub y_centers: Vec<f32>,
    /// Regions with at least one channel group.
    pub regions_visited: usize,
    /// Visited regions that held no events.
    pub empty_regions: usize,
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

/// Cluster every region of the probe and stitch the results together.
pub fn run<R: ClusterRefiner + ?Sized>(
    layout: &ProbeLayout,
    events: &EventFeatures<'_>,
    settings: &SortingSettings,
    refiner: &mut R,
) -> Result<SortingOutput> {
    settings.validate()?;
    layout.validate()?;
    events.validate(layout, settings.n_pcs)?;

    let ycent = y_centers(&layout.group_y, settings.min_y_separation)?;
    let xcent = x_centers(&layout.channel_x, settings.x_centers.as_ref())?;
    let nearest = nearest_centers(&layout.group_x, &layout.group_y, &xcent, &ycent);
    let n_regions = xcent.len() * ycent.len();
    let mut populated = vec![false; n_regions];
    for &ii in &nearest {
        populated[ii] = true;
    }
    let total = populated.iter().filter(|&&p| p).count();
    tracing::debug!(x_centers = xcent.len(), y_centers = ycent.len(), regions = total, "region grid ready");

    let config = settings.region_config();
    let n_pcs = settings.n_pcs;
    let template_len = layout.n_channels * n_pcs;

    let mut labels = vec![0usize; events.n_events()];
    let mut templates: Vec<f32> = Vec::new();
    let mut nmax = 0usize;
    let mut visited = 0usize;
    let mut empty_regions = 0usize;

    for jj in 0..xcent.len() {
        for kk in 0..ycent.len() {
            let ii = kk + jj * ycent.len();
            if !populated[ii] {
                continue;
            }
            visited += 1;
            if visited % 10 == 0 {
                tracing::info!(region = ii, visited, total, "clustering regions");
            }

            let in_region: Vec<bool> = nearest.iter().map(|&c| c == ii).collect();
            let Some(region) = extract_region(layout, events, &in_region)? else {
                empty_regions += 1;
                tracing::debug!(region = ii, "no events near region center, skipped");
                continue;
            };
            tracing::debug!(
                region = ii,
                points = region.n_events(),
                features = region.x.ncols(),
                groups = in_region.iter().filter(|&&b| b).count(),
                "region extracted"
            );

            let local = cluster_region(ii, &region, events.times, settings, &config, refiner)
                .inspect_err(|e| {
                    tracing::error!(
                        region = ii,
                        points = region.n_events(),
                        features = region.x.ncols(),
                        clusters_so_far = nmax,
                        total_events = events.n_events(),
                        error = %e,
                        "region clustering failed"
                    );
                })?;
            let (local, n_local) = compact_labels(&local);

            for (&e, &c) in region.events.iter().zip(&local) {
                labels[e] = c + nmax;
            }
            accumulate_templates(&mut templates, &region, &local, n_local, template_len, n_pcs);
            nmax += n_local;

            let points = region.n_events();
            drop(region);
            tracing::debug!(region = ii, points, clusters = n_local, "released region buffers");
        }
    }

    if empty_regions == visited {
        return Err(ClusterError::NoUsableRegions {
            regions: visited,
            dmin: settings.min_y_separation,
            dminx: settings.min_x_separation,
            x_mean: mean(&layout.channel_x),
        });
    }
    if templates.iter().all(|&w| w == 0.0) {
        return Err(ClusterError::EmptyTemplates);
    }

    let templates = Array3::from_shape_vec((nmax, layout.n_channels, n_pcs), templates).map_err(|_| {
        ClusterError::DimensionMismatch {
            what: "template tensor",
            expected: nmax * template_len,
            got: 0,
        }
    })?;

    Ok(SortingOutput {
        labels,
        templates,
        n_clusters: nmax,
        x_centers: xcent,
        y_centers: ycent,
        regions_visited: visited,
        empty_regions,
    })
}

/// Labels for one region: a single cluster below the size floor, otherwise
/// clustered and refined.
fn cluster_region<R: ClusterRefiner + ?Sized>(
    ii: usize,
    region: &RegionData,
    times: Option<&[f64]>,
    settings: &SortingSettings,
    config: &ClusterConfig,
    refiner: &mut R,
) -> Result<Vec<usize>> {
    let n = region.n_events();
    if n < settings.min_region_points {
        return Ok(vec![0; n]);
    }

    let output = cluster(region.x.view(), None, None, config)?;
    let region_times: Option<Vec<f64>> = times.map(|t| region.events.iter().map(|&e| t[e]).collect());
    let refined = refiner.refine(&RegionClustering {
        region: ii,
        features: region.x.view(),
        output: &output,
        times: region_times.as_deref(),
    })?;
    if refined.len() != n {
        return Err(ClusterError::DimensionMismatch {
            what: "refined labels",
            expected: n,
            got: refined.len(),
        });
    }
    Ok(refined)
}

/// Append the mean feature vector of every local cluster, scattered onto the
/// region's channels of an all-channel template.
fn accumulate_templates(
    templates: &mut Vec<f32>,
    region: &RegionData,
    labels: &[usize],
    n_local: usize,
    template_len: usize,
    n_pcs: usize,
) {
    let width = region.x.ncols();
    let mut sums = vec![0.0f64; n_local * width];
    let mut counts = vec![0usize; n_local];
    for (row, &c) in region.x.rows().into_iter().zip(labels) {
        counts[c] += 1;
        for (s, &v) in sums[c * width..(c + 1) * width].iter_mut().zip(row.iter()) {
            *s += v as f64;
        }
    }

    let base = templates.len();
    templates.resize(base + n_local * template_len, 0.0);
    for c in 0..n_local {
        if counts[c] == 0 {
            continue;
        }
        let w = &mut templates[base + c * template_len..base + (c + 1) * template_len];
        for (k, &ch) in region.channels.iter().enumerate() {
            for p in 0..n_pcs {
                w[ch * n_pcs + p] = (sums[c * width + k * n_pcs + p] / counts[c] as f64) as f32;
            }
        }
    }
}

fn mean(v: &[f32]) -> f32 {
    if v.is_empty() {
        0.0
    } else {
        v.iter().map(|&x| x as f64).sum::<f64>() as f32 / v.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn two_region_layout() -> ProbeLayout {
        // one column, groups at y = 0 and y = 200 land in different regions
        ProbeLayout {
            channel_x: vec![10.0, 10.0, 10.0, 10.0],
            group_x: vec![10.0, 10.0],
            group_y: vec![0.0, 200.0],
            group_channels: array![[0usize, 2], [1, 3]],
            n_channels: 4,
        }
    }

    fn settings(min_region_points: usize) -> SortingSettings {
        SortingSettings { n_pcs: 1, min_region_points, ..SortingSettings::default() }
    }

    #[test]
    fn test_small_regions_get_one_label_each() {
        let layout = two_region_layout();
        let feats = Array3::from_shape_vec((4, 2, 1), vec![1.0, 1.0, 3.0, 3.0, 5.0, 5.0, 7.0, 7.0]).unwrap();
        let groups = [0usize, 0, 1, 1];
        let events = EventFeatures { features: feats.view(), groups: &groups, times: None };
        let out = run(&layout, &events, &settings(1000), &mut NoRefinement).unwrap();
        assert_eq!(out.labels, vec![0, 0, 1, 1]);
        assert_eq!(out.n_clusters, 2);
        assert_eq!(out.regions_visited, 2);
        assert_eq!(out.empty_regions, 0);
        assert_eq!(out.templates.dim(), (2, 4, 1));
        // cluster 0 is the mean over channels 0 and 1, zero elsewhere
        assert_eq!(out.templates.slice(ndarray::s![0, .., 0]).to_vec(), vec![2.0, 2.0, 0.0, 0.0]);
        assert_eq!(out.templates.slice(ndarray::s![1, .., 0]).to_vec(), vec![0.0, 0.0, 6.0, 6.0]);
    }

    #[test]
    fn test_region_without_events_is_skipped_and_counted() {
        let layout = two_region_layout();
        let feats = Array3::from_elem((3, 2, 1), 2.0f32);
        let groups = [0usize, 0, 0];
        let events = EventFeatures { features: feats.view(), groups: &groups, times: None };
        let out = run(&layout, &events, &settings(1000), &mut NoRefinement).unwrap();
        assert_eq!(out.regions_visited, 2);
        assert_eq!(out.empty_regions, 1);
        assert_eq!(out.n_clusters, 1);
        assert_eq!(out.labels, vec![0, 0, 0]);
    }

    #[test]
    fn test_no_events_anywhere_is_fatal() {
        let layout = two_region_layout();
        let feats = Array3::<f32>::zeros((0, 2, 1));
        let events = EventFeatures { features: feats.view(), groups: &[], times: None };
        assert!(matches!(
            run(&layout, &events, &settings(1000), &mut NoRefinement),
            Err(ClusterError::NoUsableRegions { regions: 2, .. })
        ));
    }

    #[test]
    fn test_all_zero_features_is_empty_templates() {
        let layout = two_region_layout();
        let feats = Array3::<f32>::zeros((2, 2, 1));
        let groups = [0usize, 1];
        let events = EventFeatures { features: feats.view(), groups: &groups, times: None };
        assert!(matches!(
            run(&layout, &events, &settings(1000), &mut NoRefinement),
            Err(ClusterError::EmptyTemplates)
        ));
    }

    #[test]
    fn test_mismatched_pcs_rejected() {
        let layout = two_region_layout();
        let feats = Array3::<f32>::zeros((2, 2, 3));
        let groups = [0usize, 1];
        let events = EventFeatures { features: feats.view(), groups: &groups, times: None };
        assert!(matches!(
            run(&layout, &events, &settings(1000), &mut NoRefinement),
            Err(ClusterError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_positions_rejected() {
        let feats = Array3::from_elem((2, 2, 1), 1.0f32);
        let groups = [0usize, 1];
        let events = EventFeatures { features: feats.view(), groups: &groups, times: None };
        let mut nan_y = two_region_layout();
        nan_y.group_y[1] = f32::NAN;
        assert!(matches!(
            run(&nan_y, &events, &settings(1000), &mut NoRefinement),
            Err(ClusterError::InvalidConfig(_))
        ));
        let mut inf_x = two_region_layout();
        inf_x.channel_x[0] = f32::INFINITY;
        assert!(matches!(inf_x.validate(), Err(ClusterError::InvalidConfig(_))));
        assert!(two_region_layout().validate().is_ok());
    }

    struct SplitInHalf;

    impl ClusterRefiner for SplitInHalf {
        fn refine(&mut self, region: &RegionClustering<'_>) -> Result<Vec<usize>> {
            let n = region.features.nrows();
            Ok((0..n).map(|i| if i < n / 2 { 10 } else { 40 }).collect())
        }
    }

    #[test]
    fn test_refiner_labels_are_compacted_and_offset() {
        let layout = two_region_layout();
        let n = 40;
        let feats = Array3::from_shape_fn((n, 2, 1), |(i, _, _)| 1.0 + (i % 20) as f32);
        let groups: Vec<usize> = (0..n).map(|i| if i < 20 { 0 } else { 1 }).collect();
        let events = EventFeatures { features: feats.view(), groups: &groups, times: None };
        let mut s = settings(20);
        s.downsample_stride = 1;
        let out = run(&layout, &events, &s, &mut SplitInHalf).unwrap();
        assert_eq!(out.n_clusters, 4);
        assert_eq!(out.labels[..10].to_vec(), vec![0usize; 10]);
        assert_eq!(out.labels[10..20].to_vec(), vec![1usize; 10]);
        assert_eq!(out.labels[20..30].to_vec(), vec![2usize; 10]);
        assert_eq!(out.labels[30..].to_vec(), vec![3usize; 10]);
    }
}
