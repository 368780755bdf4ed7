//! Parameters for a single clustering call and for the spatial orchestrator.
//!
//! Both structs carry the defaults used by the spike-sorting pipeline and
//! validate eagerly: an invalid value is an error at the call boundary, never a
//! silently clamped setting.

use crate::error::{ClusterError, Result};

// ─── ClusterConfig ───────────────────────────────────────────────────────────

/// Parameters of one call to [`crate::engine::cluster`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterConfig {
    /// Stride used to pick landmarks: every `nskip`-th point.  Default: 20.
    pub nskip: usize,
    /// Landmarks kept per point in the neighbor graph.  Default: 10.
    pub n_neigh: usize,
    /// Size of the label space before compaction.  Default: 200.
    pub n_clusters: usize,
    /// Seed for candidate sampling in the seeder.  Default: 1.
    pub seed: u64,
    /// Number of alternating label updates.  Default: 200.
    pub niter: usize,
    /// Degree-correction weight; `0.0` disables the null model.  Default: 0.0.
    pub lam: f64,
    /// Number of time windows the landmark index is split into.  Default: 1.
    pub n_splits: usize,
    /// Fraction shared by adjacent time windows, in `[0, 1)`.  Default: 0.75.
    pub overlap: f64,
    /// Log sizes of intermediates at `debug` level.  Default: false.
    pub verbose: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nskip: 20,
            n_neigh: 10,
            n_clusters: 200,
            seed: 1,
            niter: 200,
            lam: 0.0,
            n_splits: 1,
            overlap: 0.75,
            verbose: false,
        }
    }
}

impl ClusterConfig {
    /// Check every parameter range that does not depend on the data size.
    pub fn validate(&self) -> Result<()> {
        if self.nskip == 0 {
            return Err(ClusterError::config("nskip must be > 0"));
        }
        if self.n_neigh == 0 {
            return Err(ClusterError::config("n_neigh must be > 0"));
        }
        if self.n_clusters == 0 {
            return Err(ClusterError::config("n_clusters must be > 0"));
        }
        if self.niter == 0 {
            return Err(ClusterError::config("niter must be > 0"));
        }
        if !(self.lam >= 0.0) || !self.lam.is_finite() {
            return Err(ClusterError::config(format!(
                "lam must be a finite value >= 0, got {}",
                self.lam
            )));
        }
        if self.n_splits == 0 {
            return Err(ClusterError::config("n_splits must be > 0"));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(ClusterError::config(format!(
                "overlap must be in [0, 1), got {}",
                self.overlap
            )));
        }
        Ok(())
    }

    /// Set the landmark stride.
    pub fn with_nskip(mut self, nskip: usize) -> Self {
        self.nskip = nskip;
        self
    }

    /// Set the number of neighbors per point.
    pub fn with_n_neigh(mut self, n_neigh: usize) -> Self {
        self.n_neigh = n_neigh;
        self
    }

    /// Set the initial label-space size.
    pub fn with_n_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters;
        self
    }

    /// Set the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the iteration budget.
    pub fn with_niter(mut self, niter: usize) -> Self {
        self.niter = niter;
        self
    }

    /// Set the degree-correction weight.
    pub fn with_lam(mut self, lam: f64) -> Self {
        self.lam = lam;
        self
    }

    /// Set the time-split count and window overlap.
    pub fn with_splits(mut self, n_splits: usize, overlap: f64) -> Self {
        self.n_splits = n_splits;
        self.overlap = overlap;
        self
    }

    /// Toggle diagnostic logging of intermediate sizes.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

// ─── SortingSettings ─────────────────────────────────────────────────────────

/// Manually supplied horizontal region centers.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum XCenters {
    /// Number of centers to find with 1-D k-means over channel x positions.
    Count(usize),
    /// Initial guesses refined with 1-D k-means.
    Guesses(Vec<f32>),
}

/// Settings bundle consumed by [`crate::spatial::run`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SortingSettings {
    /// Landmark stride for each region's clustering call.  Default: 20.
    pub downsample_stride: usize,
    /// Time-split count for each region's neighbor graph.  Default: 1.
    pub n_splits: usize,
    /// Time-window overlap for each region's neighbor graph.  Default: 0.75.
    pub overlap: f64,
    /// Horizontal half-width of a region, in probe units.  Default: 32.
    pub min_x_separation: f32,
    /// Vertical half-width of a region and half the y-bin spacing.  Default: 20.
    pub min_y_separation: f32,
    /// Principal components per channel in the event tensor.  Default: 6.
    pub n_pcs: usize,
    /// Manual x centers; `None` finds them from the channel layout.
    pub x_centers: Option<XCenters>,
    /// Regions with fewer points get a single label without clustering.  Default: 1000.
    pub min_region_points: usize,
    /// Degree-correction weight used for region clustering.  Default: 1.0.
    pub region_lam: f64,
    /// Seed used for region clustering.  Default: 5.
    pub region_seed: u64,
}

impl Default for SortingSettings {
    fn default() -> Self {
        Self {
            downsample_stride: 20,
            n_splits: 1,
            overlap: 0.75,
            min_x_separation: 32.0,
            min_y_separation: 20.0,
            n_pcs: 6,
            x_centers: None,
            min_region_points: 1000,
            region_lam: 1.0,
            region_seed: 5,
        }
    }
}

impl SortingSettings {
    /// Validate ranges; the derived [`ClusterConfig`] is validated as well.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_x_separation > 0.0) {
            return Err(ClusterError::config("min_x_separation must be > 0"));
        }
        if !(self.min_y_separation > 0.0) {
            return Err(ClusterError::config("min_y_separation must be > 0"));
        }
        if self.n_pcs == 0 {
            return Err(ClusterError::config("n_pcs must be > 0"));
        }
        match &self.x_centers {
            Some(XCenters::Count(0)) => {
                return Err(ClusterError::config("x_centers count must be > 0"));
            }
            Some(XCenters::Guesses(g)) if g.is_empty() => {
                return Err(ClusterError::config("x_centers guesses must not be empty"));
            }
            _ => {}
        }
        self.region_config().validate()
    }

    /// Clustering parameters used for every region large enough to cluster.
    pub fn region_config(&self) -> ClusterConfig {
        ClusterConfig::default()
            .with_nskip(self.downsample_stride)
            .with_lam(self.region_lam)
            .with_seed(self.region_seed)
            .with_splits(self.n_splits, self.overlap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ClusterConfig::default().validate().is_ok());
        assert!(SortingSettings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_parameters_rejected() {
        let base = ClusterConfig::default();
        assert!(base.clone().with_n_neigh(0).validate().is_err());
        assert!(base.clone().with_niter(0).validate().is_err());
        assert!(base.clone().with_n_clusters(0).validate().is_err());
        assert!(base.clone().with_nskip(0).validate().is_err());
        assert!(base.with_splits(0, 0.5).validate().is_err());
    }

    #[test]
    fn test_overlap_and_lam_ranges() {
        let base = ClusterConfig::default();
        assert!(base.clone().with_splits(3, 1.0).validate().is_err());
        assert!(base.clone().with_splits(3, -0.1).validate().is_err());
        assert!(base.clone().with_lam(-1.0).validate().is_err());
        assert!(base.clone().with_lam(f64::NAN).validate().is_err());
        assert!(base.with_splits(3, 0.0).validate().is_ok());
    }

    #[test]
    fn test_region_config_inherits_settings() {
        let settings = SortingSettings {
            downsample_stride: 7,
            n_splits: 4,
            overlap: 0.5,
            ..SortingSettings::default()
        };
        let cfg = settings.region_config();
        assert_eq!(cfg.nskip, 7);
        assert_eq!(cfg.n_splits, 4);
        assert_eq!(cfg.overlap, 0.5);
        assert_eq!(cfg.lam, 1.0);
        assert_eq!(cfg.seed, 5);
    }

    #[test]
    fn test_empty_guesses_rejected() {
        let settings = SortingSettings {
            x_centers: Some(XCenters::Guesses(Vec::new())),
            ..SortingSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
