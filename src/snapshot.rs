//! Portable snapshot of one clustering call for persistence and transport.
//!
//! The affinity matrix is not stored: it is fully determined by the features
//! and the configuration, and dominates the size of a [`ClusterOutput`]. A
//! snapshot keeps what downstream tools consume (point and landmark labels,
//! the seeding they started from) together with the parameters that produced
//! them, so a run can be audited or replayed.
//!
//! This module requires the `serde` feature.

use crate::config::ClusterConfig;
use crate::engine::ClusterOutput;
use crate::error::{ClusterError, Result};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// A serializable record of one [`crate::engine::cluster`] call.
///
/// # Example
///
/// ```rust,ignore
/// use spike_cluster::snapshot::ClusteringSnapshot;
///
/// let snapshot = ClusteringSnapshot::from_output(&output, &config);
/// let json = serde_json::to_string(&snapshot).unwrap();
/// let restored: ClusteringSnapshot = serde_json::from_str(&json).unwrap();
/// ```
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct ClusteringSnapshot {
    /// Format version, [`SNAPSHOT_VERSION`] for new snapshots.
    pub version: u16,
    /// Compacted label per point.
    pub labels: Vec<usize>,
    /// Label per landmark.
    pub landmark_labels: Vec<usize>,
    /// Labels the alternation started from.
    pub initial_labels: Vec<usize>,
    /// Number of non-empty clusters.
    pub n_clusters: usize,
    /// Total affinity mass `m` of the neighbor graph.
    pub mass: f64,
    /// Parameters of the call.
    pub config: ClusterConfig,
}

impl ClusteringSnapshot {
    /// Capture the labels of `output` and the `config` that produced it.
    pub fn from_output(output: &ClusterOutput, config: &ClusterConfig) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            labels: output.labels.clone(),
            landmark_labels: output.landmark_labels.clone(),
            initial_labels: output.initial_labels.clone(),
            n_clusters: output.n_clusters,
            mass: output.affinity.sum(),
            config: config.clone(),
        }
    }

    /// Number of points covered by the snapshot.
    pub fn n_points(&self) -> usize {
        self.labels.len()
    }

    /// Members per cluster, indexed by label.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.n_clusters];
        for &c in &self.labels {
            if let Some(s) = sizes.get_mut(c) {
                *s += 1;
            }
        }
        sizes
    }

    /// Check that a restored snapshot is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(ClusterError::config(format!(
                "unsupported snapshot version {}",
                self.version
            )));
        }
        if self.initial_labels.len() != self.labels.len() {
            return Err(ClusterError::DimensionMismatch {
                what: "snapshot initial labels",
                expected: self.labels.len(),
                got: self.initial_labels.len(),
            });
        }
        let bound = self.n_clusters;
        if let Some(&bad) = self.labels.iter().chain(&self.landmark_labels).find(|&&c| c >= bound) {
            return Err(ClusterError::config(format!(
                "snapshot label {bad} outside 0..{bound}"
            )));
        }
        self.config.validate()
    }
}
