//! Snapshot round-trip integration tests.
//!
//! Verifies that a clustering result can be captured as a ClusteringSnapshot,
//! serialised to JSON, deserialised back, and that labels and configuration
//! are preserved exactly.

#[cfg(feature = "serde")]
mod tests {
    use ndarray::Array2;
    use spike_cluster::snapshot::{ClusteringSnapshot, SNAPSHOT_VERSION};
    use spike_cluster::{cluster, ClusterConfig, SortingSettings, XCenters};

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn line_clusters() -> Array2<f32> {
        // three tight groups on a line, cycling every three points
        Array2::from_shape_fn((60, 1), |(i, _)| ((i / 3) % 3) as f32 * 100.0 + (i % 3) as f32 * 0.1)
    }

    fn config() -> ClusterConfig {
        ClusterConfig::default()
            .with_nskip(2)
            .with_n_neigh(4)
            .with_n_clusters(6)
            .with_niter(10)
            .with_lam(0.5)
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[test]
    fn test_round_trip_preserves_labels() {
        let x = line_clusters();
        let cfg = config();
        let out = cluster(x.view(), None, None, &cfg).unwrap();
        let snap = ClusteringSnapshot::from_output(&out, &cfg);

        let json = serde_json::to_string(&snap).unwrap();
        let restored: ClusteringSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.version, SNAPSHOT_VERSION);
        assert_eq!(restored.labels, out.labels);
        assert_eq!(restored.landmark_labels, out.landmark_labels);
        assert_eq!(restored.initial_labels, out.initial_labels);
        assert_eq!(restored.config, cfg);
        assert!(restored.validate().is_ok());
        assert_eq!(restored.cluster_sizes().iter().sum::<usize>(), 60);
    }

    #[test]
    fn test_replay_from_snapshot_config() {
        let x = line_clusters();
        let cfg = config();
        let first = ClusteringSnapshot::from_output(&cluster(x.view(), None, None, &cfg).unwrap(), &cfg);
        let json = serde_json::to_string(&first).unwrap();
        let restored: ClusteringSnapshot = serde_json::from_str(&json).unwrap();
        let again = cluster(x.view(), None, None, &restored.config).unwrap();
        assert_eq!(again.labels, first.labels);
    }

    #[test]
    fn test_settings_round_trip() {
        let settings = SortingSettings {
            x_centers: Some(XCenters::Guesses(vec![16.0, 48.0])),
            ..SortingSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let restored: SortingSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, settings);
    }
}
