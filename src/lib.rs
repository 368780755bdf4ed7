//! # spike-cluster
//!
//! Graph-based clustering core for spike sorting.
//!
//! ---
//!
//! ## Clustering without a full distance matrix
//!
//! Spike features live in a few hundred dimensions and recordings hold millions
//! of events. This crate never forms a point × point matrix. Instead:
//!
//! **Landmarks**: every `nskip`-th event is a landmark. Each event is linked to
//! its `n_neigh` nearest landmarks, giving a sparse point × landmark graph.
//! Long recordings can split the landmarks into overlapping time windows so
//! that edges do not bridge periods where waveforms have drifted.
//!
//! **Greedy seeding**: an incremental variance-explained procedure picks
//! centroids one at a time from candidates sampled by unexplained variance.
//!
//! **Alternating bipartite labels**: landmarks take the majority label of the
//! events pointing at them, events take the majority label of their
//! landmarks, and a degree-correction term keeps hubs from swallowing
//! everything.
//!
//! **Spatial regions**: on a probe, events are clustered per region of nearby
//! channel groups and the region labels stitched into one global numbering
//! with a mean template per cluster.
//!
//! ---
//!
//! ## The pipeline
//!
//! ```text
//! events ──spatial::run──▶ region X ──graph──▶ kn, M
//!                              │                  │
//!                              └──seed──▶ labels0 │
//!                                            ▼    ▼
//!                                      engine::cluster ──▶ labels, landmark labels
//!                                            │
//!                              ClusterRefiner ▼
//!                                   global labels + templates
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`graph`] | [`NeighborGraph`], [`AffinityMatrix`], [`DegreeStats`] | Landmark kNN graph, time-split merge, sparse affinity |
//! | [`seed`] | [`GreedySeeder`], [`Seeding`] | Greedy variance-explained initialisation |
//! | [`engine`] | [`ClusterOutput`] | Degree-corrected alternating bipartite clustering |
//! | [`spatial`] | [`ProbeLayout`], [`SortingOutput`], [`ClusterRefiner`] | Region grid, per-region clustering, templates |
//! | [`config`] | [`ClusterConfig`], [`SortingSettings`] | Parameters with defaults and validation |
//! | [`error`] | [`ClusterError`] | Error taxonomy |
//! | `snapshot` | `ClusteringSnapshot` | Serialisable record of one clustering call (requires `serde` feature) |
//! | `ffi` | | Python bindings (requires `python-ffi` feature) |
//!
//! ## Example
//!
//! ```
//! use ndarray::array;
//! use spike_cluster::{cluster, ClusterConfig};
//!
//! let x = array![[10.0f32, 10.0], [10.1, 10.0], [-10.0, -10.0], [-10.0, -10.1]];
//! let config = ClusterConfig::default()
//!     .with_nskip(1)
//!     .with_n_neigh(1)
//!     .with_n_clusters(2)
//!     .with_niter(5);
//! let out = cluster(x.view(), None, None, &config)?;
//! assert_eq!(out.n_clusters, 2);
//! assert_eq!(out.labels[0], out.labels[1]);
//! assert_ne!(out.labels[0], out.labels[2]);
//! # Ok::<(), spike_cluster::ClusterError>(())
//! ```
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and installs no subscriber.
//!
//! ## License
//!
//! GPL-3.0-or-later.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod seed;
pub mod spatial;

#[cfg(feature = "serde")]
pub mod snapshot;

#[cfg(feature = "python-ffi")]
pub mod ffi;

pub use config::{ClusterConfig, SortingSettings, XCenters};
pub use engine::{cluster, compact_labels, ClusterOutput, LabelAlternation};
pub use error::{ClusterError, Result};
pub use graph::{build_neighbor_graph, AffinityMatrix, DegreeStats, NeighborGraph};
pub use seed::{assign_to_centroids, seed_centroids, subsample_idx, GreedySeeder, Seeding};
pub use spatial::{
    ClusterRefiner, EventFeatures, NoRefinement, ProbeLayout, RegionClustering, SortingOutput,
};
