//! Error types for the clustering core.
//!
//! Configuration and shape problems fail fast. Oversized dense intermediates
//! are reported as [`ClusterError::ResourceExhausted`] with the stage, iteration
//! and shape that could not be reserved. The orchestrator-level variants signal
//! unusable upstream inputs rather than a clustering failure.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors produced by the neighbor graph, seeding, clustering and orchestration steps.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClusterError {
    /// A parameter is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two inputs that must agree in size do not.
    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Which quantity disagreed.
        what: &'static str,
        /// Size implied by the other inputs.
        expected: usize,
        /// Size actually supplied.
        got: usize,
    },

    /// An input that must be non-empty was empty.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// A dense intermediate could not be allocated.
    #[error(
        "resource exhausted in {stage} (iteration {iteration}): \
         {rows} x {cols} dense buffer, {bytes} bytes"
    )]
    ResourceExhausted {
        /// Computation that requested the buffer.
        stage: &'static str,
        /// Iteration index at the time of the request.
        iteration: usize,
        /// Requested row count.
        rows: usize,
        /// Requested column count.
        cols: usize,
        /// Requested size in bytes (saturating).
        bytes: usize,
    },

    /// Every spatial region came back without usable channel groups.
    #[error(
        "no spatial region produced usable channels ({regions} regions); \
         dmin={dmin}, dminx={dminx}, mean x={x_mean}"
    )]
    NoUsableRegions {
        /// Number of regions that were visited.
        regions: usize,
        /// Vertical region half-width.
        dmin: f32,
        /// Horizontal region half-width.
        dminx: f32,
        /// Mean horizontal position of the channels.
        x_mean: f32,
    },

    /// The stacked template tensor is entirely zero after all regions ran.
    #[error("template collection is empty after clustering, cannot continue")]
    EmptyTemplates,
}

impl ClusterError {
    /// Build an [`ClusterError::InvalidConfig`] from any message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

// ─── Dense buffer reservation ────────────────────────────────────────────────

/// Allocate a zeroed `rows × cols` buffer, reporting failure instead of aborting.
///
/// The request is logged at `error` level with its full context before the
/// error is returned, so the failing stage is visible even if the caller
/// discards the message.
pub(crate) fn try_dense_zeros(
    stage: &'static str,
    iteration: usize,
    rows: usize,
    cols: usize,
) -> Result<Vec<f32>> {
    let exhausted = |bytes: usize| {
        tracing::error!(
            stage,
            iteration,
            rows,
            cols,
            mib = bytes as f64 / (1u64 << 20) as f64,
            "dense buffer reservation failed"
        );
        ClusterError::ResourceExhausted { stage, iteration, rows, cols, bytes }
    };

    let len = rows.checked_mul(cols).ok_or_else(|| exhausted(usize::MAX))?;
    let bytes = len.saturating_mul(std::mem::size_of::<f32>());
    let mut buf: Vec<f32> = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| exhausted(bytes))?;
    buf.resize(len, 0.0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_zeros_has_requested_len() {
        let buf = try_dense_zeros("test", 0, 3, 4).unwrap();
        assert_eq!(buf.len(), 12);
        assert!(buf.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_overflowing_shape_is_resource_error() {
        let err = try_dense_zeros("score matrix", 7, usize::MAX, 2).unwrap_err();
        match err {
            ClusterError::ResourceExhausted { stage, iteration, rows, cols, .. } => {
                assert_eq!(stage, "score matrix");
                assert_eq!(iteration, 7);
                assert_eq!(rows, usize::MAX);
                assert_eq!(cols, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_display_carries_context() {
        let err = ClusterError::DimensionMismatch { what: "labels", expected: 4, got: 3 };
        assert_eq!(
            err.to_string(),
            "dimension mismatch for labels: expected 4, got 3"
        );
    }
}
