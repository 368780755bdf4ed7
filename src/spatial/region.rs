//! Feature matrix of one spatial region.
//!
//! Events carry features on the channels of the group they were detected on.
//! A region spans several groups whose channel sets overlap, so each event's
//! features are scattered into the region's sorted unique channel set before
//! flattening to one row per event. Channels an event's group does not cover
//! stay zero.

use hashbrown::HashMap;
use ndarray::{s, Array2};

use super::{EventFeatures, ProbeLayout};
use crate::error::{ClusterError, Result};

/// Features, event indices and channels of one region.
#[derive(Clone, Debug)]
pub struct RegionData {
    /// `events × (channels · n_pcs)`, channel-major within a row.
    pub x: Array2<f32>,
    /// Global index of each row's event.
    pub events: Vec<usize>,
    /// Sorted global channel ids backing the row layout.
    pub channels: Vec<usize>,
}

impl RegionData {
    /// Number of events in the region.
    pub fn n_events(&self) -> usize {
        self.events.len()
    }
}

/// Gather the events whose group is flagged in `in_region`.
///
/// Returns `Ok(None)` when no event falls in the region.
pub fn extract_region(
    layout: &ProbeLayout,
    events: &EventFeatures<'_>,
    in_region: &[bool],
) -> Result<Option<RegionData>> {
    if in_region.len() != layout.n_groups() {
        return Err(ClusterError::DimensionMismatch {
            what: "region group mask",
            expected: layout.n_groups(),
            got: in_region.len(),
        });
    }

    let mut picked = Vec::new();
    for (e, &g) in events.groups.iter().enumerate() {
        match in_region.get(g) {
            Some(true) => picked.push(e),
            Some(false) => {}
            None => {
                return Err(ClusterError::DimensionMismatch {
                    what: "event group index",
                    expected: layout.n_groups(),
                    got: g,
                })
            }
        }
    }
    if picked.is_empty() {
        return Ok(None);
    }

    let mut channels: Vec<usize> = in_region
        .iter()
        .enumerate()
        .filter(|&(_, &inside)| inside)
        .flat_map(|(g, _)| layout.group_channels.column(g).to_vec())
        .collect();
    channels.sort_unstable();
    channels.dedup();
    let local: HashMap<usize, usize> = channels.iter().enumerate().map(|(k, &c)| (c, k)).collect();

    let (_, chan_per_group, n_pcs) = events.features.dim();
    let width = channels.len() * n_pcs;
    let mut flat = vec![0.0f32; picked.len() * width];
    for (r, &e) in picked.iter().enumerate() {
        let g = events.groups[e];
        let row = &mut flat[r * width..(r + 1) * width];
        for k in 0..chan_per_group {
            let c = local[&layout.group_channels[[k, g]]];
            let src = events.features.slice(s![e, k, ..]);
            for (dst, &v) in row[c * n_pcs..(c + 1) * n_pcs].iter_mut().zip(src.iter()) {
                *dst = v;
            }
        }
    }

    let x = Array2::from_shape_vec((picked.len(), width), flat).map_err(|_| {
        ClusterError::DimensionMismatch {
            what: "region feature matrix",
            expected: picked.len() * width,
            got: 0,
        }
    })?;
    Ok(Some(RegionData { x, events: picked, channels }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn layout() -> ProbeLayout {
        // three groups of two channels over five channels
        ProbeLayout {
            channel_x: vec![0.0; 5],
            group_x: vec![0.0, 0.0, 0.0],
            group_y: vec![0.0, 20.0, 40.0],
            group_channels: array![[0usize, 1, 3], [1, 2, 4]],
            n_channels: 5,
        }
    }

    #[test]
    fn test_features_scattered_into_union_of_channels() {
        let layout = layout();
        // 3 events, 2 channels per group, 1 pc
        let feats = Array3::from_shape_vec((3, 2, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let groups = [0usize, 1, 2];
        let events = EventFeatures { features: feats.view(), groups: &groups, times: None };
        let region = extract_region(&layout, &events, &[true, true, false]).unwrap().unwrap();
        assert_eq!(region.channels, vec![0, 1, 2]);
        assert_eq!(region.events, vec![0, 1]);
        assert_eq!(region.x, array![[1.0f32, 2.0, 0.0], [0.0, 3.0, 4.0]]);
    }

    #[test]
    fn test_region_without_events_is_none() {
        let layout = layout();
        let feats = Array3::<f32>::zeros((2, 2, 3));
        let groups = [0usize, 0];
        let events = EventFeatures { features: feats.view(), groups: &groups, times: None };
        assert!(extract_region(&layout, &events, &[false, true, true]).unwrap().is_none());
    }

    #[test]
    fn test_bad_group_index_rejected() {
        let layout = layout();
        let feats = Array3::<f32>::zeros((1, 2, 1));
        let groups = [7usize];
        let events = EventFeatures { features: feats.view(), groups: &groups, times: None };
        assert!(extract_region(&layout, &events, &[true, true, true]).is_err());
    }
}
