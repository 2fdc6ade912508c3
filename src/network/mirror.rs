//! Host-side snapshots for checkpoint/restart writers.
//!
//! Snapshots are built on first request and kept until the network's data
//! version moves on; a stale snapshot is never handed out.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterData;
use crate::composition::{IndexType, Region};
use crate::subpaving::Subpaving;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubpavingMirror {
    pub version: u64,
    pub root: Region,
    pub tiles: Vec<Region>,
    pub node_count: usize,
    pub depth: usize,
}

impl SubpavingMirror {
    pub fn capture(subpaving: &Subpaving, version: u64) -> Self {
        Self {
            version,
            root: *subpaving.root_region(),
            tiles: (0..subpaving.num_tiles()).map(|id| *subpaving.tile_region(id)).collect(),
            node_count: subpaving.node_count(),
            depth: subpaving.depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDataMirror {
    pub version: u64,
    pub grid_size: usize,
    pub regions: Vec<Region>,
    pub formation_energy: Vec<f64>,
    pub migration_energy: Vec<f64>,
    pub diffusion_factor: Vec<f64>,
    pub reaction_radius: Vec<f64>,
    pub moment_ids: Vec<Vec<IndexType>>,
    pub temperature: Vec<f64>,
    pub diffusion_coefficient: Array2<f64>,
    pub anisotropy_ratio: Option<Array2<f64>>,
}

impl ClusterDataMirror {
    pub fn capture(data: &ClusterData, version: u64) -> Self {
        Self {
            version,
            grid_size: data.grid_size,
            regions: data.regions.clone(),
            formation_energy: data.formation_energy.clone(),
            migration_energy: data.migration_energy.clone(),
            diffusion_factor: data.diffusion_factor.clone(),
            reaction_radius: data.reaction_radius.clone(),
            moment_ids: data
                .moment_ids
                .iter()
                .zip(&data.regions)
                .map(|(ids, r)| ids[..r.dim()].to_vec())
                .collect(),
            temperature: data.temperature.clone(),
            diffusion_coefficient: data.diffusion_coefficient.clone(),
            anisotropy_ratio: data.extra.anisotropy_ratio.clone(),
        }
    }
}

/// Lazily filled snapshots, tagged with the version they were taken at.
#[derive(Debug, Clone, Default)]
pub(crate) struct MirrorCache {
    subpaving: Option<SubpavingMirror>,
    cluster_data: Option<ClusterDataMirror>,
}

impl MirrorCache {
    pub(crate) fn subpaving(&mut self, subpaving: &Subpaving, version: u64) -> &SubpavingMirror {
        if self.subpaving.as_ref().map_or(true, |m| m.version != version) {
            self.subpaving = Some(SubpavingMirror::capture(subpaving, version));
        }
        self.subpaving.get_or_insert_with(|| SubpavingMirror::capture(subpaving, version))
    }

    pub(crate) fn cluster_data(&mut self, data: &ClusterData, version: u64) -> &ClusterDataMirror {
        if self.cluster_data.as_ref().map_or(true, |m| m.version != version) {
            self.cluster_data = Some(ClusterDataMirror::capture(data, version));
        }
        self.cluster_data.get_or_insert_with(|| ClusterDataMirror::capture(data, version))
    }
}
