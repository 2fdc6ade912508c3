//! First-order loss to extended sinks: `C -> 0` with rate
//! `bias * strength * D`. Every elementary cluster in the region decays
//! at the same rate, so the average and each moment decay independently.

use crate::cluster::{ClusterData, ClusterDofs};
use crate::composition::IndexType;
use crate::compute::AtomicBuffer;
use crate::material::Material;

use super::EntryBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// Dislocation sink with the default line density.
    Generic,
    /// Network dislocations with the configured density.
    Dislocation,
    GrainBoundary,
}

#[derive(Debug, Clone)]
pub struct SinkReaction {
    kind: SinkKind,
    cluster: ClusterDofs,
    dofs: Vec<IndexType>,
    pub(crate) rate: Vec<f64>,
    pub(crate) block: EntryBlock,
}

impl SinkReaction {
    pub fn new(kind: SinkKind, cluster_id: IndexType, data: &ClusterData) -> Self {
        let cluster = data.dofs(cluster_id);
        let dofs: Vec<IndexType> = cluster.slots().into_iter().map(|s| cluster.dof(s)).collect();
        Self {
            kind,
            cluster,
            block: EntryBlock::diagonal(dofs.clone()),
            dofs,
            rate: vec![0.0; data.grid_size],
        }
    }

    pub fn sink_kind(&self) -> SinkKind {
        self.kind
    }

    pub fn cluster_id(&self) -> IndexType {
        self.cluster.id
    }

    pub fn update_rates<M: Material>(&mut self, material: &M, data: &ClusterData) {
        for (g, k) in self.rate.iter_mut().enumerate() {
            *k = material.sink_rate(data, self.kind, self.cluster.id, g);
        }
    }

    pub fn compute_flux(&self, concentrations: &[f64], fluxes: &AtomicBuffer, grid_index: usize) {
        let k = self.rate[grid_index];
        for &dof in &self.dofs {
            fluxes.add(dof, -k * concentrations[dof]);
        }
    }

    pub fn compute_partials(&self, values: &AtomicBuffer, grid_index: usize) {
        let k = self.rate[grid_index];
        for i in 0..self.dofs.len() {
            self.block.add(values, i, i, -k);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MaterialScalars;
    use crate::composition::{Interval, Region};
    use crate::graph::Connectivity;
    use approx::assert_relative_eq;

    fn data() -> ClusterData {
        let regions = vec![
            Region::from_intervals(&[Interval::single(1)]),
            Region::from_intervals(&[Interval::new(2, 6)]),
        ];
        let scalars = MaterialScalars {
            lattice_parameter: 0.317,
            atomic_volume: 0.0159,
            impurity_radius: 0.3,
            interstitial_bias: 1.15,
            fission_rate: 0.0,
            zeta: 0.73,
            dislocation_density: 0.0003,
            grain_size: 5e4,
        };
        ClusterData::new(regions, 1, scalars)
    }

    #[test]
    fn test_group_and_moment_decay_together() {
        let d = data();
        let mut sink = SinkReaction::new(SinkKind::Generic, 1, &d);
        sink.rate[0] = 2.0;
        // Group average and its moment.
        let conc = [0.0, 3.0, 0.5];
        let f = AtomicBuffer::zeros(3);
        sink.compute_flux(&conc, &f, 0);
        assert_relative_eq!(f.get(0), 0.0);
        assert_relative_eq!(f.get(1), -6.0);
        assert_relative_eq!(f.get(2), -1.0);
    }

    #[test]
    fn test_partials_are_diagonal() {
        let d = data();
        let mut sink = SinkReaction::new(SinkKind::Dislocation, 1, &d);
        sink.rate[0] = 4.0;
        let conn = Connectivity::build(3, std::slice::from_ref(&sink), |s, f| s.block.declare(false, f));
        // Every row keeps its diagonal.
        assert_eq!(conn.nnz(), 3);
        sink.block.cache_offsets(&conn);
        let values = AtomicBuffer::zeros(conn.nnz());
        sink.compute_partials(&values, 0);
        assert_relative_eq!(values.get(conn.offset(1, 1).unwrap()), -4.0);
        assert_relative_eq!(values.get(conn.offset(2, 2).unwrap()), -4.0);
        assert_eq!(sink.sink_kind(), SinkKind::Dislocation);
    }
}
