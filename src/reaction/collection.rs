//! All reactions of a network, stored contiguously and partitioned by kind.

use std::ops::Range;

use rayon::prelude::*;

use crate::cluster::ClusterData;
use crate::compute::AtomicBuffer;
use crate::graph::Connectivity;
use crate::material::Material;

use super::{GridPoint, Reaction, ReactionKind};

#[derive(Debug, Clone, Default)]
pub struct ReactionCollection {
    reactions: Vec<Reaction>,
    ranges: [Range<usize>; ReactionKind::COUNT],
}

impl ReactionCollection {
    /// `per_kind[k]` holds the reactions of `ReactionKind::ALL[k]`.
    pub fn from_parts(per_kind: Vec<Vec<Reaction>>) -> Self {
        let mut reactions = Vec::with_capacity(per_kind.iter().map(|v| v.len()).sum());
        let mut ranges: [Range<usize>; ReactionKind::COUNT] = Default::default();
        for (k, part) in per_kind.into_iter().enumerate().take(ReactionKind::COUNT) {
            let start = reactions.len();
            reactions.extend(part);
            ranges[k] = start..reactions.len();
        }
        Self { reactions, ranges }
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    pub fn all(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn of_kind(&self, kind: ReactionKind) -> &[Reaction] {
        &self.reactions[self.ranges[kind.index()].clone()]
    }

    pub fn of_kind_mut(&mut self, kind: ReactionKind) -> &mut [Reaction] {
        let range = self.ranges[kind.index()].clone();
        &mut self.reactions[range]
    }

    pub fn count(&self, kind: ReactionKind) -> usize {
        self.ranges[kind.index()].len()
    }

    pub fn connectivity(&self, num_dofs: usize, reduced: bool) -> Connectivity {
        Connectivity::build(num_dofs, &self.reactions, |r, f| r.connectivity(reduced, f))
    }

    pub fn cache_offsets(&mut self, conn: &Connectivity) {
        self.reactions.par_iter_mut().for_each(|r| r.cache_offsets(conn));
    }

    pub fn set_grid_size(&mut self, grid_size: usize) {
        self.reactions.par_iter_mut().for_each(|r| r.set_grid_size(grid_size));
    }

    /// Refresh every rate; returns the largest rate of the thermally
    /// activated kinds, which also scales trap mutation.
    pub fn update_rates<M: Material>(&mut self, material: &M, data: &ClusterData, trap_mutation_factor: f64) -> f64 {
        self.reactions
            .par_iter_mut()
            .filter(|r| r.kind() != ReactionKind::TrapMutation)
            .for_each(|r| r.update_rates(material, data, 0.0));
        let largest = self.largest_rate(data.grid_size);
        let trap_rate = largest * trap_mutation_factor;
        self.of_kind_mut(ReactionKind::TrapMutation)
            .par_iter_mut()
            .for_each(|r| r.update_rates(material, data, trap_rate));
        largest
    }

    /// Largest production or dissociation rate over all grid points.
    pub fn largest_rate(&self, grid_size: usize) -> f64 {
        // Production and dissociation are adjacent partitions.
        let start = self.ranges[ReactionKind::Production.index()].start;
        let end = self.ranges[ReactionKind::Dissociation.index()].end;
        self.reactions[start..end]
            .par_iter()
            .map(|r| (0..grid_size).map(|g| r.rate(g)).fold(0.0, f64::max))
            .reduce(|| 0.0, f64::max)
    }

    pub fn compute_fluxes(&self, data: &ClusterData, concentrations: &[f64], fluxes: &AtomicBuffer, point: &GridPoint) {
        self.reactions
            .par_iter()
            .for_each(|r| r.compute_flux(data, concentrations, fluxes, point));
    }

    pub fn compute_partials(
        &self,
        data: &ClusterData,
        concentrations: &[f64],
        values: &AtomicBuffer,
        point: &GridPoint,
        reduced: bool,
    ) {
        self.reactions
            .par_iter()
            .for_each(|r| r.compute_partials(data, concentrations, values, point, reduced));
    }

    pub fn memory_bytes(&self) -> usize {
        self.reactions.len() * std::mem::size_of::<Reaction>()
    }
}
