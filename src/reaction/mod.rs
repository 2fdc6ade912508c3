//! Reaction kinds and their evaluation kernels.
//!
//! A [`Reaction`] is a closed sum type over the kinds the generator emits.
//! Every kernel follows the same lifecycle: coefficients are computed once
//! at construction, the CRS offsets it writes to are cached once the
//! connectivity exists, rates are refreshed on temperature or time change,
//! and fluxes/partials are accumulated atomically on every evaluation.

pub mod coefficients;
pub mod collection;
pub mod constant;
pub mod dissociation;
pub mod production;
pub mod sink;

pub use coefficients::{PairOverlap, Powers, Shift};
pub use collection::ReactionCollection;
pub use constant::ConstantReaction;
pub use dissociation::{EmissionReaction, EmissionKind};
pub use production::ProductionReaction;
pub use sink::{SinkKind, SinkReaction};

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterData;
use crate::composition::{IndexType, INVALID_INDEX};
use crate::compute::AtomicBuffer;
use crate::graph::Connectivity;
use crate::material::Material;

// ---------------------------------------------------------------------------
// Kinds and cluster sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReactionKind {
    Production,
    Dissociation,
    ReSolution,
    TrapMutation,
    Sink,
    DislocationSink,
    GrainBoundarySink,
    Constant,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 8] = [
        ReactionKind::Production,
        ReactionKind::Dissociation,
        ReactionKind::ReSolution,
        ReactionKind::TrapMutation,
        ReactionKind::Sink,
        ReactionKind::DislocationSink,
        ReactionKind::GrainBoundarySink,
        ReactionKind::Constant,
    ];

    pub const COUNT: usize = 8;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ReactionKind::Production => "production",
            ReactionKind::Dissociation => "dissociation",
            ReactionKind::ReSolution => "re-solution",
            ReactionKind::TrapMutation => "trap mutation",
            ReactionKind::Sink => "sink",
            ReactionKind::DislocationSink => "dislocation sink",
            ReactionKind::GrainBoundarySink => "grain boundary sink",
            ReactionKind::Constant => "constant",
        }
    }
}

/// Cluster ids of one reaction.
///
/// | kind | cluster0 | cluster1 | cluster2 |
/// |---|---|---|---|
/// | production | reactant A | reactant B | product (or invalid) |
/// | dissociation, re-solution, trap mutation | emitting cluster | product A | product B |
/// | sinks | cluster | - | - |
/// | constant | row cluster | column cluster | - |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterSet {
    pub cluster0: IndexType,
    pub cluster1: IndexType,
    pub cluster2: IndexType,
    pub shift: Shift,
}

impl ClusterSet {
    pub fn new(cluster0: IndexType, cluster1: IndexType, cluster2: IndexType) -> Self {
        Self { cluster0, cluster1, cluster2, shift: Shift::NONE }
    }

    pub fn single(cluster0: IndexType) -> Self {
        Self::new(cluster0, INVALID_INDEX, INVALID_INDEX)
    }

    pub fn with_shift(mut self, shift: Shift) -> Self {
        self.shift = shift;
        self
    }
}

/// Where a flux evaluation happens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub index: usize,
    /// Depth of the free surface [nm].
    pub surface_depth: f64,
    /// Local grid spacing [nm].
    pub spacing: f64,
}

impl GridPoint {
    /// Grid point without a surface (0D or bulk).
    pub fn at(index: usize) -> Self {
        Self { index, surface_depth: 0.0, spacing: 0.0 }
    }
}

// ---------------------------------------------------------------------------
// Jacobian entry block
// ---------------------------------------------------------------------------

/// Dense (rows x cols) block of Jacobian entries a reaction touches, with
/// the CRS offset of each entry cached after connectivity discovery.
///
/// The reduced Jacobian keeps the entries whose row and column DOFs belong
/// to the same cluster: the average/moment block of every cluster.
#[derive(Debug, Clone, Default)]
pub(crate) struct EntryBlock {
    rows: Vec<IndexType>,
    cols: Vec<IndexType>,
    row_owners: Vec<IndexType>,
    col_owners: Vec<IndexType>,
    offsets: Vec<usize>,
    diagonal_only: bool,
}

impl EntryBlock {
    /// Block whose DOFs are cluster averages, each its own owner.
    pub(crate) fn new(rows: Vec<IndexType>, cols: Vec<IndexType>) -> Self {
        let (row_owners, col_owners) = (rows.clone(), cols.clone());
        Self::owned(rows, row_owners, cols, col_owners)
    }

    /// Block with the owning cluster of every row and column DOF.
    pub(crate) fn owned(
        rows: Vec<IndexType>,
        row_owners: Vec<IndexType>,
        cols: Vec<IndexType>,
        col_owners: Vec<IndexType>,
    ) -> Self {
        let offsets = vec![INVALID_INDEX; rows.len() * cols.len()];
        Self { rows, cols, row_owners, col_owners, offsets, diagonal_only: false }
    }

    pub(crate) fn diagonal(dofs: Vec<IndexType>) -> Self {
        let mut block = Self::new(dofs.clone(), dofs);
        block.diagonal_only = true;
        block
    }

    #[inline]
    fn touches(&self, r: usize, c: usize, reduced: bool) -> bool {
        if self.diagonal_only {
            self.rows[r] == self.cols[c]
        } else if reduced {
            self.row_owners[r] == self.col_owners[c]
        } else {
            true
        }
    }

    pub(crate) fn declare(&self, reduced: bool, f: &mut dyn FnMut(usize, usize)) {
        for r in 0..self.rows.len() {
            for c in 0..self.cols.len() {
                if self.touches(r, c, reduced) {
                    f(self.rows[r], self.cols[c]);
                }
            }
        }
    }

    pub(crate) fn cache_offsets(&mut self, conn: &Connectivity) {
        let ncols = self.cols.len();
        for r in 0..self.rows.len() {
            for c in 0..ncols {
                self.offsets[r * ncols + c] = conn.offset(self.rows[r], self.cols[c]).unwrap_or(INVALID_INDEX);
            }
        }
    }

    #[inline]
    pub(crate) fn row_dof(&self, r: usize) -> IndexType {
        self.rows[r]
    }

    #[inline]
    pub(crate) fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether entry (r, c) is written in the current mode.
    #[inline]
    pub(crate) fn is_live(&self, r: usize, c: usize, reduced: bool) -> bool {
        self.touches(r, c, reduced) && self.offsets[r * self.cols.len() + c] != INVALID_INDEX
    }

    #[inline]
    pub(crate) fn add(&self, values: &AtomicBuffer, r: usize, c: usize, value: f64) {
        let offset = self.offsets[r * self.cols.len() + c];
        if offset != INVALID_INDEX {
            values.add(offset, value);
        }
    }
}

// ---------------------------------------------------------------------------
// The reaction sum type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Reaction {
    Production(ProductionReaction),
    Dissociation(EmissionReaction),
    ReSolution(EmissionReaction),
    TrapMutation(EmissionReaction),
    Sink(SinkReaction),
    Constant(ConstantReaction),
}

impl Reaction {
    /// Build a reaction of `kind` and compute its coefficients.
    pub fn build<M: Material>(kind: ReactionKind, set: &ClusterSet, data: &ClusterData, material: &M) -> Self {
        let grid = data.grid_size;
        match kind {
            ReactionKind::Production => Reaction::Production(ProductionReaction::new(set, data)),
            ReactionKind::Dissociation => {
                Reaction::Dissociation(EmissionReaction::new(EmissionKind::Dissociation, set, data))
            }
            ReactionKind::ReSolution => {
                Reaction::ReSolution(EmissionReaction::new(EmissionKind::ReSolution, set, data))
            }
            ReactionKind::TrapMutation => {
                let depth_limit = material.trap_mutation_depth(&data.regions[set.cluster0]);
                Reaction::TrapMutation(EmissionReaction::new(EmissionKind::TrapMutation { depth_limit }, set, data))
            }
            ReactionKind::Sink => Reaction::Sink(SinkReaction::new(SinkKind::Generic, set.cluster0, data)),
            ReactionKind::DislocationSink => {
                Reaction::Sink(SinkReaction::new(SinkKind::Dislocation, set.cluster0, data))
            }
            ReactionKind::GrainBoundarySink => {
                Reaction::Sink(SinkReaction::new(SinkKind::GrainBoundary, set.cluster0, data))
            }
            ReactionKind::Constant => Reaction::Constant(ConstantReaction::new(set.cluster0, set.cluster1, grid)),
        }
    }

    pub fn kind(&self) -> ReactionKind {
        match self {
            Reaction::Production(_) => ReactionKind::Production,
            Reaction::Dissociation(_) => ReactionKind::Dissociation,
            Reaction::ReSolution(_) => ReactionKind::ReSolution,
            Reaction::TrapMutation(_) => ReactionKind::TrapMutation,
            Reaction::Sink(s) => match s.sink_kind() {
                SinkKind::Generic => ReactionKind::Sink,
                SinkKind::Dislocation => ReactionKind::DislocationSink,
                SinkKind::GrainBoundary => ReactionKind::GrainBoundarySink,
            },
            Reaction::Constant(_) => ReactionKind::Constant,
        }
    }

    /// Cluster ids in the generator's layout.
    pub fn cluster_set(&self) -> ClusterSet {
        match self {
            Reaction::Production(r) => r.cluster_set(),
            Reaction::Dissociation(r) | Reaction::ReSolution(r) | Reaction::TrapMutation(r) => r.cluster_set(),
            Reaction::Sink(r) => ClusterSet::single(r.cluster_id()),
            Reaction::Constant(r) => ClusterSet::new(r.row(), r.col(), INVALID_INDEX),
        }
    }

    fn block(&self) -> &EntryBlock {
        match self {
            Reaction::Production(r) => &r.block,
            Reaction::Dissociation(r) | Reaction::ReSolution(r) | Reaction::TrapMutation(r) => &r.block,
            Reaction::Sink(r) => &r.block,
            Reaction::Constant(r) => &r.block,
        }
    }

    fn block_mut(&mut self) -> &mut EntryBlock {
        match self {
            Reaction::Production(r) => &mut r.block,
            Reaction::Dissociation(r) | Reaction::ReSolution(r) | Reaction::TrapMutation(r) => &mut r.block,
            Reaction::Sink(r) => &mut r.block,
            Reaction::Constant(r) => &mut r.block,
        }
    }

    /// Declare the (row, col) DOF pairs this reaction writes.
    pub fn connectivity(&self, reduced: bool, f: &mut dyn FnMut(usize, usize)) {
        self.block().declare(reduced, f);
    }

    pub fn cache_offsets(&mut self, conn: &Connectivity) {
        self.block_mut().cache_offsets(conn);
    }

    /// Resize the per-grid rate storage.
    pub fn set_grid_size(&mut self, grid_size: usize) {
        match self {
            Reaction::Production(r) => r.rate.resize(grid_size, 0.0),
            Reaction::Dissociation(r) | Reaction::ReSolution(r) | Reaction::TrapMutation(r) => {
                r.rate.resize(grid_size, 0.0)
            }
            Reaction::Sink(r) => r.rate.resize(grid_size, 0.0),
            Reaction::Constant(r) => r.rate.resize(grid_size, 0.0),
        }
    }

    /// Recompute rates at every grid point. Trap mutation takes
    /// `trap_mutation_rate`; constant reactions keep their external rates.
    pub fn update_rates<M: Material>(&mut self, material: &M, data: &ClusterData, trap_mutation_rate: f64) {
        match self {
            Reaction::Production(r) => r.update_rates(material, data),
            Reaction::Dissociation(r) | Reaction::ReSolution(r) => r.update_rates(material, data),
            Reaction::TrapMutation(r) => r.rate.iter_mut().for_each(|k| *k = trap_mutation_rate),
            Reaction::Sink(r) => r.update_rates(material, data),
            Reaction::Constant(_) => {}
        }
    }

    pub fn rate(&self, grid_index: usize) -> f64 {
        match self {
            Reaction::Production(r) => r.rate[grid_index],
            Reaction::Dissociation(r) | Reaction::ReSolution(r) | Reaction::TrapMutation(r) => r.rate[grid_index],
            Reaction::Sink(r) => r.rate[grid_index],
            Reaction::Constant(r) => r.rate[grid_index],
        }
    }

    pub fn compute_flux(&self, data: &ClusterData, concentrations: &[f64], fluxes: &AtomicBuffer, point: &GridPoint) {
        match self {
            Reaction::Production(r) => r.compute_flux(concentrations, fluxes, point.index),
            Reaction::Dissociation(r) | Reaction::ReSolution(r) | Reaction::TrapMutation(r) => {
                if r.is_active(data, point) {
                    r.compute_flux(concentrations, fluxes, point.index)
                }
            }
            Reaction::Sink(r) => r.compute_flux(concentrations, fluxes, point.index),
            Reaction::Constant(r) => r.compute_flux(concentrations, fluxes, point.index),
        }
    }

    pub fn compute_partials(
        &self,
        data: &ClusterData,
        concentrations: &[f64],
        values: &AtomicBuffer,
        point: &GridPoint,
        reduced: bool,
    ) {
        match self {
            Reaction::Production(r) => r.compute_partials(concentrations, values, point.index, reduced),
            Reaction::Dissociation(r) | Reaction::ReSolution(r) | Reaction::TrapMutation(r) => {
                if r.is_active(data, point) {
                    r.compute_partials(values, point.index, reduced)
                }
            }
            Reaction::Sink(r) => r.compute_partials(values, point.index),
            Reaction::Constant(r) => r.compute_partials(values, point.index),
        }
    }

    /// Loss rate of `cluster_id` through this reaction, per unit of its own
    /// concentration.
    pub fn left_side_rate(&self, concentrations: &[f64], cluster_id: IndexType, grid_index: usize) -> f64 {
        match self {
            Reaction::Production(r) => r.left_side_rate(concentrations, cluster_id, grid_index),
            Reaction::Dissociation(r) | Reaction::ReSolution(r) => r.left_side_rate(cluster_id, grid_index),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices_are_dense() {
        for (i, k) in ReactionKind::ALL.iter().enumerate() {
            assert_eq!(k.index(), i);
        }
        assert_eq!(ReactionKind::ALL.len(), ReactionKind::COUNT);
    }

    #[test]
    fn test_entry_block_reduced_declares_diagonal() {
        let block = EntryBlock::new(vec![0, 1, 2], vec![0, 1]);
        let mut full = Vec::new();
        block.declare(false, &mut |r, c| full.push((r, c)));
        assert_eq!(full.len(), 6);
        let mut reduced = Vec::new();
        block.declare(true, &mut |r, c| reduced.push((r, c)));
        assert_eq!(reduced, vec![(0, 0), (1, 1)]);
        let diag = EntryBlock::diagonal(vec![4, 7]);
        let mut d = Vec::new();
        diag.declare(false, &mut |r, c| d.push((r, c)));
        assert_eq!(d, vec![(4, 4), (7, 7)]);
    }

    #[test]
    fn test_entry_block_reduced_keeps_cluster_blocks() {
        // Cluster 0 is a simplex; cluster 1 owns DOFs 1 (average) and 5 (moment).
        let block = EntryBlock::owned(vec![0, 1, 5], vec![0, 0, 1], vec![1, 5], vec![1, 1]);
        let mut reduced = Vec::new();
        block.declare(true, &mut |r, c| reduced.push((r, c)));
        assert_eq!(reduced, vec![(1, 1), (1, 5), (5, 1), (5, 5)]);
    }
}
