//! Emission reactions `C -> A + B`: dissociation, re-solution and trap
//! mutation share the kinematics and differ only in their rate law.
//!
//! The rate is linear in the DOFs of C, so the coefficient table is one
//! value per (row, C slot).

use crate::cluster::{ClusterData, ClusterDofs};
use crate::composition::IndexType;
use crate::compute::AtomicBuffer;
use crate::material::Material;

use super::coefficients::{PairOverlap, Powers, Shift};
use super::production::bump;
use super::{ClusterSet, EntryBlock, GridPoint};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmissionKind {
    /// Thermal dissociation, detailed balance with production.
    Dissociation,
    /// Fission-fragment induced re-solution.
    ReSolution,
    /// Helium cluster pushes out W atoms near the surface.
    TrapMutation {
        /// Largest distance below the surface where it happens [nm].
        depth_limit: f64,
    },
}

#[derive(Debug, Clone)]
pub struct EmissionReaction {
    kind: EmissionKind,
    pub(crate) c: ClusterDofs,
    pub(crate) a: ClusterDofs,
    pub(crate) b: ClusterDofs,
    shift: Shift,
    overlap: f64,
    c_slots: Vec<Option<usize>>,
    /// coefs[row * nc + ic]; rows are C slots, then A slots, then B slots.
    coefs: Vec<f64>,
    pub(crate) rate: Vec<f64>,
    pub(crate) block: EntryBlock,
}

impl EmissionReaction {
    pub fn new(kind: EmissionKind, set: &ClusterSet, data: &ClusterData) -> Self {
        let c = data.dofs(set.cluster0);
        let a = data.dofs(set.cluster1);
        let b = data.dofs(set.cluster2);
        let table = PairOverlap::compute(
            &data.regions[a.id],
            &data.regions[b.id],
            Some(&data.regions[c.id]),
            &set.shift,
        );

        let c_slots = c.slots();
        // (role, weight): 0 = C, 1 = A, 2 = B
        let mut rows: Vec<(u8, Option<usize>)> = Vec::new();
        rows.extend(c_slots.iter().map(|&s| (0, s)));
        rows.extend(a.slots().into_iter().map(|s| (1, s)));
        rows.extend(b.slots().into_iter().map(|s| (2, s)));

        let nc = c_slots.len();
        let mut coefs = vec![0.0; rows.len() * nc];
        for (r, &(role, weight)) in rows.iter().enumerate() {
            let (sign, volume) = match role {
                0 => (-1.0, c.volume),
                1 => (1.0, a.volume),
                _ => (1.0, b.volume),
            };
            for (ic, &sc) in c_slots.iter().enumerate() {
                let mut p = Powers::default();
                bump(&mut p.p, sc);
                match role {
                    0 => bump(&mut p.p, weight),
                    1 => bump(&mut p.a, weight),
                    _ => bump(&mut p.b, weight),
                }
                let sigma = sc.map_or(1.0, |k| c.dispersion[k]);
                coefs[r * nc + ic] = sign * table.coef(&p) / (sigma * volume);
            }
        }

        let row_dofs: Vec<IndexType> = rows
            .iter()
            .map(|&(role, s)| match role {
                0 => c.dof(s),
                1 => a.dof(s),
                _ => b.dof(s),
            })
            .collect();
        let row_owners: Vec<IndexType> = rows
            .iter()
            .map(|&(role, _)| match role {
                0 => c.id,
                1 => a.id,
                _ => b.id,
            })
            .collect();
        let col_dofs: Vec<IndexType> = c_slots.iter().map(|&s| c.dof(s)).collect();
        let col_owners = vec![c.id; col_dofs.len()];

        Self {
            kind,
            c,
            a,
            b,
            shift: set.shift,
            overlap: table.overlap(),
            c_slots,
            coefs,
            rate: vec![0.0; data.grid_size],
            block: EntryBlock::owned(row_dofs, row_owners, col_dofs, col_owners),
        }
    }

    pub fn emission_kind(&self) -> EmissionKind {
        self.kind
    }

    pub fn cluster_set(&self) -> ClusterSet {
        ClusterSet::new(self.c.id, self.a.id, self.b.id).with_shift(self.shift)
    }

    pub fn overlap(&self) -> f64 {
        self.overlap
    }

    #[inline]
    pub fn coefficient(&self, r: usize, ic: usize) -> f64 {
        self.coefs[r * self.c_slots.len() + ic]
    }

    pub fn update_rates<M: Material>(&mut self, material: &M, data: &ClusterData) {
        let (c, a, b) = (self.c.id, self.a.id, self.b.id);
        for (g, k) in self.rate.iter_mut().enumerate() {
            *k = match self.kind {
                EmissionKind::Dissociation => material.dissociation_rate(data, c, a, b, g),
                EmissionKind::ReSolution => material.re_solution_rate(data, c, a, b, g),
                EmissionKind::TrapMutation { .. } => *k,
            };
        }
    }

    /// Trap mutation only happens close enough to the surface.
    pub fn is_active(&self, data: &ClusterData, point: &GridPoint) -> bool {
        match self.kind {
            EmissionKind::TrapMutation { depth_limit } => {
                let depth = data.depth.get(point.index).copied().unwrap_or(0.0) - point.surface_depth;
                depth >= 0.0 && depth <= depth_limit + 0.5 * point.spacing
            }
            _ => true,
        }
    }

    pub fn compute_flux(&self, concentrations: &[f64], fluxes: &AtomicBuffer, grid_index: usize) {
        let k = self.rate[grid_index];
        if k == 0.0 {
            return;
        }
        let cc: Vec<f64> = self.c_slots.iter().map(|&s| concentrations[self.c.dof(s)]).collect();
        for r in 0..self.block.num_rows() {
            let sum: f64 = cc.iter().enumerate().map(|(ic, &x)| self.coefficient(r, ic) * x).sum();
            fluxes.add(self.block.row_dof(r), k * sum);
        }
    }

    pub fn compute_partials(&self, values: &AtomicBuffer, grid_index: usize, reduced: bool) {
        let k = self.rate[grid_index];
        if k == 0.0 {
            return;
        }
        for r in 0..self.block.num_rows() {
            for ic in 0..self.c_slots.len() {
                if self.block.is_live(r, ic, reduced) {
                    self.block.add(values, r, ic, k * self.coefficient(r, ic));
                }
            }
        }
    }

    pub fn left_side_rate(&self, cluster_id: IndexType, grid_index: usize) -> f64 {
        if self.c.id == cluster_id {
            -self.rate[grid_index] * self.coefficient(0, 0)
        } else {
            0.0
        }
    }
}
