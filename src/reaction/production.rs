//! Production `A + B -> C`.
//!
//! With c_A(a) and c_B(b) reconstructed from the average and the moments,
//! the rate over all admissible elementary pairs is a bilinear form in the
//! DOFs of A and B. Its coefficients (one per equation row and per pair of
//! A/B slots) are fixed by the region shapes and computed once.

use crate::cluster::{ClusterData, ClusterDofs};
use crate::composition::{Composition, IndexType, Region, INVALID_INDEX};
use crate::compute::AtomicBuffer;
use crate::material::Material;

use super::coefficients::{PairOverlap, Powers, Shift};
use super::{ClusterSet, EntryBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    A,
    B,
    C,
}

/// Exponent contribution of a slot to one axis.
#[inline]
pub(crate) fn bump(powers: &mut [u8], slot: Option<usize>) {
    if let Some(k) = slot {
        powers[k] += 1;
    }
}

#[derive(Debug, Clone)]
pub struct ProductionReaction {
    pub(crate) a: ClusterDofs,
    pub(crate) b: ClusterDofs,
    pub(crate) c: Option<ClusterDofs>,
    shift: Shift,
    overlap: f64,
    a_slots: Vec<Option<usize>>,
    b_slots: Vec<Option<usize>>,
    /// Rows are the A slots, then B slots, then C slots.
    /// coefs[(row * na + ia) * nb + ib], already signed and divided by the
    /// volume of the row's cluster.
    coefs: Vec<f64>,
    pub(crate) rate: Vec<f64>,
    pub(crate) block: EntryBlock,
}

impl ProductionReaction {
    pub fn new(set: &ClusterSet, data: &ClusterData) -> Self {
        let a = data.dofs(set.cluster0);
        let b = data.dofs(set.cluster1);
        let c = (set.cluster2 != INVALID_INDEX).then(|| data.dofs(set.cluster2));
        // Without a product every defect recombines: only pairs landing on
        // the empty composition are admissible.
        let vanished = Region::simplex(&Composition::zero(data.regions[a.id].dim()));
        let product_region = c.map_or(&vanished, |c| &data.regions[c.id]);
        let overlap_table = PairOverlap::compute(
            &data.regions[a.id],
            &data.regions[b.id],
            Some(product_region),
            &set.shift,
        );

        let a_slots = a.slots();
        let b_slots = b.slots();
        let mut rows: Vec<(Role, Option<usize>)> = Vec::new();
        rows.extend(a_slots.iter().map(|&s| (Role::A, s)));
        rows.extend(b_slots.iter().map(|&s| (Role::B, s)));
        if let Some(c) = &c {
            rows.extend(c.slots().into_iter().map(|s| (Role::C, s)));
        }

        let (na, nb) = (a_slots.len(), b_slots.len());
        let mut coefs = vec![0.0; rows.len() * na * nb];
        for (r, &(role, weight)) in rows.iter().enumerate() {
            let (sign, volume) = match role {
                Role::A => (-1.0, a.volume),
                Role::B => (-1.0, b.volume),
                Role::C => (1.0, c.map_or(1.0, |c| c.volume)),
            };
            for (ia, &sa) in a_slots.iter().enumerate() {
                for (ib, &sb) in b_slots.iter().enumerate() {
                    let mut p = Powers::default();
                    bump(&mut p.a, sa);
                    bump(&mut p.b, sb);
                    match role {
                        Role::A => bump(&mut p.a, weight),
                        Role::B => bump(&mut p.b, weight),
                        Role::C => bump(&mut p.p, weight),
                    }
                    let sigma_a = sa.map_or(1.0, |k| a.dispersion[k]);
                    let sigma_b = sb.map_or(1.0, |k| b.dispersion[k]);
                    coefs[(r * na + ia) * nb + ib] =
                        sign * overlap_table.coef(&p) / (sigma_a * sigma_b * volume);
                }
            }
        }

        let row_dofs: Vec<IndexType> = rows
            .iter()
            .map(|&(role, s)| match role {
                Role::A => a.dof(s),
                Role::B => b.dof(s),
                Role::C => c.map_or(INVALID_INDEX, |c| c.dof(s)),
            })
            .collect();
        let row_owners: Vec<IndexType> = rows
            .iter()
            .map(|&(role, _)| match role {
                Role::A => a.id,
                Role::B => b.id,
                Role::C => c.map_or(INVALID_INDEX, |c| c.id),
            })
            .collect();
        let col_dofs: Vec<IndexType> = a_slots
            .iter()
            .map(|&s| a.dof(s))
            .chain(b_slots.iter().map(|&s| b.dof(s)))
            .collect();
        let col_owners: Vec<IndexType> =
            a_slots.iter().map(|_| a.id).chain(b_slots.iter().map(|_| b.id)).collect();

        Self {
            a,
            b,
            c,
            shift: set.shift,
            overlap: overlap_table.overlap(),
            a_slots,
            b_slots,
            coefs,
            rate: vec![0.0; data.grid_size],
            block: EntryBlock::owned(row_dofs, row_owners, col_dofs, col_owners),
        }
    }

    pub fn cluster_set(&self) -> ClusterSet {
        ClusterSet::new(self.a.id, self.b.id, self.c.map_or(INVALID_INDEX, |c| c.id)).with_shift(self.shift)
    }

    /// Number of admissible elementary pairs.
    pub fn overlap(&self) -> f64 {
        self.overlap
    }

    /// Coefficient of row `r` for the (A slot, B slot) pair.
    #[inline]
    pub fn coefficient(&self, r: usize, ia: usize, ib: usize) -> f64 {
        self.coefs[(r * self.a_slots.len() + ia) * self.b_slots.len() + ib]
    }

    pub fn update_rates<M: Material>(&mut self, material: &M, data: &ClusterData) {
        for (g, k) in self.rate.iter_mut().enumerate() {
            *k = material.production_rate(data, self.a.id, self.b.id, g);
        }
    }

    fn slot_values(&self, concentrations: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let ca = self.a_slots.iter().map(|&s| concentrations[self.a.dof(s)]).collect();
        let cb = self.b_slots.iter().map(|&s| concentrations[self.b.dof(s)]).collect();
        (ca, cb)
    }

    pub fn compute_flux(&self, concentrations: &[f64], fluxes: &AtomicBuffer, grid_index: usize) {
        let k = self.rate[grid_index];
        if k == 0.0 {
            return;
        }
        let (ca, cb) = self.slot_values(concentrations);
        for r in 0..self.block.num_rows() {
            let mut sum = 0.0;
            for (ia, &xa) in ca.iter().enumerate() {
                for (ib, &xb) in cb.iter().enumerate() {
                    sum += self.coefficient(r, ia, ib) * xa * xb;
                }
            }
            fluxes.add(self.block.row_dof(r), k * sum);
        }
    }

    pub fn compute_partials(&self, concentrations: &[f64], values: &AtomicBuffer, grid_index: usize, reduced: bool) {
        let k = self.rate[grid_index];
        if k == 0.0 {
            return;
        }
        let (ca, cb) = self.slot_values(concentrations);
        let na = ca.len();
        for r in 0..self.block.num_rows() {
            for ia in 0..na {
                if !self.block.is_live(r, ia, reduced) {
                    continue;
                }
                let d: f64 = cb.iter().enumerate().map(|(ib, &xb)| self.coefficient(r, ia, ib) * xb).sum();
                self.block.add(values, r, ia, k * d);
            }
            for ib in 0..cb.len() {
                if !self.block.is_live(r, na + ib, reduced) {
                    continue;
                }
                let d: f64 = ca.iter().enumerate().map(|(ia, &xa)| self.coefficient(r, ia, ib) * xa).sum();
                self.block.add(values, r, na + ib, k * d);
            }
        }
    }

    pub fn left_side_rate(&self, concentrations: &[f64], cluster_id: IndexType, grid_index: usize) -> f64 {
        let k = self.rate[grid_index];
        let (ca, cb) = self.slot_values(concentrations);
        let row_a = 0;
        let row_b = self.a_slots.len();
        let mut rate = 0.0;
        if self.a.id == cluster_id {
            rate -= k * cb.iter().enumerate().map(|(ib, &xb)| self.coefficient(row_a, 0, ib) * xb).sum::<f64>();
        }
        if self.b.id == cluster_id {
            rate -= k * ca.iter().enumerate().map(|(ia, &xa)| self.coefficient(row_b, ia, 0) * xa).sum::<f64>();
        }
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MaterialScalars;
    use crate::composition::Interval;
    use approx::assert_relative_eq;

    fn data_1d(regions: &[(u32, u32)]) -> ClusterData {
        let regions = regions.iter().map(|&(b, e)| Region::from_intervals(&[Interval::new(b, e)])).collect();
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
    fn test_simplex_production_conserves_atoms() {
        // He1 + He2 -> He3
        let data = data_1d(&[(1, 2), (2, 3), (3, 4)]);
        let mut r = ProductionReaction::new(&ClusterSet::new(0, 1, 2), &data);
        r.rate[0] = 2.0;
        let conc = vec![0.5, 0.25, 0.0];
        let fluxes = AtomicBuffer::zeros(3);
        r.compute_flux(&conc, &fluxes, 0);
        assert_relative_eq!(fluxes.get(0), -0.25);
        assert_relative_eq!(fluxes.get(1), -0.25);
        assert_relative_eq!(fluxes.get(2), 0.25);
    }

    #[test]
    fn test_grouped_product_balance() {
        // He1 + [10, 14) -> [12, 16), volumes 1, 4, 4
        let data = data_1d(&[(1, 2), (10, 14), (12, 16)]);
        let mut r = ProductionReaction::new(&ClusterSet::new(0, 1, 2), &data);
        r.rate[0] = 1.0;
        assert_relative_eq!(r.overlap(), 3.0);
        let mut conc = vec![0.0; data.num_dofs()];
        conc[0] = 2.0;
        conc[1] = 1.5;
        conc[data.moment_ids[1][0]] = 0.2;
        let fluxes = AtomicBuffer::zeros(data.num_dofs());
        r.compute_flux(&conc, &fluxes, 0);
        let (va, vb, vc) = (1.0, 4.0, 4.0);
        let produced = vc * fluxes.get(2);
        assert!(produced > 0.0);
        assert_relative_eq!(produced, -va * fluxes.get(0), max_relative = 1e-12);
        assert_relative_eq!(produced, -vb * fluxes.get(1), max_relative = 1e-12);
    }

    #[test]
    fn test_partials_match_finite_difference() {
        let data = data_1d(&[(1, 2), (10, 14), (12, 16)]);
        let mut r = ProductionReaction::new(&ClusterSet::new(0, 1, 2), &data);
        r.rate[0] = 3.0;
        let n = data.num_dofs();
        let conn = crate::graph::Connectivity::build(n, std::slice::from_ref(&r), |r, f| r.block.declare(false, f));
        r.block.cache_offsets(&conn);
        let conc: Vec<f64> = (0..n).map(|i| 0.3 + 0.1 * i as f64).collect();
        let values = AtomicBuffer::zeros(conn.nnz());
        r.compute_partials(&conc, &values, 0, false);

        let flux_at = |c: &[f64]| {
            let f = AtomicBuffer::zeros(n);
            r.compute_flux(c, &f, 0);
            f.to_vec()
        };
        let base = flux_at(&conc);
        let h = 1e-6;
        for col in 0..n {
            let mut shifted = conc.clone();
            shifted[col] += h;
            let moved = flux_at(&shifted);
            for row in 0..n {
                let fd = (moved[row] - base[row]) / h;
                let analytic = conn.offset(row, col).map_or(0.0, |o| values.get(o));
                assert_relative_eq!(analytic, fd, epsilon = 1e-5, max_relative = 1e-4);
            }
        }
    }

    #[test]
    fn test_self_reaction_counts_both_roles() {
        // He1 + He1 -> He2
        let data = data_1d(&[(1, 2), (2, 3)]);
        let mut r = ProductionReaction::new(&ClusterSet::new(0, 0, 1), &data);
        r.rate[0] = 1.0;
        let fluxes = AtomicBuffer::zeros(2);
        r.compute_flux(&[1.0, 0.0], &fluxes, 0);
        assert_relative_eq!(fluxes.get(0), -2.0);
        assert_relative_eq!(fluxes.get(1), 1.0);
        assert_relative_eq!(r.left_side_rate(&[1.0, 0.0], 0, 0), 2.0);
    }
}
