//! Struct-of-Arrays (SoA) store of per-cluster properties.
//!
//! Indexed by tile id, and for temperature-dependent fields also by grid
//! point. Each evaluation pass reads only the arrays it needs.

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::composition::{IndexType, Region, INVALID_INDEX, MAX_SPECIES};
use crate::error::{check_len, Result};
use crate::math::boltzmann_factor;

/// Material-specific per-(cluster, grid point) fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraData {
    /// Ratio of c-axis to a-axis diffusivity for hcp materials.
    pub anisotropy_ratio: Option<Array2<f64>>,
}

impl ExtraData {
    pub fn memory_bytes(&self) -> usize {
        self.anisotropy_ratio.as_ref().map_or(0, |a| a.len() * std::mem::size_of::<f64>())
    }
}

/// Scalars shared by every rate law.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialScalars {
    pub lattice_parameter: f64,
    pub atomic_volume: f64,
    pub impurity_radius: f64,
    pub interstitial_bias: f64,
    pub fission_rate: f64,
    pub zeta: f64,
    pub dislocation_density: f64,
    pub grain_size: f64,
}

/// SoA cluster store.
#[derive(Debug, Clone)]
pub struct ClusterData {
    pub num_clusters: usize,
    pub grid_size: usize,

    // === Static, per cluster ===
    pub regions: Vec<Region>,
    /// [eV]
    pub formation_energy: Vec<f64>,
    /// [eV]
    pub migration_energy: Vec<f64>,
    /// Diffusion prefactor D0 [nm^2/s]; zero for immobile clusters.
    pub diffusion_factor: Vec<f64>,
    /// [nm]
    pub reaction_radius: Vec<f64>,
    /// DOF index of the first moment on each axis; `INVALID_INDEX` when the
    /// axis is not grouped.
    pub moment_ids: Vec<[IndexType; MAX_SPECIES]>,
    pub num_moments: usize,

    // === Per grid point ===
    /// [K]
    pub temperature: Vec<f64>,
    /// Distance of each grid point from the domain origin [nm].
    pub depth: Vec<f64>,
    /// D(cluster, grid) = D0 exp(-Em / kT) [nm^2/s]
    pub diffusion_coefficient: Array2<f64>,

    pub extra: ExtraData,
    pub scalars: MaterialScalars,
}

impl ClusterData {
    /// Empty property arrays for `regions`; moment ids are assigned here.
    pub fn new(regions: Vec<Region>, grid_size: usize, scalars: MaterialScalars) -> Self {
        let n = regions.len();
        let mut data = Self {
            num_clusters: n,
            grid_size,
            regions,
            formation_energy: vec![0.0; n],
            migration_energy: vec![0.0; n],
            diffusion_factor: vec![0.0; n],
            reaction_radius: vec![0.0; n],
            moment_ids: vec![[INVALID_INDEX; MAX_SPECIES]; n],
            num_moments: 0,
            temperature: vec![0.0; grid_size],
            depth: vec![0.0; grid_size],
            diffusion_coefficient: Array2::zeros((n, grid_size)),
            extra: ExtraData::default(),
            scalars,
        };
        data.assign_moment_ids();
        data
    }

    /// Moment ids follow the cluster ids: one per axis of length > 1, in
    /// cluster order then axis order.
    fn assign_moment_ids(&mut self) {
        let mut next = self.num_clusters;
        for (region, ids) in self.regions.iter().zip(self.moment_ids.iter_mut()) {
            for k in 0..region.dim() {
                if region[k].length() > 1 {
                    ids[k] = next;
                    next += 1;
                }
            }
        }
        self.num_moments = next - self.num_clusters;
    }

    /// Clusters plus moments.
    #[inline]
    pub fn num_dofs(&self) -> usize {
        self.num_clusters + self.num_moments
    }

    /// Resize per-grid arrays. Temperatures of new points copy the last
    /// known one.
    pub fn set_grid_size(&mut self, grid_size: usize) {
        let fill = self.temperature.last().copied().unwrap_or(0.0);
        self.temperature.resize(grid_size, fill);
        self.depth.resize(grid_size, 0.0);
        self.grid_size = grid_size;
        self.diffusion_coefficient = Array2::zeros((self.num_clusters, grid_size));
        self.update_diffusion_coefficients();
    }

    pub fn set_temperatures(&mut self, temperatures: &[f64], depths: &[f64]) -> Result<()> {
        check_len("temperatures", self.grid_size, temperatures.len())?;
        check_len("depths", self.grid_size, depths.len())?;
        self.temperature.copy_from_slice(temperatures);
        self.depth.copy_from_slice(depths);
        self.update_diffusion_coefficients();
        Ok(())
    }

    /// Recompute D(cluster, grid) from the current temperatures.
    pub fn update_diffusion_coefficients(&mut self) {
        let factor = &self.diffusion_factor;
        let energy = &self.migration_energy;
        let temperature = &self.temperature;
        Zip::indexed(&mut self.diffusion_coefficient).par_for_each(|(i, g), d| {
            *d = if factor[i] == 0.0 {
                0.0
            } else {
                factor[i] * boltzmann_factor(energy[i], temperature[g])
            };
        });
    }

    #[inline]
    pub fn cluster(&self, id: IndexType) -> Cluster<'_> {
        Cluster { data: self, id }
    }

    /// DOF layout of one cluster, as cached by reactions.
    pub fn dofs(&self, id: IndexType) -> ClusterDofs {
        let region = self.regions[id];
        let mut mean = [0.0; MAX_SPECIES];
        let mut dispersion = [1.0; MAX_SPECIES];
        for k in 0..region.dim() {
            mean[k] = region[k].mean();
            dispersion[k] = region[k].dispersion();
        }
        ClusterDofs {
            id,
            moments: self.moment_ids[id],
            dim: region.dim(),
            volume: region.volume(),
            mean,
            dispersion,
        }
    }

    pub fn memory_bytes(&self) -> usize {
        let per_cluster = std::mem::size_of::<Region>()
            + 4 * std::mem::size_of::<f64>()
            + std::mem::size_of::<[IndexType; MAX_SPECIES]>();
        self.num_clusters * per_cluster
            + 2 * self.grid_size * std::mem::size_of::<f64>()
            + self.diffusion_coefficient.len() * std::mem::size_of::<f64>()
            + self.extra.memory_bytes()
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Read-only view of one cluster.
#[derive(Clone, Copy)]
pub struct Cluster<'a> {
    data: &'a ClusterData,
    id: IndexType,
}

impl<'a> Cluster<'a> {
    pub fn id(&self) -> IndexType {
        self.id
    }

    pub fn region(&self) -> &'a Region {
        &self.data.regions[self.id]
    }

    pub fn formation_energy(&self) -> f64 {
        self.data.formation_energy[self.id]
    }

    pub fn migration_energy(&self) -> f64 {
        self.data.migration_energy[self.id]
    }

    pub fn diffusion_factor(&self) -> f64 {
        self.data.diffusion_factor[self.id]
    }

    pub fn reaction_radius(&self) -> f64 {
        self.data.reaction_radius[self.id]
    }

    pub fn diffusion_coefficient(&self, grid_index: usize) -> f64 {
        self.data.diffusion_coefficient[[self.id, grid_index]]
    }

    pub fn temperature(&self, grid_index: usize) -> f64 {
        self.data.temperature[grid_index]
    }

    pub fn moment_ids(&self) -> &'a [IndexType; MAX_SPECIES] {
        &self.data.moment_ids[self.id]
    }
}

/// Where a cluster's concentration lives in the DOF vector, with the
/// statistics needed to reconstruct it inside the region.
///
/// Within the region, c(x) = c0 + sum_k c1_k (x_k - mean_k) / dispersion_k,
/// where c0 is the DOF at `id` and c1_k the DOF at `moments[k]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterDofs {
    pub id: IndexType,
    pub moments: [IndexType; MAX_SPECIES],
    pub dim: usize,
    pub volume: f64,
    pub mean: [f64; MAX_SPECIES],
    pub dispersion: [f64; MAX_SPECIES],
}

impl ClusterDofs {
    /// Axes carrying a moment.
    pub fn grouped_axes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.dim).filter(move |&k| self.moments[k] != INVALID_INDEX)
    }

    /// DOF index for `slot`: `None` is the average, `Some(k)` the moment on k.
    #[inline]
    pub fn dof(&self, slot: Option<usize>) -> IndexType {
        match slot {
            None => self.id,
            Some(k) => self.moments[k],
        }
    }

    /// `None` followed by every grouped axis.
    pub fn slots(&self) -> Vec<Option<usize>> {
        std::iter::once(None).chain(self.grouped_axes().map(Some)).collect()
    }

    /// Reconstructed concentration at one elementary composition.
    pub fn concentration_at(&self, concentrations: &[f64], amounts: &[u32]) -> f64 {
        let mut c = concentrations[self.id];
        for k in self.grouped_axes() {
            c += concentrations[self.moments[k]] * (amounts[k] as f64 - self.mean[k]) / self.dispersion[k];
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Interval;
    use approx::assert_relative_eq;

    fn scalars() -> MaterialScalars {
        MaterialScalars {
            lattice_parameter: 0.317,
            atomic_volume: 0.0159,
            impurity_radius: 0.3,
            interstitial_bias: 1.15,
            fission_rate: 0.0,
            zeta: 0.73,
            dislocation_density: 0.0003,
            grain_size: 5e4,
        }
    }

    fn sample() -> ClusterData {
        let regions = vec![
            Region::from_intervals(&[Interval::single(1), Interval::single(0)]),
            Region::from_intervals(&[Interval::new(4, 8), Interval::new(2, 4)]),
            Region::from_intervals(&[Interval::new(8, 12), Interval::single(4)]),
        ];
        ClusterData::new(regions, 2, scalars())
    }

    #[test]
    fn test_moment_ids_follow_clusters() {
        let data = sample();
        assert_eq!(data.num_moments, 3);
        assert_eq!(data.num_dofs(), 6);
        assert_eq!(data.moment_ids[0], [INVALID_INDEX; MAX_SPECIES]);
        assert_eq!(data.moment_ids[1][0], 3);
        assert_eq!(data.moment_ids[1][1], 4);
        assert_eq!(data.moment_ids[2][0], 5);
        assert_eq!(data.moment_ids[2][1], INVALID_INDEX);
    }

    #[test]
    fn test_diffusion_follows_temperature() {
        let mut data = sample();
        data.diffusion_factor[0] = 1.0e10;
        data.migration_energy[0] = 0.13;
        data.set_temperatures(&[300.0, 1000.0], &[0.0, 1.0]).unwrap();
        let d_cold = data.cluster(0).diffusion_coefficient(0);
        let d_hot = data.cluster(0).diffusion_coefficient(1);
        assert!(d_hot > d_cold);
        assert_relative_eq!(d_hot, 1.0e10 * (-0.13 / (crate::math::K_BOLTZMANN * 1000.0)).exp(), max_relative = 1e-12);
        assert_eq!(data.cluster(1).diffusion_coefficient(1), 0.0);
        assert!(data.set_temperatures(&[300.0], &[0.0]).is_err());
    }

    #[test]
    fn test_reconstruction_uses_moments() {
        let data = sample();
        let dofs = data.dofs(1);
        assert_relative_eq!(dofs.volume, 8.0);
        let mut conc = vec![0.0; data.num_dofs()];
        conc[1] = 2.0;
        conc[3] = 0.5;
        assert_relative_eq!(dofs.concentration_at(&conc, &[7, 2]), 2.0 + 0.5 * 1.5 / 1.25);
        assert_eq!(dofs.slots(), vec![None, Some(0), Some(1)]);
    }
}
