//! Staged construction of a [`ReactionNetwork`].
//!
//! `build()` validates the inputs, tiles composition space, fills the cluster
//! data store and generates reactions. Any error aborts the whole build.

use std::marker::PhantomData;

use log::debug;
use rayon::prelude::*;

use crate::cluster::{ClusterData, MaterialScalars};
use crate::composition::AmountType;
use crate::config::NetworkOptions;
use crate::error::{NetworkError, Result};
use crate::material::Material;
use crate::species::num_species;
use crate::subpaving::{SubdivisionRatio, Subpaving};

use super::ReactionNetwork;

#[derive(Debug, Clone)]
pub struct NetworkBuilder<M: Material> {
    max_amounts: Vec<AmountType>,
    grid_size: usize,
    options: NetworkOptions,
    ratios: Option<Vec<SubdivisionRatio>>,
    _material: PhantomData<M>,
}

impl<M: Material> Default for NetworkBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Material> NetworkBuilder<M> {
    pub fn new() -> Self {
        Self {
            max_amounts: Vec::new(),
            grid_size: 1,
            options: NetworkOptions::default(),
            ratios: None,
            _material: PhantomData,
        }
    }

    /// Largest amount of each species, in axis order.
    pub fn max_amounts(mut self, max_amounts: &[AmountType]) -> Self {
        self.max_amounts = max_amounts.to_vec();
        self
    }

    pub fn grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size;
        self
    }

    pub fn options(mut self, options: NetworkOptions) -> Self {
        self.options = options;
        self
    }

    /// Override the material's subdivision ratios.
    pub fn subdivision_ratios(mut self, ratios: Vec<SubdivisionRatio>) -> Self {
        self.ratios = Some(ratios);
        self
    }

    pub fn build(self) -> Result<ReactionNetwork<M>> {
        let dim = num_species::<M::Species>();
        if self.max_amounts.len() != dim {
            return Err(NetworkError::SpeciesCountMismatch { expected: dim, found: self.max_amounts.len() });
        }
        if self.grid_size == 0 {
            return Err(NetworkError::ZeroGridSize);
        }
        self.options.validate(dim)?;

        let material = M::new(&self.max_amounts, &self.options);
        let root = material.root_amounts(&self.max_amounts);
        let ratios = self.ratios.unwrap_or_else(|| material.subdivision_ratios());
        let subpaving = Subpaving::build(&root, &ratios, &material)?;
        debug!(
            "{}: subpaving built with {} tiles ({} nodes, depth {})",
            M::NAME,
            subpaving.num_tiles(),
            subpaving.node_count(),
            subpaving.depth()
        );

        let scalars = scalars_for::<M>(&self.options);
        let data = cluster_data(&material, &subpaving, self.grid_size, scalars, self.options.temperature);
        debug!("{}: cluster data generated for {} clusters", M::NAME, data.num_clusters);

        let mut network = ReactionNetwork::assemble(material, self.options, self.max_amounts, subpaving, data);
        network.initialize_reactions()?;
        Ok(network)
    }
}

/// Material scalars with option overrides applied.
pub(crate) fn scalars_for<M: Material>(options: &NetworkOptions) -> MaterialScalars {
    let lattice_parameter = options.lattice_parameter.unwrap_or_else(M::default_lattice_parameter);
    MaterialScalars {
        lattice_parameter,
        atomic_volume: M::atomic_volume(lattice_parameter),
        impurity_radius: options.impurity_radius.unwrap_or_else(M::default_impurity_radius),
        interstitial_bias: options.interstitial_bias,
        fission_rate: options.fission_rate,
        zeta: options.zeta,
        dislocation_density: options.dislocation_density,
        grain_size: options.grain_size,
    }
}

fn cluster_data<M: Material>(
    material: &M,
    subpaving: &Subpaving,
    grid_size: usize,
    scalars: MaterialScalars,
    temperature: f64,
) -> ClusterData {
    let regions = (0..subpaving.num_tiles()).map(|id| *subpaving.tile_region(id)).collect();
    let mut data = ClusterData::new(regions, grid_size, scalars);
    fill_properties(material, &mut data);
    data.temperature.iter_mut().for_each(|t| *t = temperature);
    data.update_diffusion_coefficients();
    material.initialize_extra(&mut data);
    data
}

/// Per-cluster properties that depend only on the region and the scalars.
pub(crate) fn fill_properties<M: Material>(material: &M, data: &mut ClusterData) {
    let a = data.scalars.lattice_parameter;
    let props: Vec<(f64, f64, f64)> = data
        .regions
        .par_iter()
        .map(|r| (material.formation_energy(r), material.migration_energy(r), material.diffusion_factor(r, a)))
        .collect();
    for (i, (ef, em, d0)) in props.into_iter().enumerate() {
        data.formation_energy[i] = ef;
        data.migration_energy[i] = em;
        data.diffusion_factor[i] = d0;
    }
    fill_radii(material, data);
}

pub(crate) fn fill_radii<M: Material>(material: &M, data: &mut ClusterData) {
    let scalars = data.scalars;
    data.reaction_radius = data.regions.par_iter().map(|r| material.reaction_radius(r, &scalars)).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::ne::NeMaterial;
    use crate::material::psi::PsiMaterial;

    #[test]
    fn test_rejects_wrong_species_count() {
        let err = NetworkBuilder::<PsiMaterial>::new().max_amounts(&[4, 0]).build().unwrap_err();
        assert_eq!(err, NetworkError::SpeciesCountMismatch { expected: 5, found: 2 });
    }

    #[test]
    fn test_rejects_zero_grid() {
        let err = NetworkBuilder::<NeMaterial>::new().max_amounts(&[4]).grid_size(0).build().unwrap_err();
        assert_eq!(err, NetworkError::ZeroGridSize);
    }

    #[test]
    fn test_rejects_empty_network() {
        let err = NetworkBuilder::<NeMaterial>::new().max_amounts(&[0]).build().unwrap_err();
        assert_eq!(err, NetworkError::EmptyNetwork);
    }

    #[test]
    fn test_options_override_material_defaults() {
        let options = NetworkOptions { lattice_parameter: Some(0.5), ..Default::default() };
        let net = NetworkBuilder::<NeMaterial>::new().max_amounts(&[3]).options(options).build().unwrap();
        assert_eq!(net.cluster_data().scalars.lattice_parameter, 0.5);
        assert_eq!(net.cluster_data().scalars.atomic_volume, 0.25 * 0.125);
        assert!(net.cluster_data().temperature.iter().all(|&t| t == 933.0));
    }
}
