//! The reaction network facade.
//!
//! A [`ReactionNetwork`] owns the tiling of composition space, the cluster
//! data store and the generated reactions. Solvers drive it through
//! temperature/time updates and flux/Jacobian evaluation at one grid point
//! per call. Structural changes (grid size, reaction toggles, lattice
//! parameter) leave the reactions stale until
//! [`ReactionNetwork::initialize_reactions`] runs again.

pub mod builder;
pub mod mirror;
pub mod totals;

pub use builder::NetworkBuilder;
pub use mirror::{ClusterDataMirror, SubpavingMirror};
pub use totals::{TotalKind, TotalQuantity};

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

use crate::cluster::{Cluster, ClusterData};
use crate::composition::{AmountType, Composition, IndexType, Region, INVALID_INDEX};
use crate::compute::AtomicBuffer;
use crate::config::{NetworkOptions, ReactionToggles};
use crate::error::{check_len, NetworkError, Result};
use crate::generator;
use crate::graph::{Connectivity, SparseFillMap};
use crate::material::Material;
use crate::reaction::{GridPoint, Reaction, ReactionCollection, ReactionKind};
use crate::species::{num_species, vacancy_axis, Species};
use crate::subpaving::Subpaving;

use mirror::MirrorCache;

#[derive(Debug, Clone)]
pub struct ReactionNetwork<M: Material> {
    material: M,
    options: NetworkOptions,
    max_amounts: Vec<AmountType>,
    subpaving: Subpaving,
    data: ClusterData,
    reactions: ReactionCollection,
    connectivity: Connectivity,
    largest_rate: f64,
    time: f64,
    stale: bool,
    /// Bumped on every change to cluster data or reactions.
    version: u64,
    mirrors: MirrorCache,
}

impl<M: Material> ReactionNetwork<M> {
    // -------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------

    /// Build a network with default subdivision ratios.
    pub fn new(max_amounts: &[AmountType], grid_size: usize, options: NetworkOptions) -> Result<Self> {
        NetworkBuilder::new().max_amounts(max_amounts).grid_size(grid_size).options(options).build()
    }

    pub fn builder() -> NetworkBuilder<M> {
        NetworkBuilder::new()
    }

    pub(crate) fn assemble(
        material: M,
        options: NetworkOptions,
        max_amounts: Vec<AmountType>,
        subpaving: Subpaving,
        data: ClusterData,
    ) -> Self {
        let connectivity = Connectivity::diagonal(data.num_dofs());
        Self {
            material,
            options,
            max_amounts,
            subpaving,
            data,
            reactions: ReactionCollection::default(),
            connectivity,
            largest_rate: 0.0,
            time: 0.0,
            stale: true,
            version: 0,
            mirrors: MirrorCache::default(),
        }
    }

    /// Regenerate reactions and the Jacobian pattern, then refresh rates.
    pub fn initialize_reactions(&mut self) -> Result<()> {
        self.reactions = generator::generate(&self.material, &self.subpaving, &self.data, &self.options);
        let reduced = self.options.reactions.reduced_jacobian;
        self.connectivity = self.reactions.connectivity(self.data.num_dofs(), reduced);
        self.reactions.cache_offsets(&self.connectivity);
        info!(
            "{}: {} clusters, {} moments, {} reactions, {} Jacobian entries{}",
            M::NAME,
            self.data.num_clusters,
            self.data.num_moments,
            self.reactions.len(),
            self.connectivity.nnz(),
            if reduced { " (reduced)" } else { "" }
        );
        self.stale = false;
        self.version += 1;
        self.update_reaction_rates()
    }

    fn ensure_fresh(&self) -> Result<()> {
        if self.stale {
            Err(NetworkError::StaleReactions)
        } else {
            Ok(())
        }
    }

    fn check_grid_index(&self, grid_index: usize) -> Result<()> {
        if grid_index >= self.data.grid_size {
            return Err(NetworkError::DimensionMismatch {
                what: "grid index (must be below the grid size)",
                expected: self.data.grid_size,
                found: grid_index,
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------

    pub fn material(&self) -> &M {
        &self.material
    }

    pub fn options(&self) -> &NetworkOptions {
        &self.options
    }

    pub fn max_amounts(&self) -> &[AmountType] {
        &self.max_amounts
    }

    pub fn subpaving(&self) -> &Subpaving {
        &self.subpaving
    }

    pub fn cluster_data(&self) -> &ClusterData {
        &self.data
    }

    pub fn reactions(&self) -> &ReactionCollection {
        &self.reactions
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn num_clusters(&self) -> usize {
        self.data.num_clusters
    }

    /// Clusters plus moments; the length of every concentration vector.
    pub fn num_dofs(&self) -> usize {
        self.data.num_dofs()
    }

    pub fn grid_size(&self) -> usize {
        self.data.grid_size
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn cluster(&self, id: IndexType) -> Cluster<'_> {
        self.data.cluster(id)
    }

    // -------------------------------------------------------------------
    // Per-step updates
    // -------------------------------------------------------------------

    pub fn set_temperatures(&mut self, temperatures: &[f64], depths: &[f64]) -> Result<()> {
        self.data.set_temperatures(temperatures, depths)?;
        self.material.update_extra(&mut self.data);
        self.version += 1;
        if self.stale {
            return Ok(());
        }
        self.update_reaction_rates()
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Recompute every rate and the largest rate.
    pub fn update_reaction_rates(&mut self) -> Result<()> {
        self.ensure_fresh()?;
        self.largest_rate =
            self.reactions.update_rates(&self.material, &self.data, self.options.trap_mutation_factor);
        debug!("{}: rates updated, largest {:e}", M::NAME, self.largest_rate);
        Ok(())
    }

    pub fn get_largest_rate(&self) -> f64 {
        self.largest_rate
    }

    // -------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------

    /// Add the reaction part of dc/dt at `point` into `fluxes`.
    pub fn compute_all_fluxes(&self, concentrations: &[f64], fluxes: &mut [f64], point: &GridPoint) -> Result<()> {
        self.ensure_fresh()?;
        let n = self.num_dofs();
        check_len("concentrations", n, concentrations.len())?;
        check_len("fluxes", n, fluxes.len())?;
        self.check_grid_index(point.index)?;

        let buffer = AtomicBuffer::zeros(n);
        self.reactions.compute_fluxes(&self.data, concentrations, &buffer, point);
        buffer.add_into(fluxes);
        Ok(())
    }

    /// Add the reaction Jacobian at `point` into `values`, laid out by
    /// [`Self::get_diagonal_fill`].
    pub fn compute_all_partials(&self, concentrations: &[f64], values: &mut [f64], point: &GridPoint) -> Result<()> {
        self.ensure_fresh()?;
        check_len("concentrations", self.num_dofs(), concentrations.len())?;
        check_len("partial values", self.connectivity.nnz(), values.len())?;
        self.check_grid_index(point.index)?;

        let buffer = AtomicBuffer::zeros(values.len());
        let reduced = self.options.reactions.reduced_jacobian;
        self.reactions.compute_partials(&self.data, concentrations, &buffer, point, reduced);
        buffer.add_into(values);
        Ok(())
    }

    /// Jacobian sparsity: row DOF to sorted column DOFs.
    pub fn get_diagonal_fill(&self) -> SparseFillMap {
        self.connectivity.fill_map()
    }

    /// Total loss rate of `cluster_id` through production and dissociation,
    /// per unit of its own concentration.
    pub fn get_left_side_rate(&self, concentrations: &[f64], cluster_id: IndexType, grid_index: usize) -> Result<f64> {
        self.ensure_fresh()?;
        check_len("concentrations", self.num_dofs(), concentrations.len())?;
        self.check_grid_index(grid_index)?;
        let rate: f64 = self
            .reactions
            .all()
            .par_iter()
            .map(|r| r.left_side_rate(concentrations, cluster_id, grid_index))
            .sum();
        Ok(rate)
    }

    // -------------------------------------------------------------------
    // Totals
    // -------------------------------------------------------------------

    /// Evaluate several totals at once, in request order.
    pub fn get_totals(&self, concentrations: &[f64], quantities: &[TotalQuantity]) -> Result<Vec<f64>> {
        check_len("concentrations", self.num_dofs(), concentrations.len())?;
        let vacancy = vacancy_axis::<M::Species>();
        Ok(quantities
            .iter()
            .map(|q| totals::compute_total(&self.data, concentrations, q, vacancy))
            .collect())
    }

    fn total(&self, concentrations: &[f64], kind: TotalKind, species: M::Species, min_size: AmountType) -> Result<f64> {
        let q = TotalQuantity::new(kind, species.index(), min_size);
        Ok(self.get_totals(concentrations, std::slice::from_ref(&q))?[0])
    }

    pub fn get_total_concentration(&self, concentrations: &[f64], species: M::Species, min_size: AmountType) -> Result<f64> {
        self.total(concentrations, TotalKind::Concentration, species, min_size)
    }

    pub fn get_total_atom_concentration(&self, concentrations: &[f64], species: M::Species, min_size: AmountType) -> Result<f64> {
        self.total(concentrations, TotalKind::Atom, species, min_size)
    }

    pub fn get_total_radius(&self, concentrations: &[f64], species: M::Species, min_size: AmountType) -> Result<f64> {
        self.total(concentrations, TotalKind::Radius, species, min_size)
    }

    pub fn get_total_volume_fraction(&self, concentrations: &[f64], species: M::Species, min_size: AmountType) -> Result<f64> {
        self.total(concentrations, TotalKind::VolumeFraction, species, min_size)
    }

    pub fn get_total_trapped_atom_concentration(
        &self,
        concentrations: &[f64],
        species: M::Species,
        min_size: AmountType,
    ) -> Result<f64> {
        self.total(concentrations, TotalKind::Trapped, species, min_size)
    }

    // -------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------

    /// Tile holding `comp`, or `INVALID_INDEX`.
    pub fn find_cluster_id(&self, comp: &Composition) -> IndexType {
        if comp.dim() != self.max_amounts.len() {
            return INVALID_INDEX;
        }
        self.subpaving.find_tile_id(comp)
    }

    /// Like [`Self::find_cluster_id`] but a miss is an error.
    pub fn require_cluster(&self, comp: &Composition) -> Result<IndexType> {
        match self.find_cluster_id(comp) {
            INVALID_INDEX => Err(NetworkError::MissingCluster { composition: composition_label::<M::Species>(comp) }),
            id => Ok(id),
        }
    }

    /// The single vacancy, or `INVALID_INDEX` without a vacancy species.
    pub fn get_single_vacancy(&self) -> IndexType {
        match vacancy_axis::<M::Species>() {
            Some(v) => self.find_cluster_id(&Composition::on_axis(num_species::<M::Species>(), v, 1)),
            None => INVALID_INDEX,
        }
    }

    /// Cluster reaching the largest total amount; the lowest id wins ties.
    pub fn get_largest_cluster_id(&self) -> IndexType {
        let mut best = (INVALID_INDEX, 0);
        for (id, region) in self.data.regions.iter().enumerate() {
            let size = region.upper_limit_point().total();
            if best.0 == INVALID_INDEX || size > best.1 {
                best = (id, size);
            }
        }
        best.0
    }

    // -------------------------------------------------------------------
    // Restart support
    // -------------------------------------------------------------------

    /// Inclusive `(low, high)` bounds of every cluster on every axis.
    pub fn get_all_cluster_bounds(&self) -> Vec<Vec<(AmountType, AmountType)>> {
        self.data
            .regions
            .iter()
            .map(|r| r.intervals().iter().map(|iv| (iv.begin, iv.last())).collect())
            .collect()
    }

    /// Moment id per axis of every cluster (`INVALID_INDEX` where ungrouped).
    pub fn get_all_moment_id_info(&self) -> Vec<Vec<IndexType>> {
        self.data
            .moment_ids
            .iter()
            .zip(&self.data.regions)
            .map(|(ids, r)| ids[..r.dim()].to_vec())
            .collect()
    }

    /// Check a cluster map read back from a restart file against this
    /// network.
    pub fn initialize_cluster_map(
        &self,
        bounds: &[Vec<(AmountType, AmountType)>],
        moment_ids: &[Vec<IndexType>],
    ) -> Result<()> {
        check_len("cluster bounds", self.num_clusters(), bounds.len())?;
        check_len("moment ids", self.num_clusters(), moment_ids.len())?;
        let own_bounds = self.get_all_cluster_bounds();
        let own_moments = self.get_all_moment_id_info();
        let mismatch = (0..self.num_clusters())
            .find(|&id| bounds[id] != own_bounds[id] || moment_ids[id] != own_moments[id]);
        match mismatch {
            Some(cluster) => Err(NetworkError::ClusterMapMismatch { cluster }),
            None => Ok(()),
        }
    }

    /// Space-separated cluster labels in id order, e.g. `He1 He2V1 He[8-11]V2`.
    pub fn get_header_string(&self) -> String {
        self.data.regions.iter().map(region_label::<M::Species>).collect::<Vec<_>>().join(" ")
    }

    pub fn subpaving_mirror(&mut self) -> &SubpavingMirror {
        self.mirrors.subpaving(&self.subpaving, self.version)
    }

    pub fn cluster_data_mirror(&mut self) -> &ClusterDataMirror {
        self.mirrors.cluster_data(&self.data, self.version)
    }

    // -------------------------------------------------------------------
    // Sub-network coupling
    // -------------------------------------------------------------------

    /// Copy externally computed coupling rates into the constant reactions
    /// at `grid_index`. `rates` is indexed by (row cluster, column cluster).
    pub fn set_constant_rates(&mut self, rates: &Array2<f64>, grid_index: usize) -> Result<()> {
        self.ensure_fresh()?;
        self.check_grid_index(grid_index)?;
        let n = self.num_clusters();
        check_len("constant rate rows", n, rates.nrows())?;
        check_len("constant rate columns", n, rates.ncols())?;
        self.reactions.of_kind_mut(ReactionKind::Constant).par_iter_mut().for_each(|r| {
            if let Reaction::Constant(c) = r {
                let k = rates[[c.row(), c.col()]];
                c.set_rate(grid_index, k);
            }
        });
        Ok(())
    }

    /// Accumulate cluster-to-cluster Jacobian entries of every non-constant
    /// reaction into `rates`, for export to a coupled network.
    pub fn compute_constant_rates(&self, concentrations: &[f64], grid_index: usize, rates: &mut Array2<f64>) -> Result<()> {
        self.ensure_fresh()?;
        check_len("concentrations", self.num_dofs(), concentrations.len())?;
        self.check_grid_index(grid_index)?;
        let n = self.num_clusters();
        check_len("constant rate rows", n, rates.nrows())?;
        check_len("constant rate columns", n, rates.ncols())?;

        let values = AtomicBuffer::zeros(self.connectivity.nnz());
        let point = GridPoint::at(grid_index);
        let reduced = self.options.reactions.reduced_jacobian;
        self.reactions
            .all()
            .par_iter()
            .filter(|r| r.kind() != ReactionKind::Constant)
            .for_each(|r| r.compute_partials(&self.data, concentrations, &values, &point, reduced));

        let row_map = self.connectivity.row_map();
        for row in 0..n {
            for (k, &col) in self.connectivity.row(row).iter().enumerate() {
                if col < n {
                    rates[[row, col]] += values.get(row_map[row] + k);
                }
            }
        }
        Ok(())
    }

    /// Cluster columns coupled to each cluster row.
    pub fn get_constant_connectivities(&self) -> Vec<Vec<usize>> {
        let n = self.num_clusters();
        (0..n)
            .map(|row| self.connectivity.row(row).iter().copied().filter(|&c| c < n).collect())
            .collect()
    }

    // -------------------------------------------------------------------
    // Structural mutators
    // -------------------------------------------------------------------

    pub fn set_grid_size(&mut self, grid_size: usize) -> Result<()> {
        if grid_size == 0 {
            return Err(NetworkError::ZeroGridSize);
        }
        self.data.set_grid_size(grid_size);
        self.material.initialize_extra(&mut self.data);
        self.reactions.set_grid_size(grid_size);
        self.mark_stale();
        Ok(())
    }

    pub fn set_reaction_toggles(&mut self, toggles: ReactionToggles) {
        self.options.reactions = toggles;
        self.mark_stale();
    }

    pub fn set_reduced_jacobian(&mut self, reduced: bool) {
        self.options.reactions.reduced_jacobian = reduced;
        self.mark_stale();
    }

    /// Rescale every lattice-dependent property.
    pub fn set_lattice_parameter(&mut self, lattice_parameter: f64) -> Result<()> {
        let mut options = self.options.clone();
        options.lattice_parameter = Some(lattice_parameter);
        options.validate(num_species::<M::Species>())?;
        self.options = options;
        self.data.scalars = builder::scalars_for::<M>(&self.options);
        builder::fill_properties(&self.material, &mut self.data);
        self.data.update_diffusion_coefficients();
        self.material.update_extra(&mut self.data);
        self.mark_stale();
        Ok(())
    }

    fn mark_stale(&mut self) {
        self.stale = true;
        self.version += 1;
    }

    // -------------------------------------------------------------------
    // Scalar mutators
    // -------------------------------------------------------------------

    pub fn set_fission_rate(&mut self, fission_rate: f64) -> Result<()> {
        if fission_rate < 0.0 {
            return Err(NetworkError::InvalidOption { name: "fission_rate", reason: "must not be negative".into() });
        }
        self.options.fission_rate = fission_rate;
        self.data.scalars.fission_rate = fission_rate;
        self.refresh_rates()
    }

    pub fn set_zeta(&mut self, zeta: f64) -> Result<()> {
        self.options.zeta = zeta;
        self.data.scalars.zeta = zeta;
        self.refresh_rates()
    }

    pub fn set_impurity_radius(&mut self, radius: f64) -> Result<()> {
        if !(radius > 0.0) {
            return Err(NetworkError::InvalidOption {
                name: "impurity_radius",
                reason: format!("must be positive, got {radius}"),
            });
        }
        self.options.impurity_radius = Some(radius);
        self.data.scalars.impurity_radius = radius;
        builder::fill_radii(&self.material, &mut self.data);
        self.refresh_rates()
    }

    fn refresh_rates(&mut self) -> Result<()> {
        self.version += 1;
        if self.stale {
            return Ok(());
        }
        self.update_reaction_rates()
    }

    pub fn memory_bytes(&self) -> usize {
        self.subpaving.memory_bytes()
            + self.data.memory_bytes()
            + self.reactions.memory_bytes()
            + self.connectivity.memory_bytes()
    }
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

fn composition_label<S: Species>(comp: &Composition) -> String {
    let region = Region::simplex(comp);
    region_label::<S>(&region)
}

/// Species label followed by the amount, or `[low-high]` on grouped axes.
/// Empty axes are left out.
fn region_label<S: Species>(region: &Region) -> String {
    let mut label = String::new();
    for s in S::ALL {
        let iv = region[s.index()];
        if iv.length() > 1 {
            label.push_str(&format!("{}[{}-{}]", s.label(), iv.begin, iv.last()));
        } else if iv.begin > 0 {
            label.push_str(&format!("{}{}", s.label(), iv.begin));
        }
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupingParams;
    use crate::material::ne::{NeMaterial, NeSpecies};
    use crate::material::psi::{PsiMaterial, PsiSpecies};
    use crate::reaction::ClusterSet;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn helium() -> ReactionNetwork<PsiMaterial> {
        ReactionNetwork::new(&[7, 0, 0, 0, 0], 1, NetworkOptions::default()).unwrap()
    }

    fn he(n: AmountType) -> Composition {
        Composition::from_slice(&[n, 0, 0, 0, 0])
    }

    fn grouped_xenon() -> ReactionNetwork<NeMaterial> {
        let options = NetworkOptions {
            grouping: Some(GroupingParams { min: 6, widths: vec![4] }),
            // Hot enough for Xe1 to move.
            temperature: 2000.0,
            ..Default::default()
        };
        ReactionNetwork::new(&[30], 1, options).unwrap()
    }

    fn random_concentrations(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(0.1..1.0)).collect()
    }

    fn fluxes<M: Material>(net: &ReactionNetwork<M>, conc: &[f64]) -> Vec<f64> {
        let mut f = vec![0.0; net.num_dofs()];
        net.compute_all_fluxes(conc, &mut f, &GridPoint::at(0)).unwrap();
        f
    }

    #[test]
    fn test_helium_ids_follow_size() {
        let net = helium();
        assert_eq!(net.num_clusters(), 7);
        assert_eq!(net.num_dofs(), 7);
        for n in 1..=7 {
            assert_eq!(net.find_cluster_id(&he(n)), (n - 1) as usize);
        }
        assert_eq!(net.find_cluster_id(&he(8)), INVALID_INDEX);
        assert_eq!(net.find_cluster_id(&he(0)), INVALID_INDEX);
        assert_eq!(net.get_largest_cluster_id(), 6);
        assert_eq!(net.get_single_vacancy(), INVALID_INDEX);
    }

    #[test]
    fn test_helium_pair_reacts_both_ways() {
        let net = helium();
        let (he1, he2) = (net.find_cluster_id(&he(1)), net.find_cluster_id(&he(2)));
        let reactions = net.reactions();
        let production = reactions.of_kind(ReactionKind::Production);
        let dissociation = reactions.of_kind(ReactionKind::Dissociation);
        assert!(production.iter().any(|r| r.cluster_set() == ClusterSet::new(he1, he1, he2)));
        assert!(dissociation.iter().any(|r| r.cluster_set() == ClusterSet::new(he2, he1, he1)));
        assert!(production.iter().all(|r| r.rate(0) > 0.0));
        assert!(net.get_largest_rate() > 0.0);
    }

    #[test]
    fn test_total_concentration() {
        let net = helium();
        let conc = vec![1.0; net.num_dofs()];
        assert_relative_eq!(net.get_total_concentration(&conc, PsiSpecies::He, 0).unwrap(), 7.0);
        assert_relative_eq!(net.get_total_concentration(&conc, PsiSpecies::He, 3).unwrap(), 5.0);
        assert_relative_eq!(net.get_total_atom_concentration(&conc, PsiSpecies::He, 0).unwrap(), 28.0);
        assert_relative_eq!(net.get_total_trapped_atom_concentration(&conc, PsiSpecies::He, 0).unwrap(), 0.0);
        let totals = net
            .get_totals(&conc, &[TotalQuantity::new(TotalKind::Concentration, 0, 0), TotalQuantity::new(TotalKind::Atom, 0, 7)])
            .unwrap();
        assert_eq!(totals.len(), 2);
        assert_relative_eq!(totals[1], 7.0);
        assert!(net.get_totals(&conc[1..], &[]).is_err());
    }

    #[test]
    fn test_fluxes_conserve_helium() {
        let net = helium();
        let conc = random_concentrations(net.num_dofs(), 7);
        let f = fluxes(&net, &conc);
        let atoms: f64 = f.iter().enumerate().map(|(id, v)| (id + 1) as f64 * v).sum();
        let scale = net.get_largest_rate() * (net.num_clusters() * net.num_clusters()) as f64;
        assert!(atoms.abs() <= 1e-12 * scale, "atom balance {atoms}");
        // He1 is consumed by every production it joins.
        assert!(net.get_left_side_rate(&conc, 0, 0).unwrap() > 0.0);
    }

    #[test]
    fn test_left_side_rate_matches_production_loss() {
        let net = helium();
        let conc = vec![0.5; net.num_dofs()];
        let he1 = net.find_cluster_id(&he(1));
        let loss: f64 = net
            .reactions()
            .of_kind(ReactionKind::Production)
            .iter()
            .map(|r| {
                let s = r.cluster_set();
                let roles = (s.cluster0 == he1) as u32 + (s.cluster1 == he1) as u32;
                roles as f64 * r.rate(0) * conc[s.cluster0] * conc[s.cluster1]
            })
            .sum();
        let rate = net.get_left_side_rate(&conc, he1, 0).unwrap();
        assert!(rate > 0.0);
        assert_relative_eq!(rate * conc[he1], loss, max_relative = 1e-12);
    }

    #[test]
    fn test_flux_accumulates_into_caller_buffer() {
        let net = helium();
        let conc = random_concentrations(net.num_dofs(), 3);
        let once = fluxes(&net, &conc);
        let mut twice = once.clone();
        net.compute_all_fluxes(&conc, &mut twice, &GridPoint::at(0)).unwrap();
        for (a, b) in once.iter().zip(&twice) {
            assert_relative_eq!(2.0 * a, *b, max_relative = 1e-12);
        }
        let mut short = vec![0.0; 3];
        assert!(matches!(
            net.compute_all_fluxes(&conc, &mut short, &GridPoint::at(0)),
            Err(NetworkError::DimensionMismatch { .. })
        ));
        assert!(net.compute_all_fluxes(&conc, &mut twice, &GridPoint::at(1)).is_err());
    }

    fn check_jacobian<M: Material>(net: &ReactionNetwork<M>, seed: u64) {
        let n = net.num_dofs();
        let conc = random_concentrations(n, seed);
        let mut values = vec![0.0; net.connectivity().nnz()];
        net.compute_all_partials(&conc, &mut values, &GridPoint::at(0)).unwrap();
        let norm = values.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);

        let h = 1e-3;
        for col in 0..n {
            let mut up = conc.clone();
            let mut down = conc.clone();
            up[col] += h;
            down[col] -= h;
            let (fu, fd) = (fluxes(net, &up), fluxes(net, &down));
            for row in 0..n {
                let numeric = (fu[row] - fd[row]) / (2.0 * h);
                let analytic = net.connectivity().offset(row, col).map_or(0.0, |o| values[o]);
                assert!(
                    (numeric - analytic).abs() <= 1e-7 * norm,
                    "d flux[{row}] / d c[{col}]: analytic {analytic}, numeric {numeric}"
                );
            }
        }
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        check_jacobian(&helium(), 11);
    }

    #[test]
    fn test_grouped_jacobian_matches_finite_differences() {
        let net = grouped_xenon();
        assert!(net.num_dofs() > net.num_clusters());
        check_jacobian(&net, 5);
    }

    /// Cluster owning each DOF.
    fn dof_owners<M: Material>(net: &ReactionNetwork<M>) -> Vec<IndexType> {
        let data = net.cluster_data();
        let mut owners: Vec<IndexType> = (0..net.num_dofs()).collect();
        for (id, ids) in data.moment_ids.iter().enumerate() {
            ids.iter().filter(|&&m| m != INVALID_INDEX).for_each(|&m| owners[m] = id);
        }
        owners
    }

    #[test]
    fn test_grouped_recombination_jacobian_matches_finite_differences() {
        let options = NetworkOptions {
            grouping: Some(GroupingParams { min: 4, widths: vec![4, 1, 1, 2, 1] }),
            ..Default::default()
        };
        let net = ReactionNetwork::<PsiMaterial>::new(&[12, 0, 0, 4, 2], 1, options).unwrap();
        assert!(net.num_dofs() > net.num_clusters());
        check_jacobian(&net, 17);
    }

    #[test]
    fn test_reduced_jacobian_keeps_cluster_blocks() {
        let mut net = grouped_xenon();
        let conc = random_concentrations(net.num_dofs(), 9);
        let mut full = vec![0.0; net.connectivity().nnz()];
        net.compute_all_partials(&conc, &mut full, &GridPoint::at(0)).unwrap();
        let full_conn = net.connectivity().clone();

        net.set_reduced_jacobian(true);
        assert!(net.is_stale());
        net.initialize_reactions().unwrap();
        assert!(net.connectivity().nnz() < full_conn.nnz());
        assert!(net.connectivity().nnz() > net.num_dofs());

        let owners = dof_owners(&net);
        let fill = net.get_diagonal_fill();
        assert!(fill.iter().all(|(row, cols)| cols.iter().all(|&col| owners[col] == owners[*row])));
        // A grouped cluster keeps its average/moment coupling.
        assert!(fill.iter().any(|(row, cols)| *row < net.num_clusters() && cols.len() > 1));

        let mut reduced = vec![0.0; net.connectivity().nnz()];
        net.compute_all_partials(&conc, &mut reduced, &GridPoint::at(0)).unwrap();
        let norm = full.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
        for (row, cols) in fill.iter() {
            for &col in cols {
                let kept = reduced[net.connectivity().offset(*row, col).unwrap()];
                let expected = full[full_conn.offset(*row, col).unwrap()];
                assert!((kept - expected).abs() <= 1e-12 * norm, "entry ({row}, {col}): {kept} vs {expected}");
            }
        }
    }

    #[test]
    fn test_structural_change_requires_reinitialization() {
        let mut net = helium();
        let version = net.version();
        net.set_grid_size(3).unwrap();
        assert!(net.version() > version);
        let conc = vec![1.0; net.num_dofs()];
        let mut f = vec![0.0; net.num_dofs()];
        assert_eq!(
            net.compute_all_fluxes(&conc, &mut f, &GridPoint::at(2)),
            Err(NetworkError::StaleReactions)
        );
        assert_eq!(net.set_grid_size(0), Err(NetworkError::ZeroGridSize));
        net.initialize_reactions().unwrap();
        net.compute_all_fluxes(&conc, &mut f, &GridPoint::at(2)).unwrap();
        assert!(net.reactions().all().iter().all(|r| r.kind() != ReactionKind::Production || r.rate(2) > 0.0));
    }

    #[test]
    fn test_temperature_raises_rates() {
        let mut net = helium();
        let cold = net.get_largest_rate();
        net.set_temperatures(&[1500.0], &[0.0]).unwrap();
        assert!(net.get_largest_rate() > cold);
        assert!(net.set_temperatures(&[1500.0, 1.0], &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_cluster_lookup_round_trip() {
        let net = grouped_xenon();
        for id in 0..net.num_clusters() {
            let region = *net.cluster(id).region();
            assert_eq!(net.find_cluster_id(&region.origin()), id);
            assert_eq!(net.find_cluster_id(&region.upper_limit_point()), id);
        }
        assert_eq!(net.require_cluster(&Composition::from_slice(&[2])), Ok(1));
        assert_eq!(
            net.require_cluster(&Composition::from_slice(&[31])),
            Err(NetworkError::MissingCluster { composition: "Xe31".into() })
        );
        assert_eq!(net.find_cluster_id(&Composition::from_slice(&[1, 1])), INVALID_INDEX);
    }

    #[test]
    fn test_cluster_map_round_trip() {
        let net = grouped_xenon();
        let mut bounds = net.get_all_cluster_bounds();
        let moments = net.get_all_moment_id_info();
        assert!(net.initialize_cluster_map(&bounds, &moments).is_ok());
        let last = bounds.len() - 1;
        bounds[last][0].1 += 1;
        assert_eq!(
            net.initialize_cluster_map(&bounds, &moments),
            Err(NetworkError::ClusterMapMismatch { cluster: last })
        );
        let header = net.get_header_string();
        assert!(header.starts_with("Xe1 Xe2"));
        assert!(header.contains("Xe[") && header.contains(']'));
        assert_eq!(header.split(' ').count(), net.num_clusters());
    }

    #[test]
    fn test_mirrors_follow_version() {
        let mut net = helium();
        assert_eq!(net.subpaving_mirror().tiles.len(), 7);
        let before = net.cluster_data_mirror().version;
        net.set_temperatures(&[1200.0], &[0.0]).unwrap();
        let mirror = net.cluster_data_mirror();
        assert!(mirror.version > before);
        assert_eq!(mirror.temperature, vec![1200.0]);
    }

    #[test]
    fn test_constant_rates_couple_clusters() {
        let mut options = NetworkOptions::default();
        options.reactions.constant = true;
        options.reactions.standard = false;
        let mut net = ReactionNetwork::<PsiMaterial>::new(&[3, 0, 0, 0, 0], 1, options.clone()).unwrap();
        let n = net.num_clusters();
        assert_eq!(net.get_constant_connectivities().iter().map(|r| r.len()).sum::<usize>(), n * n);

        let conc = random_concentrations(n, 1);
        assert!(fluxes(&net, &conc).iter().all(|&f| f == 0.0));
        let mut rates = Array2::zeros((n, n));
        rates[[0, 1]] = 2.0;
        net.set_constant_rates(&rates, 0).unwrap();
        let coupled = fluxes(&net, &conc);
        assert_relative_eq!(coupled[0], 2.0 * conc[1], max_relative = 1e-12);
        assert_eq!(coupled[1], 0.0);
        assert!(net.set_constant_rates(&Array2::zeros((n, n + 1)), 0).is_err());

        // Exported rates leave the constant reactions out.
        options.reactions.standard = true;
        let mut net = ReactionNetwork::<PsiMaterial>::new(&[3, 0, 0, 0, 0], 1, options).unwrap();
        net.set_constant_rates(&rates, 0).unwrap();
        let mut exported = Array2::zeros((n, n));
        net.compute_constant_rates(&conc, 0, &mut exported).unwrap();
        let mut values = vec![0.0; net.connectivity().nnz()];
        net.compute_all_partials(&conc, &mut values, &GridPoint::at(0)).unwrap();
        let offset = net.connectivity().offset(0, 1).unwrap();
        let scale = values[offset].abs().max(1.0);
        assert!((exported[[0, 1]] - (values[offset] - 2.0)).abs() <= 1e-9 * scale);
    }

    #[test]
    fn test_scalar_mutators_refresh_rates() {
        let mut options = NetworkOptions::default();
        options.reactions.re_solution = true;
        let mut net = ReactionNetwork::<NeMaterial>::new(&[5], 1, options).unwrap();
        let rate = |net: &ReactionNetwork<NeMaterial>| net.reactions().of_kind(ReactionKind::ReSolution)[0].rate(0);
        assert_eq!(rate(&net), 0.0);
        net.set_fission_rate(1e-8).unwrap();
        assert!(rate(&net) > 0.0);
        assert!(net.set_fission_rate(-1.0).is_err());
        let before = net.cluster(0).reaction_radius();
        net.set_impurity_radius(0.5).unwrap();
        assert_relative_eq!(net.cluster(0).reaction_radius(), 0.5);
        assert!(before < 0.5);
        let conc = vec![1.0; net.num_dofs()];
        assert!(net.get_total_radius(&conc, NeSpecies::Xe, 0).unwrap() > 0.0);
        assert!(net.get_total_volume_fraction(&conc, NeSpecies::Xe, 2).unwrap() > 0.0);
    }

    #[test]
    fn test_lattice_change_is_structural() {
        let mut net = helium();
        net.set_lattice_parameter(0.3).unwrap();
        assert!(net.is_stale());
        assert_relative_eq!(net.cluster_data().scalars.lattice_parameter, 0.3);
        assert!(net.set_lattice_parameter(-0.3).is_err());
        assert!(net.memory_bytes() > 0);
    }
}
