//! Point defects and loops in alpha zirconium.
//!
//! Pure vacancy and pure interstitial clusters, both groupable. Diffusion in
//! the hcp lattice is anisotropic: each mobile cluster carries the ratio of
//! its c-axis to a-axis diffusivity per grid point, which biases both capture
//! and loss to the a- and c-type dislocation populations.

use ndarray::{Array2, Zip};

use crate::cluster::{ClusterData, MaterialScalars};
use crate::composition::{AmountType, IndexType, Region};
use crate::config::NetworkOptions;
use crate::generator::{GeneratorContext, ReactionEmitter};
use crate::math::{
    sphere_radius, ALPHA_ZR_A_SINK_STRENGTH, ALPHA_ZR_CORE_RADIUS, ALPHA_ZR_C_OVER_A,
    ALPHA_ZR_C_SINK_STRENGTH, ALPHA_ZR_LATTICE_CONSTANT, K_BOLTZMANN, PI,
};
use crate::reaction::{ClusterSet, ReactionKind, Shift, SinkKind};
use crate::species::Species;
use crate::subpaving::RefinementDetector;

use super::{emit_annihilation, emit_standard, grain_boundary_strength, is_single_atom, representative, Coverage, Material};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZrSpecies {
    V,
    I,
}

impl Species for ZrSpecies {
    const ALL: &'static [Self] = &[ZrSpecies::V, ZrSpecies::I];

    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            ZrSpecies::V => "V",
            ZrSpecies::I => "I",
        }
    }

    fn name(self) -> &'static str {
        match self {
            ZrSpecies::V => "Vacancy",
            ZrSpecies::I => "Interstitial",
        }
    }

    fn is_vacancy(self) -> bool {
        self == ZrSpecies::V
    }

    fn is_interstitial(self) -> bool {
        self == ZrSpecies::I
    }

    /// Interstitial loops are grouped as well.
    fn groupable(self) -> bool {
        true
    }
}

const V: usize = 0;
const I: usize = 1;

const V_FORMATION: f64 = 1.86;
const I_FORMATION: f64 = 3.0;
const V1_MIGRATION: f64 = 0.55;
const V1_DIFFUSION: f64 = 1.0e11;
const I1_MIGRATION: f64 = 0.06;
const I1_DIFFUSION: f64 = 5.0e10;
/// Extra barrier for an interstitial hop along c [eV].
const I_ANISOTROPY_ENERGY: f64 = 0.07;
const INTERSTITIAL_SINK_BIAS: f64 = 1.1;

#[derive(Debug, Clone)]
pub struct ZrMaterial {
    max: [AmountType; 2],
    grouping_min: AmountType,
    widths: [AmountType; 2],
}

impl ZrMaterial {
    fn coverage(&self, region: &Region) -> Coverage {
        let (v, i) = (region[V], region[I]);
        if v.begin > 0 && i.begin > 0 {
            return Coverage::None;
        }
        if v.last() > 0 && i.last() > 0 {
            return Coverage::Partial;
        }
        let k = if v.last() > 0 { V } else { I };
        let iv = region[k];
        if iv.last() == 0 || iv.begin > self.max[k] {
            Coverage::None
        } else if iv.begin == 0 || iv.last() > self.max[k] {
            Coverage::Partial
        } else {
            Coverage::Full
        }
    }

    /// c/a diffusivity ratio of a cluster at temperature `t`.
    fn anisotropy(region: &Region, t: f64) -> f64 {
        if is_single_atom(region) && region[I].begin == 1 && t > 0.0 {
            (-I_ANISOTROPY_ENERGY / (K_BOLTZMANN * t)).exp()
        } else {
            1.0
        }
    }

    fn ratio(data: &ClusterData, cluster: IndexType, grid_index: usize) -> f64 {
        data.extra.anisotropy_ratio.as_ref().map_or(1.0, |r| r[[cluster, grid_index]])
    }

    /// Orientation-averaged diffusivity, with `D` the basal-plane value.
    fn effective_diffusion(data: &ClusterData, cluster: IndexType, grid_index: usize) -> f64 {
        let r = Self::ratio(data, cluster, grid_index);
        data.diffusion_coefficient[[cluster, grid_index]] * (2.0 + r) / 3.0
    }
}

impl RefinementDetector for ZrMaterial {
    fn refine(&self, region: &Region, flags: &mut [bool]) -> bool {
        let k = if region[V].last() > 0 { V } else { I };
        let small = region[k].begin < self.grouping_min;
        self.coverage(region).refine(region, &self.widths, small, flags)
    }

    fn select(&self, region: &Region) -> bool {
        self.coverage(region) == Coverage::Full
    }
}

impl Material for ZrMaterial {
    type Species = ZrSpecies;

    const NAME: &'static str = "Zr";

    fn new(max_amounts: &[AmountType], options: &NetworkOptions) -> Self {
        let get = |k: usize| max_amounts.get(k).copied().unwrap_or(0);
        Self {
            max: [get(V), get(I)],
            grouping_min: options.grouping_min(),
            widths: [options.grouping_width(V), options.grouping_width(I)],
        }
    }

    fn default_lattice_parameter() -> f64 {
        ALPHA_ZR_LATTICE_CONSTANT
    }

    fn default_impurity_radius() -> f64 {
        ALPHA_ZR_CORE_RADIUS
    }

    /// hcp: sqrt(3)/4 a^3 c/a per atom.
    fn atomic_volume(lattice_parameter: f64) -> f64 {
        3f64.sqrt() / 4.0 * lattice_parameter.powi(3) * ALPHA_ZR_C_OVER_A
    }

    fn formation_energy(&self, region: &Region) -> f64 {
        let c = representative(region);
        let scale = if c[I] > 0 { I_FORMATION } else { V_FORMATION };
        scale * (c.total() as f64).powf(2.0 / 3.0)
    }

    fn migration_energy(&self, region: &Region) -> f64 {
        match (is_single_atom(region), region[V].begin) {
            (true, 1) => V1_MIGRATION,
            (true, _) => I1_MIGRATION,
            _ => f64::INFINITY,
        }
    }

    fn diffusion_factor(&self, region: &Region, _lattice_parameter: f64) -> f64 {
        match (is_single_atom(region), region[V].begin) {
            (true, 1) => V1_DIFFUSION,
            (true, _) => I1_DIFFUSION,
            _ => 0.0,
        }
    }

    /// Voids are spheres; interstitial clusters are platelets with a
    /// Burgers vector of one lattice parameter.
    fn reaction_radius(&self, region: &Region, scalars: &MaterialScalars) -> f64 {
        let c = representative(region);
        let omega = scalars.atomic_volume;
        if c[I] > 0 {
            let n = c[I] as f64;
            let platelet = (n * omega / (PI * scalars.lattice_parameter)).sqrt();
            platelet.max(sphere_radius(n, omega))
        } else {
            sphere_radius(c[V] as f64, omega)
        }
    }

    fn initialize_extra(&self, data: &mut ClusterData) {
        data.extra.anisotropy_ratio = Some(Array2::ones((data.num_clusters, data.grid_size)));
        self.update_extra(data);
    }

    fn update_extra(&self, data: &mut ClusterData) {
        let regions = &data.regions;
        let temperature = &data.temperature;
        if let Some(ratio) = data.extra.anisotropy_ratio.as_mut() {
            Zip::indexed(ratio).par_for_each(|(i, g), r| {
                *r = Self::anisotropy(&regions[i], temperature[g]);
            });
        }
    }

    fn generate_pair<E: ReactionEmitter>(&self, ctx: &GeneratorContext<'_>, i: IndexType, j: IndexType, emitter: &E) {
        let (ri, rj) = (ctx.region(i), ctx.region(j));
        if i == j && is_single_atom(ri) {
            emitter.emit(ReactionKind::Sink, ClusterSet::single(i));
            emitter.emit(ReactionKind::DislocationSink, ClusterSet::single(i));
            emitter.emit(ReactionKind::GrainBoundarySink, ClusterSet::single(i));
        }
        match (ri[V].begin > 0, rj[V].begin > 0) {
            (true, true) | (false, false) => {
                emit_standard(ctx, i, j, Shift::NONE, true, emitter);
            }
            (true, false) => emit_annihilation(ctx, i, j, i, j, V, I, emitter),
            (false, true) => emit_annihilation(ctx, i, j, j, i, V, I, emitter),
        }
    }

    fn production_rate(&self, data: &ClusterData, a: IndexType, b: IndexType, grid_index: usize) -> f64 {
        let r = data.reaction_radius[a] + data.reaction_radius[b];
        let d = Self::effective_diffusion(data, a, grid_index) + Self::effective_diffusion(data, b, grid_index);
        4.0 * PI * r * d
    }

    fn sink_bias(&self, region: &Region) -> f64 {
        if region[I].begin > 0 {
            INTERSTITIAL_SINK_BIAS
        } else {
            1.0
        }
    }

    /// a-type and c-type dislocations weighted by the anisotropy ratio `r`:
    /// `D (2 s_a r^(-1/3) + s_c r^(2/3))`.
    fn sink_rate(&self, data: &ClusterData, kind: SinkKind, cluster: IndexType, grid_index: usize) -> f64 {
        let bias = self.sink_bias(&data.regions[cluster]);
        match kind {
            SinkKind::Generic | SinkKind::Dislocation => {
                let r = Self::ratio(data, cluster, grid_index);
                let d = data.diffusion_coefficient[[cluster, grid_index]];
                let strength = 2.0 * ALPHA_ZR_A_SINK_STRENGTH / r.cbrt() + ALPHA_ZR_C_SINK_STRENGTH * r.powf(2.0 / 3.0);
                bias * d * strength
            }
            SinkKind::GrainBoundary => {
                bias * grain_boundary_strength(data.scalars.grain_size) * Self::effective_diffusion(data, cluster, grid_index)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Composition;
    use crate::config::GroupingParams;
    use crate::network::ReactionNetwork;
    use crate::subpaving::Subpaving;
    use approx::assert_relative_eq;

    fn grouped_options() -> NetworkOptions {
        let mut options = NetworkOptions::default();
        options.grouping = Some(GroupingParams { min: 4, widths: vec![4, 4] });
        options.temperature = 570.0;
        options
    }

    #[test]
    fn test_tiles_are_pure() {
        let m = ZrMaterial::new(&[30, 20], &grouped_options());
        let sp = Subpaving::build(&[30, 20], &[], &m).unwrap();
        let mut total = 0;
        for id in 0..sp.num_tiles() {
            let region = sp.tile_region(id);
            assert!(region[V].begin == 0 || region[I].begin == 0);
            total += region.volume() as usize;
        }
        assert_eq!(total, 50);
    }

    #[test]
    fn test_anisotropy_tracks_temperature() {
        let net = ReactionNetwork::<ZrMaterial>::new(&[4, 4], 2, grouped_options()).unwrap();
        let i1 = net.find_cluster_id(&Composition::from_slice(&[0, 1]));
        let v1 = net.find_cluster_id(&Composition::from_slice(&[1, 0]));
        let ratio = net.cluster_data().extra.anisotropy_ratio.as_ref().unwrap();
        assert_relative_eq!(ratio[[v1, 0]], 1.0);
        let expected = (-I_ANISOTROPY_ENERGY / (K_BOLTZMANN * 570.0)).exp();
        assert_relative_eq!(ratio[[i1, 1]], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_isotropic_sink_rate() {
        let mut options = grouped_options();
        options.reactions.sink = true;
        let net = ReactionNetwork::<ZrMaterial>::new(&[4, 4], 1, options).unwrap();
        let v1 = net.find_cluster_id(&Composition::from_slice(&[1, 0]));
        let sink = net
            .reactions()
            .of_kind(ReactionKind::Sink)
            .iter()
            .find(|r| r.cluster_set().cluster0 == v1)
            .unwrap();
        let d = net.cluster(v1).diffusion_coefficient(0);
        let expected = d * (2.0 * ALPHA_ZR_A_SINK_STRENGTH + ALPHA_ZR_C_SINK_STRENGTH);
        assert_relative_eq!(sink.rate(0), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_monomer_recombines_with_grouped_loop() {
        let net = ReactionNetwork::<ZrMaterial>::new(&[2, 30], 1, grouped_options()).unwrap();
        let v1 = net.find_cluster_id(&Composition::from_slice(&[1, 0]));
        let big = net.find_cluster_id(&Composition::from_slice(&[0, 25]));
        assert!(!net.cluster(big).region().is_simplex());
        let hit = net.reactions().of_kind(ReactionKind::Production).iter().any(|r| {
            let s = r.cluster_set();
            let pair = (s.cluster0 == v1 && s.cluster1 == big) || (s.cluster0 == big && s.cluster1 == v1);
            pair && s.shift == Shift::annihilate(&[V, I], 1)
        });
        assert!(hit);
    }
}
