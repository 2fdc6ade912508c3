//! Helium and point defects in bcc iron.
//!
//! Pure helium clusters are small and tabulated; helium otherwise sits in
//! vacancy clusters, at most `hev_ratio` atoms per vacancy. Dissociation
//! uses fitted binding energies instead of formation-energy differences.

use crate::cluster::{ClusterData, MaterialScalars};
use crate::composition::{AmountType, Composition, IndexType, Region, MAX_SPECIES};
use crate::config::NetworkOptions;
use crate::generator::{GeneratorContext, ReactionEmitter};
use crate::math::{HELIUM_RADIUS, IRON_LATTICE_CONSTANT, PI};
use crate::reaction::{ClusterSet, ReactionKind, Shift};
use crate::species::Species;
use crate::subpaving::RefinementDetector;

use super::{emit_annihilation, emit_standard, representative, Coverage, Material};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeSpecies {
    He,
    V,
    I,
}

impl Species for FeSpecies {
    const ALL: &'static [Self] = &[FeSpecies::He, FeSpecies::V, FeSpecies::I];

    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            FeSpecies::He => "He",
            FeSpecies::V => "V",
            FeSpecies::I => "I",
        }
    }

    fn name(self) -> &'static str {
        match self {
            FeSpecies::He => "Helium",
            FeSpecies::V => "Vacancy",
            FeSpecies::I => "Interstitial",
        }
    }

    fn is_vacancy(self) -> bool {
        self == FeSpecies::V
    }

    fn is_interstitial(self) -> bool {
        self == FeSpecies::I
    }
}

const HE: usize = 0;
const V: usize = 1;
const I: usize = 2;

/// Largest pure helium cluster.
const MAX_PURE_HE: AmountType = 8;

/// Binding of He_n against kicking out a self-interstitial (He_n -> He_nV + I).
const HE_TRAP_BINDING: [f64; 9] = [0.0, 4.31, 2.90, 2.02, 1.09, 0.58, 0.13, -0.25, -0.59];

const V1_FORMATION: f64 = 1.73;
const V_SURFACE_TERM: f64 = 2.59;
const I_EMISSION_BINDING: f64 = 4.88;
const HE_V_LOG_TERM: f64 = 2.5;
const HE1_FORMATION: f64 = 4.08;
const I1_FORMATION: f64 = 3.77;
/// No reverse reaction.
const UNBOUND: f64 = 5.0;

const HE_MIGRATION: [f64; 3] = [0.06, 0.06, 0.06];
const HE_DIFFUSION: [f64; 3] = [1.0e11, 5.0e10, 3.3e10];
const V1_MIGRATION: f64 = 0.67;
const V1_DIFFUSION: f64 = 1.0e11;
const I1_MIGRATION: f64 = 0.34;
const I1_DIFFUSION: f64 = 1.0e11;

const I1_SINK_BIAS: f64 = 1.05;

/// n^(2/3) - (n - 1)^(2/3)
fn surface_step(n: f64) -> f64 {
    n.powf(2.0 / 3.0) - (n - 1.0).max(0.0).powf(2.0 / 3.0)
}

fn v_formation(n: f64) -> f64 {
    V1_FORMATION + V_SURFACE_TERM * (n.powf(2.0 / 3.0) - 1.0)
}

/// Binding of a (possibly grouped) He_aV_b cluster against emitting a
/// vacancy or an interstitial, at its mean composition.
fn hev_binding(he: f64, v: f64, emits_interstitial: bool) -> f64 {
    let mixing = HE_V_LOG_TERM * (1.0 + he / v).ln();
    if emits_interstitial {
        I_EMISSION_BINDING + V_SURFACE_TERM * surface_step(v) - mixing
    } else {
        V1_FORMATION - V_SURFACE_TERM * surface_step(v) + mixing
    }
}

#[derive(Debug, Clone)]
pub struct FeMaterial {
    max: [AmountType; MAX_SPECIES],
    hev_ratio: f64,
    grouping_min: AmountType,
    widths: [AmountType; MAX_SPECIES],
}

impl FeMaterial {
    fn he_cap(&self, v: AmountType) -> AmountType {
        ((self.hev_ratio * v as f64) as AmountType).min(self.max[HE])
    }

    fn pure_he_max(&self) -> AmountType {
        self.max[HE].min(MAX_PURE_HE)
    }

    pub fn is_valid(&self, comp: &Composition) -> bool {
        let (he, v, i) = (comp[HE], comp[V], comp[I]);
        match (he > 0, v > 0, i > 0) {
            (false, false, true) => i <= self.max[I],
            (_, _, true) => false,
            (true, false, false) => he <= self.pure_he_max(),
            (_, true, false) => v <= self.max[V] && he <= self.he_cap(v),
            (false, false, false) => false,
        }
    }

    fn coverage(&self, region: &Region) -> Coverage {
        let lo = |k: usize| region[k].begin;
        let hi = |k: usize| region[k].last();

        if lo(I) > 0 {
            if lo(HE) > 0 || lo(V) > 0 || lo(I) > self.max[I] {
                return Coverage::None;
            }
            let pure = hi(HE) == 0 && hi(V) == 0 && hi(I) <= self.max[I];
            return if pure { Coverage::Full } else { Coverage::Partial };
        }
        if hi(I) > 0 || (lo(V) == 0 && hi(V) > 0) {
            return Coverage::Partial;
        }
        if hi(V) == 0 {
            let cap = self.pure_he_max();
            return if hi(HE) == 0 || lo(HE) > cap {
                Coverage::None
            } else if lo(HE) > 0 && hi(HE) <= cap {
                Coverage::Full
            } else {
                Coverage::Partial
            };
        }

        // Every composition holds vacancies.
        if lo(V) > self.max[V] || lo(HE) > self.he_cap(hi(V)) {
            return Coverage::None;
        }
        if hi(V) <= self.max[V] && hi(HE) <= self.he_cap(lo(V)) {
            Coverage::Full
        } else {
            Coverage::Partial
        }
    }
}

impl RefinementDetector for FeMaterial {
    fn refine(&self, region: &Region, flags: &mut [bool]) -> bool {
        let small = region[V].last() == 0 || (region[V].begin < self.grouping_min && region[HE].begin < self.grouping_min);
        self.coverage(region).refine(region, &self.widths, small, flags)
    }

    fn select(&self, region: &Region) -> bool {
        self.coverage(region) == Coverage::Full
    }
}

impl Material for FeMaterial {
    type Species = FeSpecies;

    const NAME: &'static str = "Fe";

    fn new(max_amounts: &[AmountType], options: &NetworkOptions) -> Self {
        let mut max = [0; MAX_SPECIES];
        for (m, &a) in max.iter_mut().zip(max_amounts) {
            *m = a;
        }
        let mut widths = [1; MAX_SPECIES];
        for (k, species) in FeSpecies::ALL.iter().enumerate() {
            if species.groupable() {
                widths[k] = options.grouping_width(k);
            }
        }
        Self { max, hev_ratio: options.hev_ratio, grouping_min: options.grouping_min(), widths }
    }

    fn default_lattice_parameter() -> f64 {
        IRON_LATTICE_CONSTANT
    }

    fn default_impurity_radius() -> f64 {
        HELIUM_RADIUS
    }

    /// Two atoms per bcc cell.
    fn atomic_volume(lattice_parameter: f64) -> f64 {
        0.5 * lattice_parameter.powi(3)
    }

    /// Only reported; dissociation uses [`Material::binding_energy`] below.
    fn formation_energy(&self, region: &Region) -> f64 {
        let c = representative(region);
        if c[I] > 0 {
            I1_FORMATION * (c[I] as f64).powf(2.0 / 3.0)
        } else if c[V] > 0 {
            v_formation(c[V] as f64) + HE1_FORMATION * c[HE] as f64
        } else {
            HE1_FORMATION * c[HE] as f64
        }
    }

    fn migration_energy(&self, region: &Region) -> f64 {
        mobility(region).map_or(f64::INFINITY, |(em, _)| em)
    }

    fn diffusion_factor(&self, region: &Region, _lattice_parameter: f64) -> f64 {
        mobility(region).map_or(0.0, |(_, d0)| d0)
    }

    fn reaction_radius(&self, region: &Region, scalars: &MaterialScalars) -> f64 {
        let a = scalars.lattice_parameter;
        let grow = |n: f64| (3.0 * a.powi(3) * n / (8.0 * PI)).cbrt() - (3.0 * a.powi(3) / (8.0 * PI)).cbrt();
        let core = 3f64.sqrt() / 4.0 * a;
        let (he, v, i) = (region[HE].mean(), region[V].mean(), region[I].mean());
        if i > 0.0 {
            core + grow(i)
        } else if v > 0.0 {
            core + grow(v)
        } else {
            scalars.impurity_radius + grow(he)
        }
    }

    fn generate_pair<E: ReactionEmitter>(&self, ctx: &GeneratorContext<'_>, i: IndexType, j: IndexType, emitter: &E) {
        let (ri, rj) = (ctx.region(i), ctx.region(j));
        if i == j && ri.is_simplex() {
            let c = ri.origin();
            if c.total() == 1 && (c.is_on_axis(V) || c.is_on_axis(I)) {
                emitter.emit(ReactionKind::Sink, ClusterSet::single(i));
                emitter.emit(ReactionKind::DislocationSink, ClusterSet::single(i));
                emitter.emit(ReactionKind::GrainBoundarySink, ClusterSet::single(i));
            }
        }
        let (vac, int) = match (ri[I].begin > 0, rj[I].begin > 0) {
            (true, true) | (false, false) => {
                emit_standard(ctx, i, j, Shift::NONE, true, emitter);
                return;
            }
            (true, false) if rj[V].begin > 0 => (j, i),
            (false, true) if ri[V].begin > 0 => (i, j),
            _ => return,
        };
        emit_annihilation(ctx, i, j, vac, int, V, I, emitter);

        // Helium-vacancy clusters also emit single interstitials.
        let (rv, r_int) = (ctx.region(vac), ctx.region(int));
        if rv[HE].begin > 0 && r_int.is_simplex() && r_int.origin()[I] == 1 {
            let shift = Shift::annihilate(&[V, I], 1);
            ctx.for_each_product(i, j, &shift, |k| {
                emitter.emit(ReactionKind::Dissociation, ClusterSet::new(k, i, j).with_shift(shift));
            });
        }
    }

    fn binding_energy(&self, data: &ClusterData, c: IndexType, a: IndexType, b: IndexType) -> f64 {
        let region = &data.regions[c];
        let emits = |axis: usize| [a, b].iter().any(|&p| data.regions[p].origin().is_on_axis(axis));
        let (he, v) = (region[HE].mean(), region[V].mean());

        let be = if v == 0.0 && region[I].begin == 0 {
            let n = region[HE].begin;
            if emits(I) {
                HE_TRAP_BINDING.get(n as usize).copied().unwrap_or(UNBOUND)
            } else if n == 2 {
                0.5
            } else {
                1.0
            }
        } else if v == 0.0 {
            UNBOUND
        } else if emits(I) {
            hev_binding(he, v, true)
        } else if emits(V) {
            hev_binding(he, v, false)
        } else {
            UNBOUND
        };
        be.max(-5.0)
    }

    fn sink_bias(&self, region: &Region) -> f64 {
        if region.is_simplex() && region.origin().is_on_axis(I) {
            I1_SINK_BIAS
        } else {
            1.0
        }
    }
}

/// (migration energy, diffusion prefactor) of the mobile clusters.
fn mobility(region: &Region) -> Option<(f64, f64)> {
    if !region.is_simplex() {
        return None;
    }
    let c = region.origin();
    let n = c.total() as usize;
    if c.is_on_axis(HE) && (1..=HE_MIGRATION.len()).contains(&n) {
        Some((HE_MIGRATION[n - 1], HE_DIFFUSION[n - 1]))
    } else if n != 1 {
        None
    } else if c[V] == 1 {
        Some((V1_MIGRATION, V1_DIFFUSION))
    } else if c[I] == 1 {
        Some((I1_MIGRATION, I1_DIFFUSION))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::INVALID_INDEX;
    use crate::config::GroupingParams;
    use crate::network::ReactionNetwork;
    use crate::subpaving::Subpaving;
    use approx::assert_relative_eq;

    fn comp(a: [AmountType; 3]) -> Composition {
        Composition::from_slice(&a)
    }

    fn network(max: [AmountType; 3], options: NetworkOptions) -> ReactionNetwork<FeMaterial> {
        ReactionNetwork::new(&max, 1, options).unwrap()
    }

    #[test]
    fn test_validity_rules() {
        let m = FeMaterial::new(&[12, 3, 2], &NetworkOptions::default());
        assert!(m.is_valid(&comp([8, 0, 0])));
        assert!(!m.is_valid(&comp([9, 0, 0])));
        assert!(m.is_valid(&comp([12, 3, 0])));
        assert!(!m.is_valid(&comp([5, 1, 0])));
        assert!(m.is_valid(&comp([0, 0, 2])));
        assert!(!m.is_valid(&comp([1, 0, 1])));
        assert!(!m.is_valid(&comp([0, 0, 0])));
    }

    #[test]
    fn test_tiles_cover_exactly_the_valid_compositions() {
        let mut options = NetworkOptions::default();
        options.grouping = Some(GroupingParams { min: 4, widths: vec![4, 2, 1] });
        for max in [[8, 0, 0], [20, 6, 2], [4, 3, 3]] {
            let m = FeMaterial::new(&max, &options);
            let sp = Subpaving::build(&max, &[], &m).unwrap();
            let mut covered = 0usize;
            for id in 0..sp.num_tiles() {
                for c in sp.tile_region(id).compositions() {
                    assert!(m.is_valid(&c), "{c:?} in tile {id}");
                    covered += 1;
                }
            }
            let valid = sp.root_region().compositions().iter().filter(|c| m.is_valid(c)).count();
            assert_eq!(covered, valid);
        }
    }

    #[test]
    fn test_binding_energy_table() {
        let net = network([4, 2, 1], NetworkOptions::default());
        let id = |a| net.find_cluster_id(&comp(a));
        let data = net.cluster_data();
        let m = net.material();
        assert_relative_eq!(m.binding_energy(data, id([2, 0, 0]), id([1, 0, 0]), id([1, 0, 0])), 0.5);
        assert_relative_eq!(m.binding_energy(data, id([3, 0, 0]), id([1, 0, 0]), id([2, 0, 0])), 1.0);
        assert_relative_eq!(m.binding_energy(data, id([2, 0, 0]), id([2, 1, 0]), id([0, 0, 1])), 2.90);
        // V2 -> V1 + V1
        let expected = 1.73 - 2.59 * (2f64.powf(2.0 / 3.0) - 1.0);
        assert_relative_eq!(m.binding_energy(data, id([0, 2, 0]), id([0, 1, 0]), id([0, 1, 0])), expected);
        // He2V1 -> He2 + V1 carries the helium log term.
        let hev = 1.73 - 2.59 + 2.5 * 3f64.ln();
        assert_relative_eq!(m.binding_energy(data, id([2, 1, 0]), id([2, 0, 0]), id([0, 1, 0])), hev);
    }

    #[test]
    fn test_helium_vacancy_emits_interstitial() {
        let net = network([4, 2, 1], NetworkOptions::default());
        let id = |a| net.find_cluster_id(&comp(a));
        let (he2, he2v1, i1, v1) = (id([2, 0, 0]), id([2, 1, 0]), id([0, 0, 1]), id([0, 1, 0]));
        let pair = (he2v1.min(i1), he2v1.max(i1));

        let emission = net
            .reactions()
            .of_kind(ReactionKind::Dissociation)
            .iter()
            .map(|r| r.cluster_set())
            .find(|s| s.cluster0 == he2 && (s.cluster1.min(s.cluster2), s.cluster1.max(s.cluster2)) == pair)
            .unwrap();
        assert_eq!(emission.shift, Shift::annihilate(&[V, I], 1));

        // The forward recombination and full V1 + I1 annihilation exist too.
        let productions: Vec<ClusterSet> =
            net.reactions().of_kind(ReactionKind::Production).iter().map(|r| r.cluster_set()).collect();
        assert!(productions.iter().any(|s| (s.cluster0, s.cluster1, s.cluster2) == (pair.0, pair.1, he2)));
        assert!(productions.iter().any(|s| (s.cluster0, s.cluster1, s.cluster2) == (v1.min(i1), v1.max(i1), INVALID_INDEX)));
    }

    #[test]
    fn test_mobility_and_sink_bias() {
        let m = FeMaterial::new(&[4, 1, 1], &NetworkOptions::default());
        assert_relative_eq!(m.sink_bias(&Region::simplex(&comp([0, 0, 1]))), 1.05);
        assert_relative_eq!(m.sink_bias(&Region::simplex(&comp([0, 1, 0]))), 1.0);
        assert_relative_eq!(m.migration_energy(&Region::simplex(&comp([0, 1, 0]))), 0.67);
        assert!(m.diffusion_factor(&Region::simplex(&comp([3, 0, 0])), IRON_LATTICE_CONSTANT) > 0.0);
        assert_relative_eq!(m.diffusion_factor(&Region::simplex(&comp([4, 0, 0])), IRON_LATTICE_CONSTANT), 0.0);
    }
}
