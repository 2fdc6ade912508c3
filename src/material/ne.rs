//! Xenon in nuclear fuel (UO2). One species; bubbles above the grouping
//! threshold are grouped, and fission fragments knock gas atoms back into
//! the matrix (re-solution).

use crate::cluster::{ClusterData, MaterialScalars};
use crate::composition::{AmountType, IndexType, Region};
use crate::config::NetworkOptions;
use crate::generator::{GeneratorContext, ReactionEmitter};
use crate::math::{lerp_clamped, sphere_radius, URANIUM_DIOXIDE_LATTICE_CONSTANT, XENON_RADIUS};
use crate::reaction::{ClusterSet, ReactionKind, Shift};
use crate::species::Species;
use crate::subpaving::RefinementDetector;

use super::{is_single_atom, representative, Coverage, Material};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeSpecies {
    Xe,
}

impl Species for NeSpecies {
    const ALL: &'static [Self] = &[NeSpecies::Xe];

    fn index(self) -> usize {
        0
    }

    fn label(self) -> &'static str {
        "Xe"
    }

    fn name(self) -> &'static str {
        "Xenon"
    }
}

const XE1_MIGRATION: f64 = 3.04;
/// nm^2/s
const XE1_DIFFUSION: f64 = 7.6e8;
const XE_FORMATION_SCALE: f64 = 7.0;
/// Volume of a xenon atom in a bubble [nm^3].
const XE_ATOMIC_VOLUME: f64 = 0.0851;

/// Re-solution fits `a * exp(-r / b)` per fission [nm^3], for the two
/// stopping-power fractions they were fitted at.
const RESOLUTION_FIT_LOW: (f64, f64) = (1.0e3, 0.5);
const RESOLUTION_FIT_HIGH: (f64, f64) = (2.0e3, 0.6);
const ZETA_LOW: f64 = 0.73;
const ZETA_HIGH: f64 = 0.76;

/// Knock-out yield per fission for a bubble of radius `radius`, interpolated
/// in `zeta` between the two fits.
pub fn re_solution_yield(radius: f64, zeta: f64) -> f64 {
    let fit = |(a, b): (f64, f64)| a * (-radius / b).exp();
    let t = (zeta - ZETA_LOW) / (ZETA_HIGH - ZETA_LOW);
    lerp_clamped(fit(RESOLUTION_FIT_LOW), fit(RESOLUTION_FIT_HIGH), t)
}

#[derive(Debug, Clone)]
pub struct NeMaterial {
    max: AmountType,
    grouping_min: AmountType,
    width: AmountType,
}

impl NeMaterial {
    fn coverage(&self, region: &Region) -> Coverage {
        let iv = region[0];
        if iv.begin > self.max || iv.last() == 0 {
            Coverage::None
        } else if iv.begin == 0 || iv.last() > self.max {
            Coverage::Partial
        } else {
            Coverage::Full
        }
    }
}

impl RefinementDetector for NeMaterial {
    fn refine(&self, region: &Region, flags: &mut [bool]) -> bool {
        let small = region[0].begin < self.grouping_min;
        self.coverage(region).refine(region, &[self.width], small, flags)
    }

    fn select(&self, region: &Region) -> bool {
        self.coverage(region) == Coverage::Full
    }
}

impl Material for NeMaterial {
    type Species = NeSpecies;

    const NAME: &'static str = "NE";

    fn new(max_amounts: &[AmountType], options: &NetworkOptions) -> Self {
        Self {
            max: max_amounts.first().copied().unwrap_or(0),
            grouping_min: options.grouping_min(),
            width: options.grouping_width(0),
        }
    }

    fn default_lattice_parameter() -> f64 {
        URANIUM_DIOXIDE_LATTICE_CONSTANT
    }

    fn default_impurity_radius() -> f64 {
        XENON_RADIUS
    }

    /// Uranium sublattice of the fluorite cell.
    fn atomic_volume(lattice_parameter: f64) -> f64 {
        0.25 * lattice_parameter.powi(3)
    }

    fn formation_energy(&self, region: &Region) -> f64 {
        let n = representative(region)[0] as f64;
        XE_FORMATION_SCALE * n.powf(2.0 / 3.0)
    }

    fn migration_energy(&self, region: &Region) -> f64 {
        if is_single_atom(region) {
            XE1_MIGRATION
        } else {
            f64::INFINITY
        }
    }

    fn diffusion_factor(&self, region: &Region, _lattice_parameter: f64) -> f64 {
        if is_single_atom(region) {
            XE1_DIFFUSION
        } else {
            0.0
        }
    }

    fn reaction_radius(&self, region: &Region, scalars: &MaterialScalars) -> f64 {
        let n = region[0].mean();
        if is_single_atom(region) {
            scalars.impurity_radius
        } else {
            sphere_radius(n, XE_ATOMIC_VOLUME).max(scalars.impurity_radius)
        }
    }

    fn generate_pair<E: ReactionEmitter>(&self, ctx: &GeneratorContext<'_>, i: IndexType, j: IndexType, emitter: &E) {
        let (ri, rj) = (ctx.region(i), ctx.region(j));
        let emits = (ri.is_simplex() || rj.is_simplex()) && (ri[0].begin == 1 || rj[0].begin == 1);
        ctx.for_each_product(i, j, &Shift::NONE, |k| {
            emitter.emit(ReactionKind::Production, ClusterSet::new(i, j, k));
            if emits {
                emitter.emit(ReactionKind::Dissociation, ClusterSet::new(k, i, j));
                emitter.emit(ReactionKind::ReSolution, ClusterSet::new(k, i, j));
            }
        });
    }

    /// Fission rate times the knock-out yield of the emitting bubble.
    fn re_solution_rate(&self, data: &ClusterData, c: IndexType, _a: IndexType, _b: IndexType, _grid_index: usize) -> f64 {
        let scalars = &data.scalars;
        scalars.fission_rate * re_solution_yield(data.reaction_radius[c], scalars.zeta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{Composition, Interval};
    use crate::config::GroupingParams;
    use crate::network::ReactionNetwork;
    use approx::assert_relative_eq;

    #[test]
    fn test_grouped_bubbles() {
        let mut options = NetworkOptions::default();
        options.grouping = Some(GroupingParams { min: 8, widths: vec![4] });
        let net = ReactionNetwork::<NeMaterial>::new(&[40], 1, options).unwrap();
        for n in 1..8 {
            let id = net.find_cluster_id(&Composition::from_slice(&[n]));
            assert!(net.cluster(id).region().is_simplex());
        }
        let big = net.find_cluster_id(&Composition::from_slice(&[30]));
        assert!(!net.cluster(big).region().is_simplex());
        assert!(net.cluster(big).region()[0].length() <= 4);
        let covered: u32 = (0..net.num_clusters()).map(|id| net.cluster(id).region()[0].length()).sum();
        assert_eq!(covered, 40);
    }

    #[test]
    fn test_re_solution_follows_dissociation() {
        let mut options = NetworkOptions::default();
        options.reactions.re_solution = true;
        options.fission_rate = 1e-8;
        let net = ReactionNetwork::<NeMaterial>::new(&[6], 1, options).unwrap();
        let reactions = net.reactions();
        assert_eq!(reactions.count(ReactionKind::ReSolution), reactions.count(ReactionKind::Dissociation));
        // Xe1 + Xe_n for n = 1..5.
        assert_eq!(reactions.count(ReactionKind::Dissociation), 5);
        assert!(reactions.of_kind(ReactionKind::ReSolution).iter().all(|r| r.rate(0) > 0.0));
    }

    #[test]
    fn test_re_solution_yield_interpolates() {
        let low = re_solution_yield(1.0, 0.73);
        let high = re_solution_yield(1.0, 0.76);
        assert_relative_eq!(re_solution_yield(1.0, 0.745), 0.5 * (low + high), epsilon = 1e-9);
        assert_relative_eq!(re_solution_yield(1.0, 0.9), high);
        assert!(re_solution_yield(2.0, 0.73) < low);
    }

    #[test]
    fn test_only_monomer_moves() {
        let options = NetworkOptions::default();
        let m = NeMaterial::new(&[10], &options);
        assert!(m.diffusion_factor(&Region::from_intervals(&[Interval::single(1)]), 0.547) > 0.0);
        assert_relative_eq!(m.diffusion_factor(&Region::from_intervals(&[Interval::single(2)]), 0.547), 0.0);
    }
}
