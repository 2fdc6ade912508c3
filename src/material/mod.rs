//! Material strategies.
//!
//! A [`Material`] fixes the species set, decides which regions of
//! composition space exist (refinement), supplies per-cluster properties,
//! decides which pairs react, and provides the rate laws. Everything is
//! statically dispatched through the network's type parameter.

pub mod fe;
pub mod ne;
pub mod psi;
pub mod zr;

use log::debug;

use crate::cluster::{ClusterData, MaterialScalars};
use crate::composition::{AmountType, Composition, IndexType, Region, INVALID_INDEX};
use crate::config::NetworkOptions;
use crate::generator::{GeneratorContext, ReactionEmitter};
use crate::math::{boltzmann_factor, DEFAULT_DISLOCATION_DENSITY, PI};
use crate::reaction::{ClusterSet, ReactionKind, Shift, SinkKind};
use crate::species::Species;
use crate::subpaving::{RefinementDetector, SubdivisionRatio};

pub trait Material: RefinementDetector + Sized + Send + Sync {
    type Species: Species;

    const NAME: &'static str;

    fn new(max_amounts: &[AmountType], options: &NetworkOptions) -> Self;

    /// nm
    fn default_lattice_parameter() -> f64;

    /// nm
    fn default_impurity_radius() -> f64;

    /// Volume per host atom, nm^3.
    fn atomic_volume(lattice_parameter: f64) -> f64;

    /// Upper amount per axis of the root region. Defaults to the
    /// requested maxima.
    fn root_amounts(&self, max_amounts: &[AmountType]) -> Vec<AmountType> {
        max_amounts.to_vec()
    }

    fn subdivision_ratios(&self) -> Vec<SubdivisionRatio> {
        Vec::new()
    }

    // -------------------------------------------------------------------
    // Cluster properties
    // -------------------------------------------------------------------

    fn formation_energy(&self, region: &Region) -> f64;

    fn migration_energy(&self, region: &Region) -> f64;

    /// Zero means immobile.
    fn diffusion_factor(&self, region: &Region, lattice_parameter: f64) -> f64;

    fn reaction_radius(&self, region: &Region, scalars: &MaterialScalars) -> f64;

    /// Allocate material-specific per-grid fields. Called once per build
    /// and again when the grid is resized.
    fn initialize_extra(&self, _data: &mut ClusterData) {}

    /// Refresh material-specific fields after a temperature change.
    fn update_extra(&self, _data: &mut ClusterData) {}

    // -------------------------------------------------------------------
    // Reaction discovery
    // -------------------------------------------------------------------

    /// Emit every reaction between clusters `i <= j`.
    fn generate_pair<E: ReactionEmitter>(&self, ctx: &GeneratorContext<'_>, i: IndexType, j: IndexType, emitter: &E);

    /// Depth below the surface where a trap-mutation source is active, nm.
    fn trap_mutation_depth(&self, _region: &Region) -> f64 {
        0.0
    }

    // -------------------------------------------------------------------
    // Rate laws
    // -------------------------------------------------------------------

    /// Diffusion-limited capture rate 4 pi (rA + rB)(DA + DB).
    fn production_rate(&self, data: &ClusterData, a: IndexType, b: IndexType, grid_index: usize) -> f64 {
        let r = data.reaction_radius[a] + data.reaction_radius[b];
        let d = data.diffusion_coefficient[[a, grid_index]] + data.diffusion_coefficient[[b, grid_index]];
        4.0 * PI * r * d
    }

    /// Binding energy of `a` and `b` in `c`, clamped to [-5, 5] eV.
    fn binding_energy(&self, data: &ClusterData, c: IndexType, a: IndexType, b: IndexType) -> f64 {
        let be = data.formation_energy[a] + data.formation_energy[b] - data.formation_energy[c];
        be.clamp(-5.0, 5.0)
    }

    /// Detailed balance with production:
    /// k_prod(a, b) / omega * exp(-Eb / kT).
    fn dissociation_rate(&self, data: &ClusterData, c: IndexType, a: IndexType, b: IndexType, grid_index: usize) -> f64 {
        let omega = data.scalars.atomic_volume;
        let t = data.temperature[grid_index];
        let k = self.production_rate(data, a, b, grid_index) / omega;
        k * boltzmann_factor(self.binding_energy(data, c, a, b), t)
    }

    fn re_solution_rate(&self, _data: &ClusterData, _c: IndexType, _a: IndexType, _b: IndexType, _grid_index: usize) -> f64 {
        0.0
    }

    fn sink_bias(&self, _region: &Region) -> f64 {
        1.0
    }

    fn sink_rate(&self, data: &ClusterData, kind: SinkKind, cluster: IndexType, grid_index: usize) -> f64 {
        let bias = self.sink_bias(&data.regions[cluster]);
        let d = data.diffusion_coefficient[[cluster, grid_index]];
        let strength = match kind {
            SinkKind::Generic => {
                dislocation_strength(DEFAULT_DISLOCATION_DENSITY, data.reaction_radius[cluster], data.scalars.lattice_parameter)
            }
            SinkKind::Dislocation => dislocation_strength(
                data.scalars.dislocation_density,
                data.reaction_radius[cluster],
                data.scalars.lattice_parameter,
            ),
            SinkKind::GrainBoundary => grain_boundary_strength(data.scalars.grain_size),
        };
        bias * strength * d
    }
}

/// Line sink strength -4 pi rho / ln(pi rho (r + r0)^2), with core
/// radius r0 = 0.75 sqrt(3) a.
pub fn dislocation_strength(rho: f64, radius: f64, lattice_parameter: f64) -> f64 {
    let r0 = lattice_parameter * 0.75 * 3f64.sqrt();
    let rr = radius + r0;
    -4.0 * PI * rho / (PI * rho * rr * rr).ln()
}

/// Spherical grain of diameter `grain_size`.
pub fn grain_boundary_strength(grain_size: f64) -> f64 {
    60.0 / (grain_size * grain_size)
}

// ---------------------------------------------------------------------------
// Region validity
// ---------------------------------------------------------------------------

/// How many compositions of a region are physical clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    None,
    Partial,
    Full,
}

impl Coverage {
    /// Refinement decision shared by the materials: split partial regions
    /// on every axis; split full regions down to simplices below the
    /// grouping threshold and down to the grouping widths above it.
    pub fn refine(self, region: &Region, widths: &[AmountType], small: bool, flags: &mut [bool]) -> bool {
        match self {
            Coverage::None => false,
            Coverage::Partial => {
                flags.iter_mut().for_each(|f| *f = true);
                true
            }
            Coverage::Full => {
                let mut any = false;
                for (k, f) in flags.iter_mut().enumerate() {
                    let width = if small { 1 } else { widths[k].max(1) };
                    *f = region[k].length() > width;
                    any |= *f;
                }
                any
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared pair rules
// ---------------------------------------------------------------------------

/// Size-1 simplex on any axis.
pub fn is_single_atom(region: &Region) -> bool {
    region.is_simplex() && region.origin().total() == 1
}

/// Product bounds by interval sums, then every intersecting tile becomes a
/// production. When one reactant is a single atom the reverse dissociation
/// is emitted too. Returns the number of products found.
pub fn emit_standard<E: ReactionEmitter>(
    ctx: &GeneratorContext<'_>,
    i: IndexType,
    j: IndexType,
    shift: Shift,
    with_dissociation: bool,
    emitter: &E,
) -> usize {
    let (ra, rb) = (ctx.region(i), ctx.region(j));
    let dissociates = with_dissociation && (is_single_atom(ra) || is_single_atom(rb));
    let mut found = 0;
    ctx.for_each_product(i, j, &shift, |k| {
        found += 1;
        emitter.emit(ReactionKind::Production, ClusterSet::new(i, j, k).with_shift(shift));
        if dissociates {
            emitter.emit(ReactionKind::Dissociation, ClusterSet::new(k, i, j).with_shift(shift));
        }
    });
    found
}

/// Vacancy / interstitial recombination between `vac` (holding vacancies)
/// and `int` (a pure interstitial cluster).
///
/// An elementary pair (v, m) recombines min(v, m) defects. One family of
/// productions is emitted per recombined amount `r`; its product tiles only
/// admit pairs that leave `v - r` vacancies and `m - r` interstitials, and
/// since no tile holds both, each pair lands in exactly one family. Pairs
/// that annihilate completely get a production without a product.
pub fn emit_annihilation<E: ReactionEmitter>(
    ctx: &GeneratorContext<'_>,
    i: IndexType,
    j: IndexType,
    vac: IndexType,
    int: IndexType,
    v_axis: usize,
    i_axis: usize,
    emitter: &E,
) {
    let (rv, ri) = (ctx.region(vac), ctx.region(int));
    let (v, n) = (rv[v_axis], ri[i_axis]);
    let can_vanish = (0..rv.dim()).all(|k| k == v_axis || rv[k].begin == 0);
    let axes = [v_axis, i_axis];

    for amount in v.begin.min(n.begin)..=v.last().min(n.last()) {
        let shift = Shift::annihilate(&axes, amount);
        let found = emit_standard(ctx, i, j, shift, false, emitter);
        let vanishes = can_vanish && v.contains(amount) && n.contains(amount);
        if vanishes {
            emitter.emit(ReactionKind::Production, ClusterSet::new(i, j, INVALID_INDEX).with_shift(shift));
        } else if found == 0 {
            debug!("clusters {vac} and {int}: nothing recombines {amount} defects");
        }
    }
}

/// Composition at the rounded mean of a region.
pub fn representative(region: &Region) -> Composition {
    let amounts: Vec<AmountType> = region.intervals().iter().map(|iv| iv.mean().round() as AmountType).collect();
    Composition::from_slice(&amounts)
}
